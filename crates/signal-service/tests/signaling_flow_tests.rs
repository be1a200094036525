//! Call signaling integration tests.
//!
//! Drives real WebSocket clients against a spawned server.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use common::types::Identity;
use signal_service::protocol::{ClientEvent, ServerEvent};
use signal_test_utils::{
    sample_answer, sample_candidate, sample_offer, TestSignalServer, TestSocket,
};
use std::time::Duration;

fn id(s: &str) -> Identity {
    Identity::from(s)
}

/// Connect alice and bob and drain presence until both see each other.
async fn pair(server: &TestSignalServer) -> (TestSocket, TestSocket) {
    let mut alice = TestSocket::connect(server, "alice").await;
    let mut bob = TestSocket::connect(server, "bob").await;
    alice.expect_online(&["alice", "bob"]).await;
    bob.expect_online(&["alice", "bob"]).await;
    (alice, bob)
}

#[tokio::test]
async fn test_offer_answer_and_candidates_relayed() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    assert_eq!(
        bob.next_signal().await,
        ServerEvent::IncomingCall {
            from: id("alice"),
            offer: sample_offer(),
        }
    );

    // Caller candidates flow while ringing.
    alice
        .send(&ClientEvent::IceCandidate {
            to: id("bob"),
            candidate: sample_candidate(1),
        })
        .await;
    assert_eq!(
        bob.next_signal().await,
        ServerEvent::IceCandidate {
            candidate: sample_candidate(1),
        }
    );

    bob.send(&ClientEvent::AnswerCall {
        to: id("alice"),
        answer: sample_answer(),
    })
    .await;
    assert_eq!(
        alice.next_signal().await,
        ServerEvent::CallAnswered {
            answer: sample_answer(),
        }
    );

    bob.send(&ClientEvent::IceCandidate {
        to: id("alice"),
        candidate: sample_candidate(2),
    })
    .await;
    assert_eq!(
        alice.next_signal().await,
        ServerEvent::IceCandidate {
            candidate: sample_candidate(2),
        }
    );

    alice.send(&ClientEvent::EndCall { to: id("bob") }).await;
    assert_eq!(bob.next_signal().await, ServerEvent::CallEnded);
}

#[tokio::test]
async fn test_incoming_call_rings_every_receiver_connection() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;
    let mut bob_phone = TestSocket::connect_with_header(&server, "bob").await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;

    for socket in [&mut bob, &mut bob_phone] {
        assert!(matches!(
            socket.next_signal().await,
            ServerEvent::IncomingCall { from, .. } if from == id("alice")
        ));
    }
}

#[tokio::test]
async fn test_reject_notifies_caller() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    bob.next_signal().await;

    bob.send(&ClientEvent::RejectCall { to: id("alice") }).await;
    assert_eq!(alice.next_signal().await, ServerEvent::CallRejected);
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let server = TestSignalServer::spawn_with(&[("SS_CALL_RING_TIMEOUT_SECONDS", "1")])
        .await
        .unwrap();
    let (mut alice, mut bob) = pair(&server).await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    assert!(matches!(
        bob.next_signal().await,
        ServerEvent::IncomingCall { .. }
    ));

    assert_eq!(bob.next_signal().await, ServerEvent::CallEnded);
    alice.expect_no_signal(Duration::from_millis(300)).await;

    let status = server.hub().get_status().await.unwrap();
    assert_eq!(status.active_calls, 0);
}

#[tokio::test]
async fn test_second_end_call_is_ignored() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    bob.next_signal().await;
    bob.send(&ClientEvent::AnswerCall {
        to: id("alice"),
        answer: sample_answer(),
    })
    .await;
    alice.next_signal().await;

    bob.send(&ClientEvent::EndCall { to: id("alice") }).await;
    bob.send(&ClientEvent::EndCall { to: id("alice") }).await;

    assert_eq!(alice.next_signal().await, ServerEvent::CallEnded);
    alice.expect_no_signal(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_busy_receiver_rejects_new_caller() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;
    let mut carol = TestSocket::connect(&server, "carol").await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    bob.next_signal().await;

    carol
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    assert_eq!(carol.next_signal().await, ServerEvent::CallRejected);

    bob.expect_no_signal(Duration::from_millis(300)).await;
    alice.expect_no_signal(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_caller_disconnect_ends_ringing_call() {
    let server = TestSignalServer::spawn().await.unwrap();
    let (mut alice, mut bob) = pair(&server).await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    bob.next_signal().await;

    alice.close().await;

    assert_eq!(bob.next_signal().await, ServerEvent::CallEnded);
    bob.expect_online(&["bob"]).await;
}

#[tokio::test]
async fn test_malformed_frame_gets_error_event() {
    let server = TestSignalServer::spawn().await.unwrap();
    let mut alice = TestSocket::connect(&server, "alice").await;

    alice.send_raw(r#"{"event":"dance","data":{}}"#).await;

    match alice.next_signal().await {
        ServerEvent::Error { code, .. } => assert_eq!(code, 1),
        other => panic!("expected error event, got {other:?}"),
    }

    // The connection stays usable.
    alice.send(&ClientEvent::Register(id("alice"))).await;
    alice.expect_online(&["alice"]).await;
}

#[tokio::test]
async fn test_calling_yourself_is_rejected() {
    let server = TestSignalServer::spawn().await.unwrap();
    let mut alice = TestSocket::connect(&server, "alice").await;

    alice
        .send(&ClientEvent::CallUser {
            to: id("alice"),
            offer: sample_offer(),
        })
        .await;

    assert!(matches!(
        alice.next_signal().await,
        ServerEvent::Error { code: 1, .. }
    ));
}

#[tokio::test]
async fn test_unbound_connection_must_register() {
    let server = TestSignalServer::spawn_with(&[("SS_ALLOW_ANONYMOUS_IDENTITY", "true")])
        .await
        .unwrap();
    let mut bob = TestSocket::connect_anonymous(&server, "bob").await;
    let mut guest = TestSocket::try_connect_url(&server.ws_url()).await.unwrap();

    guest
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    assert!(matches!(
        guest.next_signal().await,
        ServerEvent::Error { code: 2, .. }
    ));

    guest.send(&ClientEvent::Register(id("guest"))).await;
    guest.expect_online(&["bob", "guest"]).await;
    bob.expect_online(&["bob", "guest"]).await;

    guest
        .send(&ClientEvent::CallUser {
            to: id("bob"),
            offer: sample_offer(),
        })
        .await;
    assert!(matches!(
        bob.next_signal().await,
        ServerEvent::IncomingCall { from, .. } if from == id("guest")
    ));
}

#[tokio::test]
async fn test_register_cannot_switch_authenticated_identity() {
    let server = TestSignalServer::spawn().await.unwrap();
    let mut alice = TestSocket::connect(&server, "alice").await;

    alice.send(&ClientEvent::Register(id("mallory"))).await;

    assert!(matches!(
        alice.next_signal().await,
        ServerEvent::Error { code: 2, .. }
    ));
    assert_eq!(
        server.hub().online_identities().await.unwrap(),
        vec![id("alice")]
    );
}
