//! HTTP API integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::Result;
use serde_json::{json, Value};
use signal_service::protocol::ServerEvent;
use signal_test_utils::{TestSignalServer, TestSocket, TestTokenBuilder};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn test_sent_message_is_pushed_to_online_recipient() -> Result<()> {
    let server = TestSignalServer::spawn().await?;
    let mut bob = TestSocket::connect(&server, "bob").await;

    let response = client()
        .post(format!("{}/api/messages/bob", server.url()))
        .bearer_auth(server.token_for("alice"))
        .json(&json!({ "text": "hi bob" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    let stored: Value = response.json().await?;
    assert_eq!(stored["senderId"], "alice");
    assert_eq!(stored["recipientId"], "bob");

    match bob.next_signal().await {
        ServerEvent::NewMessage(message) => {
            assert_eq!(message.text.as_deref(), Some("hi bob"));
            assert_eq!(message.sender_id.to_string(), "alice");
            assert_eq!(serde_json::to_value(&message)?["id"], stored["id"]);
        }
        other => panic!("expected newMessage, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_offline_recipient_reads_history_later() -> Result<()> {
    let server = TestSignalServer::spawn().await?;

    for text in ["first", "second"] {
        let response = client()
            .post(format!("{}/api/messages/bob", server.url()))
            .bearer_auth(server.token_for("alice"))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        assert_eq!(response.status(), 201);
    }

    let history: Vec<Value> = client()
        .get(format!("{}/api/messages/alice", server.url()))
        .bearer_auth(server.token_for("bob"))
        .send()
        .await?
        .json()
        .await?;

    let texts: Vec<&str> = history.iter().filter_map(|m| m["text"].as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    Ok(())
}

#[tokio::test]
async fn test_message_without_content_rejected() -> Result<()> {
    let server = TestSignalServer::spawn().await?;

    let response = client()
        .post(format!("{}/api/messages/bob", server.url()))
        .bearer_auth(server.token_for("alice"))
        .json(&json!({ "text": "   " }))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn test_api_requires_valid_token() -> Result<()> {
    let server = TestSignalServer::spawn().await?;

    let missing = client()
        .get(format!("{}/api/users", server.url()))
        .send()
        .await?;
    assert_eq!(missing.status(), 401);
    assert!(missing.headers().contains_key("www-authenticate"));

    let forged = TestTokenBuilder::new()
        .for_user("alice")
        .signed_with("some-other-secret")
        .build();
    let rejected = client()
        .get(format!("{}/api/users", server.url()))
        .bearer_auth(forged)
        .send()
        .await?;
    assert_eq!(rejected.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_users_lists_everyone_but_caller() -> Result<()> {
    let server = TestSignalServer::spawn().await?;

    let users: Vec<Value> = client()
        .get(format!("{}/api/users", server.url()))
        .bearer_auth(server.token_for("alice"))
        .send()
        .await?
        .json()
        .await?;

    let ids: Vec<&str> = users.iter().filter_map(|u| u["id"].as_str()).collect();
    assert_eq!(ids, vec!["bob", "carol"]);
    Ok(())
}

#[tokio::test]
async fn test_presence_endpoint_tracks_sockets() -> Result<()> {
    let server = TestSignalServer::spawn().await?;
    let _bob = TestSocket::connect(&server, "bob").await;

    let online: Vec<String> = client()
        .get(format!("{}/api/presence", server.url()))
        .bearer_auth(server.token_for("alice"))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(online, vec!["bob".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_socket_only_user_appears_in_contacts() -> Result<()> {
    let server = TestSignalServer::spawn().await?;
    let _dave = TestSocket::connect(&server, "dave").await;

    let users: Vec<Value> = client()
        .get(format!("{}/api/users", server.url()))
        .bearer_auth(server.token_for("alice"))
        .send()
        .await?
        .json()
        .await?;

    let ids: Vec<&str> = users.iter().filter_map(|u| u["id"].as_str()).collect();
    assert_eq!(ids, vec!["bob", "carol", "dave"]);
    Ok(())
}
