//! WebSocket test client for the `/socket` endpoint.

use crate::server_harness::TestSignalServer;
use futures::{SinkExt, StreamExt};
use signal_service::protocol::{ClientEvent, ServerEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long `next_event` waits before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A connected client socket speaking the JSON event protocol.
///
/// Assertion helpers panic on timeouts and protocol violations so tests
/// read top to bottom.
pub struct TestSocket {
    user_id: Option<String>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestSocket {
    /// Connect as `user_id` with a `?token=` credential and wait until the
    /// server lists the user as online.
    pub async fn connect(server: &TestSignalServer, user_id: &str) -> Self {
        let url = format!("{}?token={}", server.ws_url(), server.token_for(user_id));
        let mut socket = Self::try_connect_url(&url)
            .await
            .expect("websocket connect failed");
        socket.user_id = Some(user_id.to_string());
        socket.wait_until_online(user_id).await;
        socket
    }

    /// Connect with the credential in an `Authorization: Bearer` header.
    pub async fn connect_with_header(server: &TestSignalServer, user_id: &str) -> Self {
        let mut request = server
            .ws_url()
            .into_client_request()
            .expect("invalid websocket url");
        let bearer = format!("Bearer {}", server.token_for(user_id));
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).expect("invalid header value"),
        );

        let (stream, _response) = connect_async(request)
            .await
            .expect("websocket connect failed");
        let mut socket = Self {
            user_id: Some(user_id.to_string()),
            stream,
        };
        socket.wait_until_online(user_id).await;
        socket
    }

    /// Connect without credentials, claiming `user_id` via `?userId=`.
    ///
    /// Only accepted when the server allows anonymous identities.
    pub async fn connect_anonymous(server: &TestSignalServer, user_id: &str) -> Self {
        let url = format!("{}?userId={}", server.ws_url(), user_id);
        let mut socket = Self::try_connect_url(&url)
            .await
            .expect("websocket connect failed");
        socket.user_id = Some(user_id.to_string());
        socket.wait_until_online(user_id).await;
        socket
    }

    /// Connect to a raw URL without waiting for any event.
    ///
    /// A refused upgrade comes back as `tungstenite::Error::Http`.
    pub async fn try_connect_url(url: &str) -> Result<Self, tungstenite::Error> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self {
            user_id: None,
            stream,
        })
    }

    /// Send a client event.
    pub async fn send(&mut self, event: &ClientEvent) {
        let frame = serde_json::to_string(event).expect("event serialization failed");
        self.send_raw(&frame).await;
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&mut self, frame: &str) {
        self.stream
            .send(Message::Text(frame.to_string()))
            .await
            .expect("websocket send failed");
    }

    /// Next server event, skipping control frames.
    pub async fn next_event(&mut self) -> ServerEvent {
        loop {
            let message = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .unwrap_or_else(|_| panic!("{}: timed out waiting for event", self.label()))
                .unwrap_or_else(|| panic!("{}: socket closed", self.label()))
                .expect("websocket receive failed");

            match message {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .unwrap_or_else(|e| panic!("undecodable frame {text}: {e}"));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("{}: unexpected frame {other:?}", self.label()),
            }
        }
    }

    /// Next event that is not a presence snapshot.
    pub async fn next_signal(&mut self) -> ServerEvent {
        loop {
            match self.next_event().await {
                ServerEvent::GetOnlineUsers(_) => continue,
                event => return event,
            }
        }
    }

    /// Consume presence snapshots until one matches `expected` (in any order).
    pub async fn expect_online(&mut self, expected: &[&str]) {
        let mut want: Vec<String> = expected.iter().map(|s| (*s).to_string()).collect();
        want.sort();
        loop {
            if let ServerEvent::GetOnlineUsers(online) = self.next_event().await {
                let mut got: Vec<String> = online.iter().map(ToString::to_string).collect();
                got.sort();
                if got == want {
                    return;
                }
            }
        }
    }

    /// Assert nothing but presence arrives within `window`.
    pub async fn expect_no_signal(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Text(text)))) => {
                    let event: ServerEvent =
                        serde_json::from_str(&text).expect("undecodable frame");
                    if !matches!(event, ServerEvent::GetOnlineUsers(_)) {
                        panic!("{}: unexpected event {event:?}", self.label());
                    }
                }
                Ok(Some(Ok(_))) => {}
                Ok(other) => panic!("{}: socket ended: {other:?}", self.label()),
            }
        }
    }

    /// Wait for the server to close the socket.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(EVENT_TIMEOUT, self.stream.next()).await {
                Err(_) => panic!("{}: socket still open", self.label()),
                Ok(None | Some(Ok(Message::Close(_)) | Err(_))) => return,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Close from the client side.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    async fn wait_until_online(&mut self, user_id: &str) {
        loop {
            if let ServerEvent::GetOnlineUsers(online) = self.next_event().await {
                if online.iter().any(|id| id.to_string() == user_id) {
                    return;
                }
            }
        }
    }

    fn label(&self) -> &str {
        self.user_id.as_deref().unwrap_or("anonymous")
    }
}
