//! WebSocket endpoint.

use crate::actors::{ConnectionBinding, SignalingHubHandle};
use crate::errors::SignalError;
use crate::middleware::auth::{header_credential, remember_identity};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use common::secret::SecretString;
use common::types::{ConnectionId, Identity};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Largest accepted inbound frame. SDP blobs stay well below this.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

/// Frames buffered between a connection actor and its socket writer.
const WRITER_BUFFER: usize = 32;

/// Query parameters accepted on `GET /socket`.
#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    /// Identity token, for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
    /// Claimed identity; honoured only in anonymous mode.
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

/// Handler for GET /socket
///
/// Credentials are taken from `?token=`, then `Authorization: Bearer`, then
/// the `jwt` cookie. A rejected credential fails the upgrade with 401.
#[instrument(skip_all, name = "ss.transport.ws.upgrade")]
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
) -> Result<Response, SignalError> {
    let binding = resolve_binding(&state, params, &headers).await?;
    let hub = state.hub.clone();

    Ok(ws
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| run_socket(socket, hub, binding)))
}

/// Work out how a new connection is bound before upgrading it.
async fn resolve_binding(
    state: &AppState,
    params: SocketParams,
    headers: &HeaderMap,
) -> Result<ConnectionBinding, SignalError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .or_else(|| header_credential(headers));

    if let Some(token) = token {
        let identity = state.resolver.resolve(&token).await?;
        remember_identity(state, &identity).await;
        return Ok(ConnectionBinding::authenticated(identity));
    }

    if !state.allow_anonymous_identity {
        debug!(target: "ss.transport.ws", "Upgrade without credentials refused");
        return Err(SignalError::Unauthorized("Missing credentials".to_string()));
    }

    match params.user_id.map(Identity::from).filter(|id| !id.is_blank()) {
        Some(identity) => {
            remember_identity(state, &identity).await;
            Ok(ConnectionBinding::claimed(identity))
        }
        None => Ok(ConnectionBinding::unbound()),
    }
}

/// Drive one upgraded socket until either side goes away.
#[instrument(skip_all, name = "ss.transport.ws")]
async fn run_socket(socket: WebSocket, hub: SignalingHubHandle, binding: ConnectionBinding) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut frames) = mpsc::channel::<String>(WRITER_BUFFER);

    let connection_id = match hub.open_connection(binding, outbound).await {
        Ok(id) => id,
        Err(e) => {
            warn!(target: "ss.transport.ws", error = %e, "Hub refused connection");
            if let Ok(frame) = ServerEvent::from_error(&e).encode() {
                let _ = sink.send(Message::Text(frame)).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let reader = async {
        while let Some(message) = stream.next().await {
            let forwarded = match message {
                Ok(Message::Text(text)) => forward_frame(&hub, connection_id, &text).await,
                Ok(Message::Binary(_)) => {
                    hub.malformed_frame(
                        connection_id,
                        SignalError::MalformedEvent("Binary frames are not supported".to_string()),
                    )
                    .await
                }
                Ok(Message::Close(_)) => break,
                // Ping/pong are answered by the WebSocket layer.
                Ok(_) => Ok(()),
                Err(e) => {
                    debug!(
                        target: "ss.transport.ws",
                        connection_id = %connection_id,
                        error = %e,
                        "Socket read failed"
                    );
                    break;
                }
            };

            if forwarded.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = reader => {}
        _ = &mut writer => {}
    }

    if let Err(e) = hub.disconnect(connection_id).await {
        debug!(
            target: "ss.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Hub gone before disconnect"
        );
    }

    info!(target: "ss.transport.ws", connection_id = %connection_id, "Socket closed");
}

async fn forward_frame(
    hub: &SignalingHubHandle,
    connection_id: ConnectionId,
    frame: &str,
) -> Result<(), SignalError> {
    match ClientEvent::decode(frame) {
        Ok(event) => hub.client_event(connection_id, event).await,
        Err(e) => hub.malformed_frame(connection_id, e).await,
    }
}
