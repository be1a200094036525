//! HTTP routes for the Signal Service.
//!
//! Defines the Axum router and application state.

use crate::actors::SignalingHubHandle;
use crate::collaborators::{
    IdentityResolver, InMemoryMessageStore, InMemoryUserDirectory, JwtIdentityResolver,
    MessageStore, UserDirectory,
};
use crate::config::Config;
use crate::handlers;
use crate::middleware::auth::require_auth;
use crate::transport;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the signaling hub.
    pub hub: SignalingHubHandle,

    /// Resolves socket and request credentials.
    pub resolver: Arc<dyn IdentityResolver>,

    pub messages: Arc<dyn MessageStore>,

    pub directory: Arc<dyn UserDirectory>,

    /// Accept `?userId=` and unauthenticated `register` (development only).
    pub allow_anonymous_identity: bool,
}

impl AppState {
    /// State backed by the JWT resolver and the in-memory collaborators.
    pub fn from_config(config: &Config, hub: SignalingHubHandle) -> Self {
        Self {
            hub,
            resolver: Arc::new(JwtIdentityResolver::new(config.jwt_secret.clone())),
            messages: Arc::new(InMemoryMessageStore::new()),
            directory: Arc::new(InMemoryUserDirectory::seeded(
                config.directory_users.iter().cloned(),
            )),
            allow_anonymous_identity: config.allow_anonymous_identity,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/socket` - WebSocket signaling endpoint (authenticates itself)
/// - `/api/messages/:id` - Send and list messages (authenticated)
/// - `/api/users` - Contact list (authenticated)
/// - `/api/presence` - Online identities (authenticated)
/// - CORS for the web client's origins
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    // Protected routes (require a resolvable credential)
    let api_routes = Router::new()
        .route(
            "/api/messages/:id",
            get(handlers::get_messages).post(handlers::send_message),
        )
        .route("/api/users", get(handlers::list_users))
        .route("/api/presence", get(handlers::get_presence))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let socket_routes = Router::new()
        .route("/socket", get(transport::socket_handler))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. CorsLayer - Answer preflights, tag responses
    // 3. TraceLayer - Log request details
    api_routes
        .merge(socket_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(target: "ss.http", origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, HubSettings};
    use crate::collaborators::identity::mock::MockIdentityResolver;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::types::Identity;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let hub = SignalingHubHandle::new(
            HubSettings {
                ring_timeout: Duration::from_secs(30),
                exclusive_calls: true,
                allow_anonymous_identity: false,
                connection_buffer: 16,
            },
            ActorMetrics::new(),
        );
        let state = Arc::new(AppState {
            hub,
            resolver: Arc::new(
                MockIdentityResolver::new()
                    .with_token("tok-u1", "u1")
                    .with_token("tok-u2", "u2"),
            ),
            messages: Arc::new(InMemoryMessageStore::new()),
            directory: Arc::new(InMemoryUserDirectory::seeded([
                Identity::from("u1"),
                Identity::from("u2"),
                Identity::from("u3"),
            ])),
            allow_anonymous_identity: false,
        });
        build_routes(state, &["http://localhost:5173".to_string()])
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_api_requires_credentials() {
        let response = app()
            .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_api_rejects_unknown_token() {
        let response = app()
            .oneshot(
                Request::get("/api/presence")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_users_excludes_caller() {
        let response = app()
            .oneshot(
                Request::get("/api/users")
                    .header(header::AUTHORIZATION, "Bearer tok-u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_send_then_read_conversation() {
        let app = app();

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/messages/u2")
                    .header(header::COOKIE, "jwt=tok-u1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let stored = body_json(response).await;
        assert_eq!(stored["senderId"], "u1");
        assert_eq!(stored["recipientId"], "u2");

        let response = app
            .oneshot(
                Request::get("/api/messages/u1")
                    .header(header::AUTHORIZATION, "Bearer tok-u2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/api/messages/u2")
                    .header(header::AUTHORIZATION, "Bearer tok-u1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_presence_empty_without_sockets() {
        let response = app()
            .oneshot(
                Request::get("/api/presence")
                    .header(header::AUTHORIZATION, "Bearer tok-u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }
}
