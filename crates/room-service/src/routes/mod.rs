//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_admission, require_participant};
use crate::services::{AdmissionController, FanoutHub, RoomLifecycle};
use crate::store::RoomStore;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    /// Ephemeral store behind every room.
    pub store: Arc<dyn RoomStore>,

    pub admission: AdmissionController,

    pub lifecycle: RoomLifecycle,

    /// Per-process event channels.
    pub fanout: Arc<FanoutHub>,
}

impl AppState {
    /// Wire the services around one store.
    pub fn new(config: Config, store: Arc<dyn RoomStore>) -> Self {
        let fanout = Arc::new(FanoutHub::new(config.event_channel_capacity));
        let admission = AdmissionController::new(store.clone());
        let lifecycle = RoomLifecycle::new(store.clone(), fanout.clone(), config.room_ttl());

        Self {
            config,
            store,
            admission,
            lifecycle,
            fanout,
        }
    }
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - operational, public
/// - `POST /api/rooms` - create a room, public
/// - `GET /api/rooms/{room_id}/ttl` - remaining lifetime, public
/// - `DELETE /api/rooms/{room_id}` - destroy, members only (checked in the handler)
/// - `GET /room/{room_id}` - room entry, behind the admission gate
/// - `/api/rooms/{room_id}/messages`, `/api/rooms/{room_id}/events` - members only
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.request_timeout();

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/rooms", post(handlers::create_room))
        .route("/api/rooms/:room_id/ttl", get(handlers::get_ttl))
        .route("/api/rooms/:room_id", delete(handlers::destroy_room))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Entering a room may take one of its slots.
    let entry_routes = Router::new()
        .route("/room/:room_id", get(handlers::enter_room))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admission,
        ))
        .with_state(state.clone());

    let member_routes = Router::new()
        .route(
            "/api/rooms/:room_id/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route("/api/rooms/:room_id/events", get(handlers::room_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_participant,
        ))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    public_routes
        .merge(metrics_routes)
        .merge(entry_routes)
        .merge(member_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let vars = HashMap::from([
            ("STORE_BACKEND".to_string(), "memory".to_string()),
            ("COOKIE_SECURE".to_string(), "false".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);

        let state = Arc::new(AppState::new(config, Arc::new(MemoryStore::new())));
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(state, handle)
    }

    fn request(method: Method, uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Turn a `Set-Cookie` header into the `Cookie` header a browser would send.
    fn cookie_pair(response: &axum::response::Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn create(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/rooms", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["ttl_seconds"], 600);
        body["room_id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = test_router();

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(Method::GET, "/ready", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["store"], "healthy");
    }

    #[tokio::test]
    async fn test_entry_issues_cookie_then_redirects_third_visitor() {
        let app = test_router();
        let room_id = create(&app).await;
        let path = format!("/room/{room_id}");

        let first = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first_cookie = cookie_pair(&first);
        assert!(first_cookie.starts_with(&format!("x-auth-token-{room_id}=")));
        let view = json_body(first).await;
        assert_eq!(view["participant_count"], 1);

        let second = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let third = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            third.headers().get(header::LOCATION).unwrap(),
            "/?error=room-full"
        );

        // The first visitor comes back with their cookie and gets no new one.
        let again = app
            .oneshot(request(Method::GET, &path, Some(&first_cookie)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::OK);
        assert!(again.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_entry_to_missing_room_redirects() {
        let app = test_router();

        for path in ["/room/doesNotExist", "/room/bad%20id"] {
            let response = app
                .clone()
                .oneshot(request(Method::GET, path, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "/?error=room-not-found"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_cookie_expires_with_room() {
        let app = test_router();
        let room_id = create(&app).await;
        let path = format!("/room/{room_id}");

        tokio::time::advance(std::time::Duration::from_secs(400)).await;

        let first = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let set_cookie = first
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("Max-Age=200"), "{set_cookie}");
        assert!(!set_cookie.contains("Max-Age=600"), "{set_cookie}");
    }

    #[tokio::test]
    async fn test_quoted_member_cookie_reenters_full_room() {
        let app = test_router();
        let room_id = create(&app).await;
        let path = format!("/room/{room_id}");

        let first = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        let (name, value) = cookie_pair(&first)
            .split_once('=')
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .unwrap();
        let second = app
            .clone()
            .oneshot(request(Method::GET, &path, None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let quoted = format!("{name}=\"{value}\"");
        let again = app
            .oneshot(request(Method::GET, &path, Some(&quoted)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::OK);
        assert!(again.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(again).await["participant_count"], 2);
    }

    #[tokio::test]
    async fn test_member_routes_reject_outsiders() {
        let app = test_router();
        let room_id = create(&app).await;

        let response = app
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/api/rooms/{room_id}/messages"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_A_PARTICIPANT");

        let response = app
            .oneshot(request(Method::GET, "/api/rooms/ghost/messages", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "ROOM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_send_list_destroy_flow() {
        let app = test_router();
        let room_id = create(&app).await;

        let entered = app
            .clone()
            .oneshot(request(Method::GET, &format!("/room/{room_id}"), None))
            .await
            .unwrap();
        let cookie = cookie_pair(&entered);
        let messages_path = format!("/api/rooms/{room_id}/messages");

        let send = Request::builder()
            .method(Method::POST)
            .uri(&messages_path)
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"sender":"anonymous-fox","text":"hi"}"#))
            .unwrap();
        let response = app.clone().oneshot(send).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["id"], 1);

        let response = app
            .clone()
            .oneshot(request(Method::GET, &messages_path, Some(&cookie)))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["messages"][0]["text"], "hi");

        let response = app
            .clone()
            .oneshot(request(
                Method::DELETE,
                &format!("/api/rooms/{room_id}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/rooms/{room_id}/ttl"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["ttl_seconds"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_destroy_requires_membership() {
        let app = test_router();
        let room_id = create(&app).await;

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, &format!("/api/rooms/{room_id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(Method::GET, &format!("/api/rooms/{room_id}/ttl"), None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["ttl_seconds"], 600);
    }
}
