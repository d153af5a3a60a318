//! Test server harness for end-to-end tests.
//!
//! Provides `TestRoomServer`, which runs the real router (in-memory store,
//! expiry sweeper included) on a random local port.

use common::types::RoomId;
use cookie::Cookie;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use room_service::config::Config;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::routes::{self, AppState};
use room_service::store::{MemoryStore, RoomStore};
use room_service::tasks::start_expiry_sweeper;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// The process-wide recorder can only be installed once; later servers
/// share it. If another recorder got there first, fall back to a detached
/// handle so `/metrics` still renders.
fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the room service in end-to-end tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestRoomServer::spawn().await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    client: reqwest::Client,
    cancel_token: CancellationToken,
    _handle: JoinHandle<()>,
    _sweeper: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a server with default test settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[]).await
    }

    /// Spawn a server with extra configuration variables.
    ///
    /// The store backend is always the in-memory one. Defaults for tests:
    /// insecure cookies (plain HTTP) and a 50 ms expiry sweep.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("STORE_BACKEND".to_string(), "memory".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("COOKIE_SECURE".to_string(), "false".to_string()),
            ("EXPIRY_SWEEP_INTERVAL_MS".to_string(), "50".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;
        let sweep_interval = config.expiry_sweep_interval();

        let store: Arc<dyn RoomStore> = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(config, store));
        let cancel_token = CancellationToken::new();

        let sweeper = tokio::spawn(start_expiry_sweeper(
            state.lifecycle.clone(),
            sweep_interval,
            cancel_token.child_token(),
        ));

        let app = routes::build_routes(state.clone(), metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        // Browsers would follow the admission redirect; tests inspect it.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            addr,
            state,
            client,
            cancel_token,
            _handle: handle,
            _sweeper: sweeper,
        })
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shared application state, for inspecting the store and the hub.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// HTTP client that does not follow redirects.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `POST /api/rooms`, returning the new room id.
    pub async fn create_room(&self) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/api/rooms", self.url()))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        body.get("room_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("create response lacks room_id: {body}"))
    }

    /// `GET /room/{room_id}`, optionally presenting a cookie pair.
    pub async fn enter(
        &self,
        room_id: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut request = self.client.get(format!("{}/room/{room_id}", self.url()));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// Enter a room as a newcomer and return the issued cookie pair.
    pub async fn join(&self, room_id: &str) -> Result<String, anyhow::Error> {
        let response = self.enter(room_id, None).await?;
        if !response.status().is_success() {
            anyhow::bail!("admission refused with {}", response.status());
        }
        cookie_pair(&response).ok_or_else(|| anyhow::anyhow!("no participant cookie issued"))
    }

    /// `POST /api/rooms/{room_id}/messages` as the holder of `cookie`.
    pub async fn send_message(
        &self,
        room_id: &str,
        cookie: &str,
        sender: &str,
        text: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .post(format!("{}/api/rooms/{room_id}/messages", self.url()))
            .header(COOKIE, cookie)
            .json(&serde_json::json!({ "sender": sender, "text": text }))
            .send()
            .await?)
    }

    /// `GET /api/rooms/{room_id}/ttl`, returning the `ttl_seconds` value.
    pub async fn ttl(&self, room_id: &str) -> Result<Option<u64>, anyhow::Error> {
        let body: serde_json::Value = self
            .client
            .get(format!("{}/api/rooms/{room_id}/ttl", self.url()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.get("ttl_seconds").and_then(serde_json::Value::as_u64))
    }

    /// `DELETE /api/rooms/{room_id}`, optionally as the holder of `cookie`.
    pub async fn destroy(
        &self,
        room_id: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut request = self
            .client
            .delete(format!("{}/api/rooms/{room_id}", self.url()));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// Whether the fan-out hub still tracks the room.
    pub fn is_tracked(&self, room_id: &str) -> bool {
        RoomId::parse(room_id).is_ok_and(|id| self.state.fanout.is_tracked(&id))
    }
}

/// The `name=value` part of the response's `Set-Cookie`, as a browser would
/// send it back.
pub fn cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Cookie::parse(value).ok())
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self._handle.abort();
        self._sweeper.abort();
    }
}
