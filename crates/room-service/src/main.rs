//! Room Service
//!
//! Entry point for the ephemeral chat room service.

use common::secret::ExposeSecret;
use room_service::config::{Config, StoreBackend};
use room_service::observability::metrics::init_metrics_recorder;
use room_service::routes::{self, AppState};
use room_service::store::{MemoryStore, RedisRoomStore, RoomStore};
use room_service::tasks::start_expiry_sweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        store_backend = config.store_backend.as_str(),
        bind_address = %config.bind_address,
        room_ttl_seconds = config.room_ttl_seconds,
        event_channel_capacity = config.event_channel_capacity,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let store: Arc<dyn RoomStore> = match config.store_backend {
        StoreBackend::Redis => {
            let redis_url = config
                .redis_url
                .as_ref()
                .ok_or("REDIS_URL is required for the redis store backend")?;
            info!("Connecting to Redis...");
            let store = RedisRoomStore::new(redis_url.expose_secret()).await?;
            info!("Redis connection established");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; rooms are lost on restart and not shared between replicas");
            Arc::new(MemoryStore::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let sweep_interval = config.expiry_sweep_interval();
    let shutdown_grace = Duration::from_secs(config.shutdown_grace_seconds);

    let state = Arc::new(AppState::new(config, store));
    let cancel_token = CancellationToken::new();

    let sweeper = tokio::spawn(start_expiry_sweeper(
        state.lifecycle.clone(),
        sweep_interval,
        cancel_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    // Bind before announcing readiness so a taken port fails startup.
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        e
    })?;
    info!("Room Service listening on {}", addr);

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_token.cancel();
    });

    let server_token = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await?;

    cancel_token.cancel();
    if tokio::time::timeout(shutdown_grace, sweeper).await.is_err() {
        warn!("Expiry sweeper did not stop within the grace period");
    }

    info!("Room Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
