//! Plaza server library.
//!
//! Real-time player-state synchronization for a shared 3D space. This module
//! exposes the server components for use in tests and binaries.

pub mod config;
pub mod error;
pub mod health;
pub mod liveness;
pub mod player;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod state;
pub mod validator;
pub mod world_loop;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::world_loop::{run_world_loop, WorldBroadcast, WorldCommand};
use crate::ws::AppState;

/// Spawn the world loop and build the HTTP router serving `/ws` and
/// `/health`. Must be called from inside a tokio runtime.
pub fn build_app(config: ServerConfig) -> Router {
    let (world_tx, world_rx) = mpsc::channel::<WorldCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<WorldBroadcast>(config.broadcast_capacity);

    let app_state = AppState {
        world_tx,
        max_message_bytes: config.max_message_bytes,
        max_parse_errors: config.max_parse_errors,
    };

    // Spawn world loop
    tokio::spawn(async move {
        run_world_loop(world_rx, broadcast_tx, config).await;
    });

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
