use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::world_loop::WorldCommand;
use crate::ws::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub players: usize,
}

/// Read-only health probe reporting the connected-player count.
pub async fn health_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let (resp_tx, resp_rx) = oneshot::channel();
    let players = match app_state
        .world_tx
        .send(WorldCommand::PlayerCount { response: resp_tx })
        .await
    {
        Ok(()) => resp_rx.await.ok(),
        Err(_) => None,
    };

    match players {
        Some(players) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                players,
            }),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
                players: 0,
            }),
        ),
    }
}
