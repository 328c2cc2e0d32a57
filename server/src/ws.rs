use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::player::PlayerId;
use crate::protocol::{encode, ClientMsg, ErrorMsg, JoinMsg, PlayerDisconnectedMsg, ServerMsg};
use crate::world_loop::{WorldBroadcast, WorldCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub world_tx: mpsc::Sender<WorldCommand>,
    pub max_message_bytes: usize,
    pub max_parse_errors: u32,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

/// Where a connection is in its lifecycle. `Disconnected` is leaving the
/// connection loop.
enum Phase {
    Connecting,
    Joined {
        id: PlayerId,
        events: broadcast::Receiver<WorldBroadcast>,
    },
}

impl Phase {
    fn player_id(&self) -> Option<PlayerId> {
        match self {
            Phase::Connecting => None,
            Phase::Joined { id, .. } => Some(*id),
        }
    }
}

/// Whether the connection loop should keep going after handling something.
enum Flow {
    Continue,
    Close,
}

type WsSink = SplitSink<WebSocket, Message>;

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut phase = Phase::Connecting;
    let mut parse_errors: u32 = 0;

    tracing::debug!("Connection opened");

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > app_state.max_message_bytes {
                            tracing::warn!(
                                "Closing connection {:?}: {} byte frame exceeds {}",
                                phase.player_id(),
                                text.len(),
                                app_state.max_message_bytes
                            );
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => {
                                if let Flow::Close =
                                    handle_client_msg(client_msg, &mut phase, &app_state, &mut sink).await
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                parse_errors += 1;
                                tracing::debug!("Unparseable frame from {:?}: {}", phase.player_id(), e);
                                if parse_errors >= app_state.max_parse_errors {
                                    tracing::warn!(
                                        "Closing connection {:?} after {} unparseable frames",
                                        phase.player_id(),
                                        parse_errors
                                    );
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error on {:?}: {}", phase.player_id(), e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = next_event(&mut phase) => {
                let Some(my_id) = phase.player_id() else {
                    continue;
                };
                match result {
                    Ok(event) => {
                        let (msg, evicted) = match event {
                            WorldBroadcast::PlayerJoined(player) => {
                                if player.id == my_id {
                                    continue; // Joiner already has itself in currentPlayers
                                }
                                (ServerMsg::NewPlayer(player), false)
                            }
                            WorldBroadcast::PlayerMoved(moved) => (ServerMsg::PlayerMoved(moved), false),
                            WorldBroadcast::PlayerLeft { id } => (
                                ServerMsg::PlayerDisconnected(PlayerDisconnectedMsg { id }),
                                id == my_id,
                            ),
                            WorldBroadcast::Snapshot(snapshot) => (ServerMsg::StateSnapshot(snapshot), false),
                        };

                        if !send_msg(&mut sink, &msg).await {
                            break;
                        }
                        if evicted {
                            tracing::info!("Player {} was evicted, closing connection", my_id);
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Player {} lagged by {} messages", my_id, n);
                        // The dropped events may include this player's own eviction
                        if !still_joined(&app_state, my_id).await {
                            tracing::info!("Player {} was evicted while lagging, closing connection", my_id);
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        // Otherwise the next snapshot brings it back in sync
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(id) = phase.player_id() {
        let _ = app_state.world_tx.send(WorldCommand::Leave { id }).await;
        tracing::info!("Player {} disconnected", id);
    } else {
        tracing::debug!("Connection closed before joining");
    }
}

/// Next broadcast for a joined connection; never resolves before joining.
async fn next_event(phase: &mut Phase) -> Result<WorldBroadcast, broadcast::error::RecvError> {
    match phase {
        Phase::Joined { events, .. } => events.recv().await,
        Phase::Connecting => std::future::pending().await,
    }
}

async fn handle_client_msg(
    msg: ClientMsg,
    phase: &mut Phase,
    app_state: &AppState,
    sink: &mut WsSink,
) -> Flow {
    match (msg, phase.player_id()) {
        (ClientMsg::Join(request), None) => join(request, phase, app_state, sink).await,
        (ClientMsg::Join(_), Some(id)) => {
            tracing::debug!("Ignoring repeated join from player {}", id);
            Flow::Continue
        }
        (ClientMsg::PlayerMove(claim), Some(id)) => {
            forward(app_state, WorldCommand::Move { id, claim }).await
        }
        (ClientMsg::Heartbeat, Some(id)) => forward(app_state, WorldCommand::Heartbeat { id }).await,
        // Nothing to update before joining
        (ClientMsg::PlayerMove(_) | ClientMsg::Heartbeat, None) => Flow::Continue,
    }
}

async fn join(request: JoinMsg, phase: &mut Phase, app_state: &AppState, sink: &mut WsSink) -> Flow {
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .world_tx
        .send(WorldCommand::Join {
            request,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return Flow::Close;
    }

    match resp_rx.await {
        Ok(Ok(accepted)) => {
            *phase = Phase::Joined {
                id: accepted.id,
                events: accepted.events,
            };
            // On failure the caller's cleanup still sends Leave for this id
            if send_msg(sink, &ServerMsg::CurrentPlayers(accepted.current_players)).await {
                Flow::Continue
            } else {
                Flow::Close
            }
        }
        Ok(Err(join_error)) => {
            tracing::debug!("Rejected join: {}", join_error);
            let msg = ServerMsg::Error(ErrorMsg {
                message: join_error.to_string(),
            });
            if send_msg(sink, &msg).await {
                Flow::Continue
            } else {
                Flow::Close
            }
        }
        Err(_) => {
            tracing::error!("Failed to receive join response");
            Flow::Close
        }
    }
}

/// Ask the world loop whether `id` is still registered. A dead world loop
/// counts as no.
async fn still_joined(app_state: &AppState, id: PlayerId) -> bool {
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .world_tx
        .send(WorldCommand::IsJoined {
            id,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        return false;
    }
    resp_rx.await.unwrap_or(false)
}

async fn forward(app_state: &AppState, cmd: WorldCommand) -> Flow {
    if app_state.world_tx.send(cmd).await.is_err() {
        tracing::error!("World loop is gone");
        return Flow::Close;
    }
    Flow::Continue
}

/// Returns false if the socket is dead; a failed send is treated as a
/// disconnect, never retried.
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> bool {
    let Some(json) = encode(msg) else {
        return true;
    };
    sink.send(Message::Text(json.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, WorldConfig};
    use crate::world_loop::run_world_loop;

    fn app_state() -> AppState {
        let config = ServerConfig {
            world: WorldConfig {
                state_sync_interval_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let (world_tx, world_rx) = mpsc::channel(16);
        let (broadcast_tx, _) = broadcast::channel(16);
        tokio::spawn(run_world_loop(world_rx, broadcast_tx, config));
        AppState {
            world_tx,
            max_message_bytes: 1024,
            max_parse_errors: 5,
        }
    }

    #[tokio::test]
    async fn evicted_player_is_no_longer_joined() {
        let app_state = app_state();
        let (response, rx) = oneshot::channel();
        app_state
            .world_tx
            .send(WorldCommand::Join {
                request: JoinMsg {
                    nickname: Some("A".to_string()),
                    character_type: Some(0),
                },
                response,
            })
            .await
            .unwrap();
        let accepted = rx.await.unwrap().unwrap();
        assert!(still_joined(&app_state, accepted.id).await);

        app_state
            .world_tx
            .send(WorldCommand::Leave { id: accepted.id })
            .await
            .unwrap();
        assert!(!still_joined(&app_state, accepted.id).await);
    }

    #[tokio::test]
    async fn dead_world_loop_counts_as_not_joined() {
        let (world_tx, world_rx) = mpsc::channel(1);
        drop(world_rx);
        let app_state = AppState {
            world_tx,
            max_message_bytes: 1024,
            max_parse_errors: 5,
        };
        assert!(!still_joined(&app_state, 1).await);
    }
}
