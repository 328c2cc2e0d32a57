use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::error::JoinError;
use crate::player::PlayerId;
use crate::protocol::{
    CurrentPlayersMsg, JoinMsg, PlayerMoveMsg, PlayerMovedMsg, PlayerWire, StateSnapshotMsg,
};
use crate::state::{MoveOutcome, WorldState};

/// Handed back to a connection whose join succeeded. The receiver is
/// subscribed inside the world loop right after the roster is taken, so the
/// connection sees every event that follows its `currentPlayers`.
#[derive(Debug)]
pub struct JoinAccepted {
    pub id: PlayerId,
    pub current_players: CurrentPlayersMsg,
    pub events: broadcast::Receiver<WorldBroadcast>,
}

/// Commands from client connections to the world loop
pub enum WorldCommand {
    Join {
        request: JoinMsg,
        response: oneshot::Sender<Result<JoinAccepted, JoinError>>,
    },
    Move {
        id: PlayerId,
        claim: PlayerMoveMsg,
    },
    Heartbeat {
        id: PlayerId,
    },
    Leave {
        id: PlayerId,
    },
    PlayerCount {
        response: oneshot::Sender<usize>,
    },
    /// Whether `id` is still registered
    IsJoined {
        id: PlayerId,
        response: oneshot::Sender<bool>,
    },
}

/// Broadcasts from the world loop to all joined connections
#[derive(Debug, Clone)]
pub enum WorldBroadcast {
    /// Delivered to everyone except the joiner
    PlayerJoined(PlayerWire),
    /// Delivered to everyone, the mover included
    PlayerMoved(PlayerMovedMsg),
    PlayerLeft { id: PlayerId },
    Snapshot(StateSnapshotMsg),
}

/// Run the world loop. Owns all player state.
pub async fn run_world_loop(
    mut cmd_rx: mpsc::Receiver<WorldCommand>,
    broadcast_tx: broadcast::Sender<WorldBroadcast>,
    server_config: ServerConfig,
) {
    let mut state = WorldState::new(server_config.world, server_config.rng_seed);

    let mut liveness_interval = tokio::time::interval(state.liveness_sweep_interval());
    liveness_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // A disabled snapshot timer still needs a future for select!; it is
    // guarded off below.
    let snapshots_enabled = state.snapshot_interval().is_some();
    let mut snapshot_interval = tokio::time::interval(
        state
            .snapshot_interval()
            .unwrap_or(Duration::from_secs(3600)),
    );
    snapshot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = liveness_interval.tick() => {
                for player in state.evict_stale(Instant::now()) {
                    tracing::info!(
                        "Evicting player {} ({}) after {:?} of silence",
                        player.id,
                        player.nickname,
                        player.last_update_at.elapsed()
                    );
                    let _ = broadcast_tx.send(WorldBroadcast::PlayerLeft { id: player.id });
                }
            }

            _ = snapshot_interval.tick(), if snapshots_enabled => {
                if let Some(msg) = state.snapshot() {
                    let _ = broadcast_tx.send(WorldBroadcast::Snapshot(msg));
                }
            }

            cmd = cmd_rx.recv() => {
                // Every connection and the app state are gone
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    WorldCommand::Join { request, response } => {
                        let result = state.join(&request, Instant::now()).map(|joined| {
                            let events = broadcast_tx.subscribe();
                            let _ = broadcast_tx.send(WorldBroadcast::PlayerJoined(
                                PlayerWire::from(&joined.player),
                            ));
                            tracing::info!(
                                "Player {} joined as {:?} (character {})",
                                joined.player.id,
                                joined.player.nickname,
                                joined.player.character_type
                            );
                            JoinAccepted {
                                id: joined.player.id,
                                current_players: joined.current_players,
                                events,
                            }
                        });
                        if let Err(Ok(accepted)) = response.send(result) {
                            // Connection went away while we were registering it
                            if state.leave(accepted.id).is_some() {
                                let _ = broadcast_tx.send(WorldBroadcast::PlayerLeft { id: accepted.id });
                            }
                        }
                    }
                    WorldCommand::Move { id, claim } => {
                        if let MoveOutcome::Moved(msg) = state.apply_move(id, &claim, Instant::now()) {
                            let _ = broadcast_tx.send(WorldBroadcast::PlayerMoved(msg));
                        }
                    }
                    WorldCommand::Heartbeat { id } => {
                        state.heartbeat(id, Instant::now());
                    }
                    WorldCommand::Leave { id } => {
                        if let Some(player) = state.leave(id) {
                            let _ = broadcast_tx.send(WorldBroadcast::PlayerLeft { id });
                            tracing::info!("Player {} ({}) left", id, player.nickname);
                        }
                    }
                    WorldCommand::PlayerCount { response } => {
                        let _ = response.send(state.player_count());
                    }
                    WorldCommand::IsJoined { id, response } => {
                        let _ = response.send(state.is_joined(id));
                    }
                }
            }
        }
    }

    tracing::info!("World loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;

    fn spawn_loop(world: WorldConfig) -> (mpsc::Sender<WorldCommand>, broadcast::Sender<WorldBroadcast>) {
        let config = ServerConfig {
            world,
            ..Default::default()
        };
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (broadcast_tx, _) = broadcast::channel(64);
        tokio::spawn(run_world_loop(cmd_rx, broadcast_tx.clone(), config));
        (cmd_tx, broadcast_tx)
    }

    async fn join(
        cmd_tx: &mpsc::Sender<WorldCommand>,
        nickname: &str,
    ) -> Result<JoinAccepted, JoinError> {
        let (response, rx) = oneshot::channel();
        cmd_tx
            .send(WorldCommand::Join {
                request: JoinMsg {
                    nickname: Some(nickname.to_string()),
                    character_type: Some(0),
                },
                response,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn player_count(cmd_tx: &mpsc::Sender<WorldCommand>) -> usize {
        let (response, rx) = oneshot::channel();
        cmd_tx
            .send(WorldCommand::PlayerCount { response })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn next_event(rx: &mut broadcast::Receiver<WorldBroadcast>) -> WorldBroadcast {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("broadcast closed")
    }

    fn quiet_world() -> WorldConfig {
        WorldConfig {
            state_sync_interval_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_joiner_is_announced_to_first() {
        let (cmd_tx, _bc) = spawn_loop(quiet_world());
        let mut a = join(&cmd_tx, "A").await.unwrap();
        let b = join(&cmd_tx, "B").await.unwrap();

        assert!(b.current_players.players.contains_key(&a.id.to_string()));
        // A's receiver starts with A's own join
        match next_event(&mut a.events).await {
            WorldBroadcast::PlayerJoined(p) => assert_eq!(p.id, a.id),
            other => panic!("Expected own PlayerJoined, got {:?}", other),
        }
        match next_event(&mut a.events).await {
            WorldBroadcast::PlayerJoined(p) => assert_eq!(p.id, b.id),
            other => panic!("Expected PlayerJoined, got {:?}", other),
        }
        assert_eq!(player_count(&cmd_tx).await, 2);
    }

    #[tokio::test]
    async fn joiner_receiver_starts_with_its_own_join() {
        let (cmd_tx, _bc) = spawn_loop(quiet_world());
        let mut a = join(&cmd_tx, "A").await.unwrap();
        // The connection task filters this one out by id
        match next_event(&mut a.events).await {
            WorldBroadcast::PlayerJoined(p) => assert_eq!(p.id, a.id),
            other => panic!("Expected own PlayerJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_join_is_refused() {
        let (cmd_tx, _bc) = spawn_loop(quiet_world());
        let err = join(&cmd_tx, "   ").await.unwrap_err();
        assert_eq!(err, JoinError::EmptyNickname);
        assert_eq!(player_count(&cmd_tx).await, 0);
    }

    #[tokio::test]
    async fn double_leave_broadcasts_once() {
        let (cmd_tx, bc) = spawn_loop(quiet_world());
        let a = join(&cmd_tx, "A").await.unwrap();
        let mut observer = bc.subscribe();

        cmd_tx.send(WorldCommand::Leave { id: a.id }).await.unwrap();
        cmd_tx.send(WorldCommand::Leave { id: a.id }).await.unwrap();
        assert_eq!(player_count(&cmd_tx).await, 0);

        match next_event(&mut observer).await {
            WorldBroadcast::PlayerLeft { id } => assert_eq!(id, a.id),
            other => panic!("Expected PlayerLeft, got {:?}", other),
        }
        assert!(matches!(
            observer.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    async fn is_joined(cmd_tx: &mpsc::Sender<WorldCommand>, id: PlayerId) -> bool {
        let (response, rx) = oneshot::channel();
        cmd_tx
            .send(WorldCommand::IsJoined { id, response })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn membership_follows_leave() {
        let (cmd_tx, _bc) = spawn_loop(quiet_world());
        let a = join(&cmd_tx, "A").await.unwrap();
        assert!(is_joined(&cmd_tx, a.id).await);
        assert!(!is_joined(&cmd_tx, a.id + 1).await);

        cmd_tx.send(WorldCommand::Leave { id: a.id }).await.unwrap();
        assert!(!is_joined(&cmd_tx, a.id).await);
    }

    #[tokio::test]
    async fn silent_player_is_evicted() {
        let (cmd_tx, _bc) = spawn_loop(WorldConfig {
            heartbeat_timeout_ms: 200,
            liveness_sweep_interval_ms: 50,
            state_sync_interval_ms: 0,
            ..Default::default()
        });
        let a = join(&cmd_tx, "A").await.unwrap();
        let mut b = join(&cmd_tx, "B").await.unwrap();

        // B keeps itself alive, A goes quiet
        let evicted = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                cmd_tx.send(WorldCommand::Heartbeat { id: b.id }).await.unwrap();
                match tokio::time::timeout(Duration::from_millis(50), b.events.recv()).await {
                    Ok(Ok(WorldBroadcast::PlayerLeft { id })) => return id,
                    Ok(Ok(_)) | Err(_) => continue,
                    Ok(Err(e)) => panic!("broadcast error: {}", e),
                }
            }
        })
        .await
        .expect("A was never evicted");

        assert_eq!(evicted, a.id);
        assert_eq!(player_count(&cmd_tx).await, 1);
    }

    #[tokio::test]
    async fn snapshots_flow_while_players_are_present() {
        let (cmd_tx, _bc) = spawn_loop(WorldConfig {
            state_sync_interval_ms: 20,
            ..Default::default()
        });
        let mut a = join(&cmd_tx, "A").await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(WorldBroadcast::Snapshot(s)) = a.events.recv().await {
                    return s;
                }
            }
        })
        .await
        .expect("no snapshot");
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, a.id);
    }

    #[tokio::test]
    async fn significant_move_is_broadcast_to_mover() {
        let (cmd_tx, _bc) = spawn_loop(quiet_world());
        let mut a = join(&cmd_tx, "A").await.unwrap();
        let _own_join = next_event(&mut a.events).await;

        cmd_tx
            .send(WorldCommand::Move {
                id: a.id,
                claim: PlayerMoveMsg {
                    x: Some(1000.0),
                    y: Some(1.0),
                    z: Some(1000.0),
                    ry: Some(0.0),
                },
            })
            .await
            .unwrap();

        match next_event(&mut a.events).await {
            WorldBroadcast::PlayerMoved(m) => {
                assert_eq!(m.id, a.id);
                let planar = (m.position.x.powi(2) + m.position.z.powi(2)).sqrt();
                assert!((planar - 150.0).abs() < 1e-3);
            }
            other => panic!("Expected PlayerMoved, got {:?}", other),
        }
    }
}
