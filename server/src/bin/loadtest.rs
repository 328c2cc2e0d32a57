//! Load test for the plaza server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server and join with a generated nickname
//! - Walk in a circle, sending playerMove messages at a fixed rate
//! - Receive and count playerMoved deltas and stateSnapshot broadcasts
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --move-rate R    Moves per second per client (default: 10)
//!   --url URL        Server URL (default: ws://127.0.0.1:9001/ws)

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Protocol types (minimal subset) ===

#[derive(Serialize)]
#[serde(tag = "type")]
enum OutMsg {
    #[serde(rename = "join")]
    Join {
        nickname: String,
        #[serde(rename = "characterType")]
        character_type: u32,
    },
    #[serde(rename = "playerMove")]
    PlayerMove { x: f64, y: f64, z: f64, ry: f64 },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum InMsg {
    #[serde(rename = "currentPlayers")]
    CurrentPlayers {},
    #[serde(rename = "newPlayer")]
    NewPlayer {},
    #[serde(rename = "playerMoved")]
    PlayerMoved {},
    #[serde(rename = "playerDisconnected")]
    PlayerDisconnected {},
    #[serde(rename = "stateSnapshot")]
    StateSnapshot { players: Vec<serde_json::Value> },
    #[serde(rename = "error")]
    Error { message: String },
}

// === Metrics ===

struct Metrics {
    joined: AtomicU64,
    messages_received: AtomicU64,
    moves_sent: AtomicU64,
    moved_received: AtomicU64,
    snapshots_received: AtomicU64,
    snapshot_players_seen: AtomicU64,
    errors: AtomicU64,
    join_latency_sum_ms: AtomicU64,
    join_latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            joined: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            moves_sent: AtomicU64::new(0),
            moved_received: AtomicU64::new(0),
            snapshots_received: AtomicU64::new(0),
            snapshot_players_seen: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            join_latency_sum_ms: AtomicU64::new(0),
            join_latency_count: AtomicU64::new(0),
        }
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    move_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let join_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let join = OutMsg::Join {
        nickname: format!("bot{}", client_id),
        character_type: client_id % 3,
    };
    let Ok(json) = serde_json::to_string(&join) else {
        return;
    };
    if ws.send(Message::Text(json.into())).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    // Wait for currentPlayers before moving
    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                    match serde_json::from_str::<InMsg>(&text) {
                        Ok(InMsg::CurrentPlayers {}) => return true,
                        Ok(InMsg::Error { message }) => {
                            if client_id < 3 {
                                eprintln!("Client {} join rejected: {}", client_id, message);
                            }
                            return false;
                        }
                        _ => {}
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return false,
                _ => {}
            }
        }
        false
    })
    .await;

    if !matches!(joined, Ok(true)) {
        if client_id < 3 {
            eprintln!("Client {} failed to join", client_id);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let join_latency = join_start.elapsed();
    metrics
        .join_latency_sum_ms
        .fetch_add(join_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.join_latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.joined.fetch_add(1, Ordering::Relaxed);

    let move_interval = if move_rate > 0.0 {
        Duration::from_secs_f64(1.0 / move_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut move_timer = tokio::time::interval(move_interval);
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Walk a circle well inside the world at a plausible speed
    let radius = 5.0 + (client_id % 40) as f64;
    let angular_speed = 1.0 / radius; // ~1 unit/s along the circle
    let walk_start = Instant::now();
    let test_end = walk_start + duration;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = move_timer.tick() => {
                let theta = walk_start.elapsed().as_secs_f64() * angular_speed;
                let msg = OutMsg::PlayerMove {
                    x: radius * theta.cos(),
                    y: 1.0,
                    z: radius * theta.sin(),
                    ry: theta,
                };
                let Ok(json) = serde_json::to_string(&msg) else {
                    continue;
                };
                if ws.send(Message::Text(json.into())).await.is_ok() {
                    metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        match serde_json::from_str::<InMsg>(&text) {
                            Ok(InMsg::PlayerMoved {}) => {
                                metrics.moved_received.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(InMsg::StateSnapshot { players }) => {
                                metrics.snapshots_received.fetch_add(1, Ordering::Relaxed);
                                metrics
                                    .snapshot_players_seen
                                    .fetch_add(players.len() as u64, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if client_id < 3 {
                            eprintln!("Client {} got Close: {:?}", client_id, frame);
                        }
                        break;
                    }
                    None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.joined.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut move_rate: f64 = 10.0;
    let mut url = "ws://127.0.0.1:9001/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--move-rate" => {
                i += 1;
                move_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Plaza Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move rate: {}/s per client", move_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, move_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            println!(
                "[{:3}s] joined={}, msgs={}, moves_sent={}, moved={}, snapshots={}, errors={}",
                elapsed,
                metrics_clone.joined.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.moves_sent.load(Ordering::Relaxed),
                metrics_clone.moved_received.load(Ordering::Relaxed),
                metrics_clone.snapshots_received.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let moves_sent = metrics.moves_sent.load(Ordering::Relaxed);
    let moved = metrics.moved_received.load(Ordering::Relaxed);
    let snapshots = metrics.snapshots_received.load(Ordering::Relaxed);
    let snapshot_players = metrics.snapshot_players_seen.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.join_latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.join_latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("Total playerMove sent: {}", moves_sent);
    println!("Total playerMoved received: {}", moved);
    println!("Total stateSnapshot received: {}", snapshots);
    println!("Total errors: {}", errors);
    if snapshots > 0 {
        println!(
            "Average players per snapshot: {}",
            snapshot_players / snapshots
        );
    }
    if latency_count > 0 {
        println!("Average join latency: {}ms", latency_sum / latency_count);
    }

    let msgs_per_sec = msgs as f64 / duration_secs.max(1) as f64;
    println!();
    println!("Messages/sec (total): {:.0}", msgs_per_sec);
    if moves_sent > 0 {
        // Each accepted move fans out to every joined client
        println!(
            "Fanout ratio (playerMoved received / playerMove sent): {:.1}",
            moved as f64 / moves_sent as f64
        );
    }
}
