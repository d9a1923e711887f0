//! Load test for the fruit arena server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server and wait for their bootstrap
//! - Send `player-move` events at a fixed rate
//! - Count `player-update`, `fruit-add` and `fruit-remove` broadcasts
//!
//! With `--admin` the first client connects as admin and starts the fruit
//! game, so collisions are exercised too.
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 25)
//!   --duration S     Test duration in seconds (default: 30)
//!   --move-rate R    Moves per second per client (default: 20)
//!   --admin          Start the fruit game from client 0
//!   --url URL        Server URL (default: ws://127.0.0.1:3000/ws)

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DIRECTIONS: [&str; 4] = ["left", "up", "right", "down"];

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    rejected: AtomicU64,
    messages_received: AtomicU64,
    player_updates: AtomicU64,
    fruits_added: AtomicU64,
    fruits_removed: AtomicU64,
    moves_sent: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    move_rate: f64,
    admin: bool,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();
    let url = if admin {
        format!("{}?admin=true&player_icon=loadtest", url)
    } else {
        format!("{}?player_icon=loadtest", url)
    };

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

    // Admission notice, then bootstrap
    let admitted = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(event) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            match event["event"].as_str() {
                Some("show-max-concurrent-connections-message") => return false,
                Some("bootstrap") => return true,
                _ => {}
            }
        }
        false
    })
    .await;

    match admitted {
        Ok(true) => {}
        Ok(false) => {
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        Err(_) => {
            if client_id < 3 {
                eprintln!("Client {} bootstrap timeout", client_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    if admin {
        let start = json!({"event": "admin-start-fruit-game", "data": 200});
        if ws.send(Message::Text(start.to_string().into())).await.is_err() {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    let move_interval = if move_rate > 0.0 {
        Duration::from_secs_f64(1.0 / move_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut move_timer = tokio::time::interval(move_interval);
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut rng = StdRng::seed_from_u64(client_id as u64);
    // Walk in one direction for a while, like a held arrow key
    let mut direction = DIRECTIONS[0];
    let test_end = Instant::now() + duration;

    while Instant::now() < test_end {
        tokio::select! {
            _ = move_timer.tick() => {
                if rng.gen_bool(0.05) {
                    direction = DIRECTIONS[rng.gen_range(0..DIRECTIONS.len())];
                }
                let msg = json!({"event": "player-move", "data": direction});
                if ws.send(Message::Text(msg.to_string().into())).await.is_ok() {
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
                        let Ok(event) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        match event["event"].as_str() {
                            Some("player-update") => {
                                metrics.player_updates.fetch_add(1, Ordering::Relaxed);
                            }
                            Some("fruit-add") => {
                                metrics.fruits_added.fetch_add(1, Ordering::Relaxed);
                            }
                            Some("fruit-remove") => {
                                metrics.fruits_removed.fetch_add(1, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 25;
    let mut duration_secs: u64 = 30;
    let mut move_rate: f64 = 20.0;
    let mut admin = false;
    let mut url = "ws://127.0.0.1:3000/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(25);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--move-rate" => {
                i += 1;
                move_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--admin" => admin = true,
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Fruit Arena Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move rate: {}/s per client", move_rate);
    println!("Fruit game: {}", if admin { "on" } else { "off" });
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        let is_admin = admin && client_id == 0;

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, move_rate, is_admin, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            interval.tick().await;
            println!(
                "[{:3}s] connected={}, rejected={}, msgs={}, moves={}, fruits+={}, fruits-={}, errors={}",
                start.elapsed().as_secs(),
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.rejected.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.moves_sent.load(Ordering::Relaxed),
                metrics_clone.fruits_added.load(Ordering::Relaxed),
                metrics_clone.fruits_removed.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let updates = metrics.player_updates.load(Ordering::Relaxed);
    let moves = metrics.moves_sent.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("Total moves sent: {}", moves);
    println!("Total player-update received: {}", updates);
    println!("Fruits added: {}", metrics.fruits_added.load(Ordering::Relaxed));
    println!("Fruits collected: {}", metrics.fruits_removed.load(Ordering::Relaxed));
    println!("Rejected: {}", metrics.rejected.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    // Every move fans out to every other connected client
    let admitted = latency_count.max(1);
    let expected_updates = moves * (admitted - 1);
    if expected_updates > 0 {
        println!(
            "Update delivery rate: {:.1}%",
            updates as f64 / expected_updates as f64 * 100.0
        );
    }
    println!(
        "Messages/sec (total): {:.0}",
        msgs as f64 / duration_secs.max(1) as f64
    );
}
