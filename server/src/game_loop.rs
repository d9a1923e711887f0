use crate::admission::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::protocol::{BootstrapMsg, PlayerId};
use crate::state::{AdminCommand, GameBroadcast, GameState, JoinOutcome};
use crate::ticker::SpawnTick;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// Commands from client connections to the game loop
#[derive(Debug)]
pub enum GameCommand {
    /// The connection must already be counted in the registry.
    Connect {
        admin: bool,
        icon: Option<String>,
        response: oneshot::Sender<JoinReply>,
    },
    Disconnect {
        id: PlayerId,
    },
    /// Re-send the full world to one session that fell behind.
    Resync {
        id: PlayerId,
    },
    Move {
        id: PlayerId,
        direction: String,
    },
    Admin {
        id: PlayerId,
        command: AdminCommand,
    },
}

/// Answer to `GameCommand::Connect`.
#[derive(Debug)]
pub enum JoinReply {
    Admitted {
        id: PlayerId,
        bootstrap: BootstrapMsg,
        /// Subscribed right after `bootstrap` was taken, so it carries
        /// exactly the events that follow it.
        updates: broadcast::Receiver<GameBroadcast>,
    },
    Rejected,
}

/// Run the game loop. Owns the world, the admission ceiling and every
/// spawn ticker; all of them change only inside this task.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    registry: Arc<ConnectionRegistry>,
    server_config: ServerConfig,
) {
    let (tick_tx, mut tick_rx) = mpsc::channel::<SpawnTick>(64);
    let mut state = GameState::new(&server_config, tick_tx);

    let heartbeat_period = Duration::from_millis(server_config.heartbeat_interval_ms);
    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Sending fails only while nobody is connected, which is fine.
    let publish = |out: Vec<GameBroadcast>| {
        for broadcast in out {
            let _ = broadcast_tx.send(broadcast);
        }
    };

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let _ = broadcast_tx.send(state.heartbeat(registry.live_count()));
            }

            Some(tick) = tick_rx.recv() => {
                publish(state.spawn_tick(tick));
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    GameCommand::Connect { admin, icon, response } => {
                        let (outcome, out) = state.connect(admin, icon, registry.live_count());
                        let reply = match outcome {
                            JoinOutcome::Admitted { id, bootstrap } => JoinReply::Admitted {
                                id,
                                bootstrap,
                                updates: broadcast_tx.subscribe(),
                            },
                            JoinOutcome::Rejected => JoinReply::Rejected,
                        };
                        let admitted_id = match &reply {
                            JoinReply::Admitted { id, .. } => Some(*id),
                            JoinReply::Rejected => None,
                        };
                        if response.send(reply).is_err() {
                            // The socket went away while we were admitting it.
                            if let Some(id) = admitted_id {
                                state.disconnect(id);
                            }
                            continue;
                        }
                        publish(out);
                    }
                    GameCommand::Disconnect { id } => {
                        publish(state.disconnect(id));
                    }
                    GameCommand::Resync { id } => {
                        publish(state.resync(id));
                    }
                    GameCommand::Move { id, direction } => {
                        publish(state.player_move(id, &direction));
                    }
                    GameCommand::Admin { id, command } => {
                        publish(state.admin(id, command));
                    }
                }
            }
        }
    }

    tracing::info!("Game loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMsg;

    struct Harness {
        cmd_tx: mpsc::Sender<GameCommand>,
        broadcast_rx: broadcast::Receiver<GameBroadcast>,
        registry: Arc<ConnectionRegistry>,
    }

    fn start(config: ServerConfig) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(64);
        let registry = ConnectionRegistry::new();
        tokio::spawn(run_game_loop(
            cmd_rx,
            broadcast_tx,
            Arc::clone(&registry),
            config,
        ));
        Harness {
            cmd_tx,
            broadcast_rx,
            registry,
        }
    }

    async fn connect(harness: &Harness, admin: bool) -> JoinReply {
        let (response, rx) = oneshot::channel();
        harness
            .cmd_tx
            .send(GameCommand::Connect {
                admin,
                icon: None,
                response,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn admin(harness: &Harness, id: PlayerId, command: AdminCommand) {
        harness
            .cmd_tx
            .send(GameCommand::Admin { id, command })
            .await
            .unwrap();
    }

    async fn next_broadcast(harness: &mut Harness) -> GameBroadcast {
        tokio::time::timeout(Duration::from_secs(2), harness.broadcast_rx.recv())
            .await
            .expect("broadcast should arrive")
            .unwrap()
    }

    fn quiet_config() -> ServerConfig {
        ServerConfig {
            heartbeat_interval_ms: 60_000,
            rng_seed: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn join_and_leave_are_broadcast() {
        let mut harness = start(quiet_config());
        let _guard = harness.registry.register();

        let JoinReply::Admitted { id, .. } = connect(&harness, false).await else {
            panic!("Expected admission");
        };
        let joined = next_broadcast(&mut harness).await;
        assert!(matches!(joined.msg.as_ref(), ServerMsg::PlayerUpdate(u) if u.socket_id == id));

        harness
            .cmd_tx
            .send(GameCommand::Disconnect { id })
            .await
            .unwrap();
        let left = next_broadcast(&mut harness).await;
        assert_eq!(*left.msg, ServerMsg::PlayerRemove(id));
    }

    #[tokio::test]
    async fn heartbeat_reports_registry_count() {
        let mut harness = start(ServerConfig {
            heartbeat_interval_ms: 20,
            ..quiet_config()
        });
        let _a = harness.registry.register();
        let _b = harness.registry.register();

        let beat = next_broadcast(&mut harness).await;
        assert_eq!(*beat.msg, ServerMsg::ConcurrentConnections(2));
    }

    #[tokio::test]
    async fn admin_fruit_game_spawns_fruit() {
        let mut harness = start(quiet_config());
        let _guard = harness.registry.register();
        let JoinReply::Admitted { id, .. } = connect(&harness, true).await else {
            panic!("Expected admission");
        };
        let _joined = next_broadcast(&mut harness).await;

        admin(&harness, id, AdminCommand::StartFruitGame { interval_ms: 10 }).await;

        let spawned = next_broadcast(&mut harness).await;
        assert!(matches!(spawned.msg.as_ref(), ServerMsg::FruitAdd(_)));
    }

    #[tokio::test]
    async fn joiner_never_sees_a_snapshot_taken_before_it_joined() {
        let harness = start(quiet_config());
        let _admin_conn = harness.registry.register();
        let JoinReply::Admitted { id: admin_id, .. } = connect(&harness, true).await else {
            panic!("Expected admission");
        };

        // Re-bootstraps queued ahead of the join must not reach the joiner.
        for _ in 0..50 {
            admin(&harness, admin_id, AdminCommand::ClearScores).await;
        }
        let _joiner_conn = harness.registry.register();
        let JoinReply::Admitted {
            id,
            bootstrap,
            mut updates,
        } = connect(&harness, false).await
        else {
            panic!("Expected admission");
        };
        assert!(bootstrap.players.contains_key(&id));
        admin(&harness, admin_id, AdminCommand::ClearScores).await;

        // Own join notice (filtered out by the socket task), then the one
        // re-bootstrap sent after joining.
        let joined = updates.recv().await.unwrap();
        assert!(matches!(joined.msg.as_ref(), ServerMsg::PlayerUpdate(u) if u.socket_id == id));
        let rebootstrap = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("broadcast should arrive")
            .unwrap();
        match rebootstrap.msg.as_ref() {
            ServerMsg::Bootstrap(snapshot) => assert!(snapshot.players.contains_key(&id)),
            other => panic!("Expected Bootstrap, got {:?}", other),
        }
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn admission_reads_live_count_when_deciding() {
        let harness = start(ServerConfig {
            max_concurrent_connections: 2,
            ..quiet_config()
        });
        let _a = harness.registry.register();
        let _b = harness.registry.register();
        let c = harness.registry.register();

        assert!(matches!(connect(&harness, false).await, JoinReply::Rejected));

        // A slot frees up before the next join is decided.
        drop(c);
        assert!(matches!(
            connect(&harness, false).await,
            JoinReply::Admitted { .. }
        ));
    }

    #[tokio::test]
    async fn resync_sends_snapshot_to_one_session() {
        let mut harness = start(quiet_config());
        let _guard = harness.registry.register();
        let JoinReply::Admitted { id, .. } = connect(&harness, false).await else {
            panic!("Expected admission");
        };
        let _joined = next_broadcast(&mut harness).await;

        harness
            .cmd_tx
            .send(GameCommand::Resync { id })
            .await
            .unwrap();
        let resync = next_broadcast(&mut harness).await;
        assert_eq!(resync.audience, crate::state::Audience::Only(id));
        assert!(matches!(resync.msg.as_ref(), ServerMsg::Bootstrap(s) if s.players.contains_key(&id)));
    }

    #[tokio::test]
    async fn loop_exits_when_all_senders_drop() {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (broadcast_tx, _) = broadcast::channel(4);
        let handle = tokio::spawn(run_game_loop(
            cmd_rx,
            broadcast_tx,
            ConnectionRegistry::new(),
            quiet_config(),
        ));
        drop(cmd_tx);
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "game loop should stop once every sender is gone");
    }
}
