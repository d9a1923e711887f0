use crate::admission::{Admission, AdmissionController};
use crate::config::ServerConfig;
use crate::protocol::{BootstrapMsg, FruitRemoveMsg, PlayerId, PlayerUpdateMsg, ServerMsg};
use crate::ticker::{SpawnTick, SpawnTicker};
use crate::world::{Direction, World};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Who receives an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(PlayerId),
    Only(PlayerId),
}

impl Audience {
    pub fn includes(&self, id: PlayerId) -> bool {
        match *self {
            Audience::All => true,
            Audience::AllExcept(excluded) => excluded != id,
            Audience::Only(target) => target == id,
        }
    }
}

/// An event from the game loop to the connections selected by `audience`.
#[derive(Debug, Clone)]
pub struct GameBroadcast {
    pub audience: Audience,
    pub msg: Arc<ServerMsg>,
}

impl GameBroadcast {
    pub fn new(audience: Audience, msg: ServerMsg) -> Self {
        Self {
            audience,
            msg: Arc::new(msg),
        }
    }
}

/// Privileged commands, only forwarded for admin sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    StartFruitGame { interval_ms: i32 },
    StopFruitGame,
    StartCrazyMode,
    StopCrazyMode,
    ClearScores,
    SetMaxConnections(i32),
}

#[derive(Debug)]
pub enum JoinOutcome {
    Admitted {
        id: PlayerId,
        bootstrap: BootstrapMsg,
    },
    Rejected,
}

/// Session-level game state owned by the game loop task.
///
/// Every method is one protocol event; each returns the broadcasts it
/// produced, in send order.
pub struct GameState {
    pub world: World,
    pub admission: AdmissionController,
    tickers: HashMap<PlayerId, SpawnTicker>,
    tick_tx: mpsc::Sender<SpawnTick>,
    next_player_id: PlayerId,
    next_ticker_generation: u64,
}

impl GameState {
    pub fn new(server_config: &ServerConfig, tick_tx: mpsc::Sender<SpawnTick>) -> Self {
        Self {
            world: World::new(server_config.world, server_config.rng_seed),
            admission: AdmissionController::new(server_config.max_concurrent_connections),
            tickers: HashMap::new(),
            tick_tx,
            next_player_id: 1,
            next_ticker_generation: 1,
        }
    }

    /// Admit or reject a new connection. `live_count` includes it.
    pub fn connect(
        &mut self,
        admin: bool,
        icon: Option<String>,
        live_count: usize,
    ) -> (JoinOutcome, Vec<GameBroadcast>) {
        if self.admission.decide(live_count, admin) == Admission::Rejected {
            tracing::info!(
                "Rejected connection: {} live, ceiling {}",
                live_count,
                self.admission.ceiling()
            );
            return (JoinOutcome::Rejected, Vec::new());
        }

        let id = self.next_player_id;
        self.next_player_id += 1;
        self.world.add_player(id, icon);

        let bootstrap = self.world.snapshot();
        let mut out = Vec::new();
        if let Some(new_state) = self.world.player_wire(id) {
            out.push(GameBroadcast::new(
                Audience::AllExcept(id),
                ServerMsg::PlayerUpdate(PlayerUpdateMsg {
                    socket_id: id,
                    new_state,
                }),
            ));
        }

        tracing::info!("Player {} joined (admin: {})", id, admin);
        (JoinOutcome::Admitted { id, bootstrap }, out)
    }

    /// Tear down a session: its ticker stops and its player leaves.
    pub fn disconnect(&mut self, id: PlayerId) -> Vec<GameBroadcast> {
        if self.tickers.remove(&id).is_some() {
            tracing::info!("Fruit ticker of player {} cancelled on disconnect", id);
        }

        match self.world.remove_player(id) {
            Some(_) => {
                tracing::info!("Player {} left", id);
                vec![GameBroadcast::new(
                    Audience::AllExcept(id),
                    ServerMsg::PlayerRemove(id),
                )]
            }
            None => Vec::new(),
        }
    }

    pub fn player_move(&mut self, id: PlayerId, direction: &str) -> Vec<GameBroadcast> {
        let moved = match Direction::parse(direction) {
            Some(direction) => self.world.move_player(id, direction),
            None => self.world.players.get(&id).cloned(),
        };
        if moved.is_none() {
            tracing::debug!("Ignoring move for unknown player {}", id);
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(new_state) = self.world.player_wire(id) {
            out.push(GameBroadcast::new(
                Audience::AllExcept(id),
                ServerMsg::PlayerUpdate(PlayerUpdateMsg {
                    socket_id: id,
                    new_state,
                }),
            ));
        }

        if let Some(hit) = self.world.check_for_fruit_collision() {
            let score = self
                .world
                .players
                .get(&hit.player_id)
                .map(|p| p.score)
                .unwrap_or_default();
            out.push(GameBroadcast::new(
                Audience::All,
                ServerMsg::FruitRemove(FruitRemoveMsg {
                    fruit_id: hit.fruit_id,
                    score,
                    socket_id_score: hit.player_id,
                }),
            ));
            out.push(GameBroadcast::new(
                Audience::Only(hit.player_id),
                ServerMsg::UpdatePlayerScore(score),
            ));
        }

        out
    }

    pub fn admin(&mut self, id: PlayerId, command: AdminCommand) -> Vec<GameBroadcast> {
        match command {
            AdminCommand::StartFruitGame { interval_ms } => {
                tracing::info!("Fruit game started by {} every {} ms", id, interval_ms);
                let generation = self.next_ticker_generation;
                self.next_ticker_generation += 1;
                // Replacing the entry drops, and so cancels, any previous ticker.
                self.tickers.insert(
                    id,
                    SpawnTicker::start(id, generation, interval_ms, self.tick_tx.clone()),
                );
                Vec::new()
            }
            AdminCommand::StopFruitGame => {
                tracing::info!("Fruit game stopped by {}", id);
                self.tickers.remove(&id);
                Vec::new()
            }
            AdminCommand::StartCrazyMode => {
                vec![GameBroadcast::new(Audience::All, ServerMsg::StartCrazyMode)]
            }
            AdminCommand::StopCrazyMode => {
                vec![GameBroadcast::new(Audience::All, ServerMsg::StopCrazyMode)]
            }
            AdminCommand::ClearScores => {
                tracing::info!("Scores cleared by {}", id);
                self.world.clear_scores();
                vec![GameBroadcast::new(
                    Audience::All,
                    ServerMsg::Bootstrap(self.world.snapshot()),
                )]
            }
            AdminCommand::SetMaxConnections(max) => {
                tracing::info!("Connection ceiling set to {} by {}", max, id);
                self.admission.set_ceiling(max);
                Vec::new()
            }
        }
    }

    /// One spawn attempt, unless the tick comes from a ticker that has
    /// since been stopped or replaced.
    pub fn spawn_tick(&mut self, tick: SpawnTick) -> Vec<GameBroadcast> {
        let current = self.tickers.get(&tick.owner).map(|t| t.generation());
        if current != Some(tick.generation) {
            return Vec::new();
        }

        match self.world.add_fruit() {
            Some(fruit) => {
                tracing::debug!("Fruit {} spawned at ({}, {})", fruit.fruit_id, fruit.x, fruit.y);
                vec![GameBroadcast::new(Audience::All, ServerMsg::FruitAdd(fruit))]
            }
            None => Vec::new(),
        }
    }

    /// Full snapshot for one session whose broadcast receiver lagged and
    /// dropped deltas.
    pub fn resync(&self, id: PlayerId) -> Vec<GameBroadcast> {
        if !self.world.players.contains_key(&id) {
            return Vec::new();
        }
        vec![GameBroadcast::new(
            Audience::Only(id),
            ServerMsg::Bootstrap(self.world.snapshot()),
        )]
    }

    pub fn heartbeat(&self, live_count: usize) -> GameBroadcast {
        GameBroadcast::new(
            Audience::All,
            ServerMsg::ConcurrentConnections(live_count as u32),
        )
    }

    pub fn has_ticker(&self, id: PlayerId) -> bool {
        self.tickers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Fruit;

    fn test_state() -> (GameState, mpsc::Receiver<SpawnTick>) {
        let server_config = ServerConfig {
            max_concurrent_connections: 2,
            rng_seed: Some(4242),
            ..Default::default()
        };
        let (tick_tx, tick_rx) = mpsc::channel(16);
        (GameState::new(&server_config, tick_tx), tick_rx)
    }

    fn join(state: &mut GameState, live_count: usize) -> PlayerId {
        match state.connect(false, None, live_count).0 {
            JoinOutcome::Admitted { id, .. } => id,
            JoinOutcome::Rejected => panic!("Expected admission"),
        }
    }

    #[test]
    fn audience_filtering() {
        assert!(Audience::All.includes(1));
        assert!(!Audience::AllExcept(1).includes(1));
        assert!(Audience::AllExcept(1).includes(2));
        assert!(Audience::Only(3).includes(3));
        assert!(!Audience::Only(3).includes(4));
    }

    #[test]
    fn first_join_bootstraps_empty_world_and_notifies_others() {
        let (mut state, _rx) = test_state();
        let (outcome, out) = state.connect(false, Some("frog".to_string()), 1);
        let JoinOutcome::Admitted { id, bootstrap } = outcome else {
            panic!("Expected admission");
        };
        assert_eq!(id, 1);
        assert_eq!(bootstrap.players.len(), 1);
        assert!(bootstrap.fruits.is_empty());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::AllExcept(id));
        match out[0].msg.as_ref() {
            ServerMsg::PlayerUpdate(update) => {
                assert_eq!(update.socket_id, id);
                assert_eq!(update.new_state.player_icon.as_deref(), Some("frog"));
            }
            other => panic!("Expected PlayerUpdate, got {:?}", other),
        }
    }

    #[test]
    fn third_connection_over_ceiling_is_rejected_unless_admin() {
        let (mut state, _rx) = test_state();
        join(&mut state, 1);
        join(&mut state, 2);

        let (outcome, out) = state.connect(false, None, 3);
        assert!(matches!(outcome, JoinOutcome::Rejected));
        assert!(out.is_empty());
        assert_eq!(state.world.players.len(), 2);

        let (outcome, _) = state.connect(true, None, 3);
        assert!(matches!(outcome, JoinOutcome::Admitted { .. }));
        assert_eq!(state.world.players.len(), 3);
    }

    #[test]
    fn move_broadcasts_update_to_others() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        let before = state.world.players[&id].clone();

        let out = state.player_move(id, "sideways");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::AllExcept(id));
        assert_eq!(state.world.players[&id], before);
    }

    #[test]
    fn move_onto_fruit_credits_scorer() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        {
            let player = state.world.players.get_mut(&id).unwrap();
            player.x = 200;
            player.y = 200;
        }
        state.world.fruits.push(Fruit {
            id: 31337,
            x: 220,
            y: 200,
            width: 25,
            height: 25,
        });

        let out = state.player_move(id, "right");
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].audience, Audience::All);
        assert_eq!(
            *out[1].msg,
            ServerMsg::FruitRemove(FruitRemoveMsg {
                fruit_id: 31337,
                score: 1,
                socket_id_score: id,
            })
        );
        assert_eq!(out[2].audience, Audience::Only(id));
        assert_eq!(*out[2].msg, ServerMsg::UpdatePlayerScore(1));
        assert!(state.world.fruits.is_empty());
    }

    #[test]
    fn stray_move_after_disconnect_is_ignored() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        let out = state.disconnect(id);
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].msg, ServerMsg::PlayerRemove(id));
        assert_eq!(out[0].audience, Audience::AllExcept(id));

        assert!(state.player_move(id, "left").is_empty());
        assert!(state.disconnect(id).is_empty());
    }

    #[test]
    fn clear_scores_rebootstraps_everyone() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        state.world.players.get_mut(&id).unwrap().score = 12;

        let out = state.admin(id, AdminCommand::ClearScores);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::All);
        match out[0].msg.as_ref() {
            ServerMsg::Bootstrap(snapshot) => assert_eq!(snapshot.players[&id].score, 0),
            other => panic!("Expected Bootstrap, got {:?}", other),
        }
    }

    #[test]
    fn crazy_mode_is_broadcast_to_all() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        let out = state.admin(id, AdminCommand::StartCrazyMode);
        assert_eq!(*out[0].msg, ServerMsg::StartCrazyMode);
        let out = state.admin(id, AdminCommand::StopCrazyMode);
        assert_eq!(*out[0].msg, ServerMsg::StopCrazyMode);
        assert_eq!(out[0].audience, Audience::All);
    }

    #[test]
    fn ceiling_command_changes_admission() {
        let (mut state, _rx) = test_state();
        let id = join(&mut state, 1);
        state.admin(id, AdminCommand::SetMaxConnections(5));
        assert_eq!(state.admission.ceiling(), 5);
        assert!(matches!(
            state.connect(false, None, 5).0,
            JoinOutcome::Admitted { .. }
        ));
    }

    #[test]
    fn resync_targets_only_the_lagging_session() {
        let (mut state, _rx) = test_state();
        let a = join(&mut state, 1);
        let b = join(&mut state, 2);

        let out = state.resync(b);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::Only(b));
        match out[0].msg.as_ref() {
            ServerMsg::Bootstrap(snapshot) => {
                assert!(snapshot.players.contains_key(&a));
                assert!(snapshot.players.contains_key(&b));
            }
            other => panic!("Expected Bootstrap, got {:?}", other),
        }

        state.disconnect(b);
        assert!(state.resync(b).is_empty());
    }

    #[test]
    fn heartbeat_reports_live_count() {
        let (state, _rx) = test_state();
        let beat = state.heartbeat(7);
        assert_eq!(beat.audience, Audience::All);
        assert_eq!(*beat.msg, ServerMsg::ConcurrentConnections(7));
    }

    #[tokio::test]
    async fn ticks_spawn_fruit_until_stopped() {
        let (mut state, mut tick_rx) = test_state();
        let id = join(&mut state, 1);

        state.admin(id, AdminCommand::StartFruitGame { interval_ms: 10 });
        assert!(state.has_ticker(id));

        let tick = tick_rx.recv().await.unwrap();
        let out = state.spawn_tick(tick);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].msg.as_ref(), ServerMsg::FruitAdd(_)));
        assert_eq!(state.world.fruits.len(), 1);

        state.admin(id, AdminCommand::StopFruitGame);
        assert!(!state.has_ticker(id));
        // A tick queued before the stop is discarded.
        assert!(state.spawn_tick(tick).is_empty());
        assert_eq!(state.world.fruits.len(), 1);
    }

    #[tokio::test]
    async fn restarting_replaces_previous_ticker() {
        let (mut state, mut tick_rx) = test_state();
        let id = join(&mut state, 1);

        state.admin(id, AdminCommand::StartFruitGame { interval_ms: 10 });
        let old_tick = tick_rx.recv().await.unwrap();
        state.admin(id, AdminCommand::StartFruitGame { interval_ms: 10 });

        assert!(state.spawn_tick(old_tick).is_empty());
        let new_tick = loop {
            let tick = tick_rx.recv().await.unwrap();
            if tick.generation != old_tick.generation {
                break tick;
            }
        };
        assert_eq!(state.spawn_tick(new_tick).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_cancels_ticker() {
        let (mut state, _tick_rx) = test_state();
        let id = join(&mut state, 1);
        state.admin(id, AdminCommand::StartFruitGame { interval_ms: 1000 });
        assert!(state.has_ticker(id));

        state.disconnect(id);
        assert!(!state.has_ticker(id));
    }
}
