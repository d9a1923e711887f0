use crate::protocol::{BootstrapMsg, FruitId, FruitWire, PlayerId, PlayerWire};
use fruit_arena_shared::config::WorldConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// A connected player. Size comes from the world config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub x: i32,
    pub y: i32,
    /// Client-chosen display token, passed through untouched
    pub icon: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fruit {
    pub id: FruitId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Up,
    Right,
    Down,
}

impl Direction {
    /// Parse a wire direction. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Direction::Left),
            "up" => Some(Direction::Up),
            "right" => Some(Direction::Right),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

/// Authoritative world state, owned by the game loop task.
///
/// Players iterate in ascending id order (ids are handed out in connect
/// order), fruits in spawn order. Collision resolution depends on this.
pub struct World {
    pub config: WorldConfig,
    pub players: BTreeMap<PlayerId, Player>,
    pub fruits: Vec<Fruit>,
    pub(crate) rng: ChaCha8Rng,
}

impl World {
    pub fn new(config: WorldConfig, rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config,
            players: BTreeMap::new(),
            fruits: Vec::new(),
            rng,
        }
    }

    /// Random in-bounds `(x, y)`.
    pub(crate) fn random_position(&mut self) -> (i32, i32) {
        let x = self.rng.gen_range(0..self.config.canvas_width);
        let y = self.rng.gen_range(0..self.config.canvas_height);
        (x, y)
    }

    /// Place a player at a random position with score 0. A reused id
    /// overwrites the previous entry.
    pub fn add_player(&mut self, id: PlayerId, icon: Option<String>) -> Player {
        let (x, y) = self.random_position();
        let player = Player {
            x,
            y,
            icon,
            score: 0,
        };
        self.players.insert(id, player.clone());
        player
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Step a player one velocity unit. A step that would leave the canvas
    /// leaves that axis unchanged. Returns `None` if the player is gone.
    pub fn move_player(&mut self, id: PlayerId, direction: Direction) -> Option<Player> {
        let WorldConfig {
            canvas_width,
            canvas_height,
            velocity,
            ..
        } = self.config;
        let player = self.players.get_mut(&id)?;

        match direction {
            Direction::Left if player.x - velocity >= 0 => player.x -= velocity,
            Direction::Up if player.y - velocity >= 0 => player.y -= velocity,
            Direction::Right if player.x + velocity < canvas_width => player.x += velocity,
            Direction::Down if player.y + velocity < canvas_height => player.y += velocity,
            _ => {}
        }

        Some(player.clone())
    }

    pub fn clear_scores(&mut self) {
        for player in self.players.values_mut() {
            player.score = 0;
        }
    }

    pub fn player_wire(&self, id: PlayerId) -> Option<PlayerWire> {
        self.players.get(&id).map(|p| self.to_wire(p))
    }

    fn to_wire(&self, player: &Player) -> PlayerWire {
        PlayerWire {
            x: player.x,
            y: player.y,
            w: self.config.player_w,
            h: self.config.player_h,
            player_icon: player.icon.clone(),
            score: player.score,
        }
    }

    /// Full snapshot for `bootstrap`.
    pub fn snapshot(&self) -> BootstrapMsg {
        let players = self
            .players
            .iter()
            .map(|(&id, p)| (id, self.to_wire(p)))
            .collect();
        let fruits = self
            .fruits
            .iter()
            .map(|f| {
                (
                    f.id,
                    FruitWire {
                        x: f.x,
                        y: f.y,
                        width: f.width,
                        height: f.height,
                    },
                )
            })
            .collect();
        BootstrapMsg::new(&self.config, players, fruits)
    }
}
