//! Fruit placement and player/fruit overlap.

use crate::protocol::{FruitAddMsg, FruitId, PlayerId};
use crate::world::{Fruit, World};
use rand::Rng;

/// Fruit ids are drawn from `0..MAX_FRUIT_ID`.
pub const MAX_FRUIT_ID: FruitId = 10_000_000;

/// A player that just collected a fruit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub player_id: PlayerId,
    pub fruit_id: FruitId,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl Rect {
    /// Axis-aligned overlap. Touching edges do not overlap.
    fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && self.x + self.w > other.x
            && self.y < other.y + other.h
            && self.y + self.h > other.y
    }
}

impl World {
    /// One spawn attempt. Returns `None` without retrying when a live fruit
    /// already sits on the drawn coordinates.
    pub fn add_fruit(&mut self) -> Option<FruitAddMsg> {
        let mut id = self.rng.gen_range(0..MAX_FRUIT_ID);
        while self.fruits.iter().any(|f| f.id == id) {
            id = self.rng.gen_range(0..MAX_FRUIT_ID);
        }
        let (x, y) = self.random_position();

        if self.fruits.iter().any(|f| f.x == x && f.y == y) {
            return None;
        }

        let fruit = Fruit {
            id,
            x,
            y,
            width: self.config.player_w,
            height: self.config.player_h,
        };
        self.fruits.push(fruit);

        Some(FruitAddMsg {
            fruit_id: id,
            x,
            y,
            width: fruit.width,
            height: fruit.height,
        })
    }

    pub fn remove_fruit(&mut self, id: FruitId) -> Option<Fruit> {
        let index = self.fruits.iter().position(|f| f.id == id)?;
        Some(self.fruits.remove(index))
    }

    /// Find the first player overlapping a fruit (fruits in spawn order,
    /// then players by id), credit one point and remove the fruit.
    ///
    /// Resolves at most one collision per call.
    pub fn check_for_fruit_collision(&mut self) -> Option<Collision> {
        let (pw, ph) = (self.config.player_w, self.config.player_h);

        let hit = self.fruits.iter().find_map(|fruit| {
            let fruit_rect = Rect {
                x: fruit.x,
                y: fruit.y,
                w: fruit.width,
                h: fruit.height,
            };
            self.players
                .iter()
                .find(|(_, p)| {
                    let player_rect = Rect {
                        x: p.x,
                        y: p.y,
                        w: pw,
                        h: ph,
                    };
                    player_rect.overlaps(&fruit_rect)
                })
                .map(|(&player_id, _)| Collision {
                    player_id,
                    fruit_id: fruit.id,
                })
        })?;

        if let Some(player) = self.players.get_mut(&hit.player_id) {
            player.score += 1;
        }
        self.remove_fruit(hit.fruit_id);
        Some(hit)
    }
}
