//! Per-admin-session fruit spawn ticker.

use crate::protocol::PlayerId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One tick from the ticker started by `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnTick {
    pub owner: PlayerId,
    pub generation: u64,
}

/// A running ticker. Dropping it stops the ticks.
///
/// `generation` lets the game loop discard ticks that were already queued
/// when the ticker was replaced or stopped.
#[derive(Debug)]
pub struct SpawnTicker {
    generation: u64,
    handle: JoinHandle<()>,
}

impl SpawnTicker {
    /// Start ticking every `interval_ms` (at least 1 ms). The first tick
    /// fires one full interval after start.
    pub fn start(
        owner: PlayerId,
        generation: u64,
        interval_ms: i32,
        tick_tx: mpsc::Sender<SpawnTick>,
    ) -> Self {
        let period = Duration::from_millis(interval_ms.max(1) as u64);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tick_tx.send(SpawnTick { owner, generation }).await.is_err() {
                    break;
                }
            }
        });

        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SpawnTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
