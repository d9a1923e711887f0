use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::WorldConfig;

/// Connection-scoped player identifier (the `socketId` on the wire).
pub type PlayerId = u32;

/// Fruit identifier, drawn at random when the fruit spawns.
pub type FruitId = u32;

// === Server -> Client ===
//
// Every frame is `{"event": "<name>", "data": <payload>}`. Event names are
// the compatibility contract with existing clients and must not change.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    /// Heartbeat carrying the live connection count.
    #[serde(rename = "concurrent-connections")]
    ConcurrentConnections(u32),
    #[serde(rename = "show-max-concurrent-connections-message")]
    ShowMaxConcurrentConnectionsMessage,
    #[serde(rename = "hide-max-concurrent-connections-message")]
    HideMaxConcurrentConnectionsMessage,
    #[serde(rename = "bootstrap")]
    Bootstrap(BootstrapMsg),
    #[serde(rename = "player-update")]
    PlayerUpdate(PlayerUpdateMsg),
    /// Id of the player that left.
    #[serde(rename = "player-remove")]
    PlayerRemove(PlayerId),
    #[serde(rename = "fruit-add")]
    FruitAdd(FruitAddMsg),
    #[serde(rename = "fruit-remove")]
    FruitRemove(FruitRemoveMsg),
    /// New score of the receiving player.
    #[serde(rename = "update-player-score")]
    UpdatePlayerScore(u32),
    #[serde(rename = "start-crazy-mode")]
    StartCrazyMode,
    #[serde(rename = "stop-crazy-mode")]
    StopCrazyMode,
}

/// Full world snapshot: constants, every live player and every live fruit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapMsg {
    pub canvas_width: i32,
    pub canvas_height: i32,
    pub player_w: i32,
    pub player_h: i32,
    pub velocity: i32,
    pub players: BTreeMap<PlayerId, PlayerWire>,
    pub fruits: BTreeMap<FruitId, FruitWire>,
}

impl BootstrapMsg {
    pub fn new(
        config: &WorldConfig,
        players: BTreeMap<PlayerId, PlayerWire>,
        fruits: BTreeMap<FruitId, FruitWire>,
    ) -> Self {
        Self {
            canvas_width: config.canvas_width,
            canvas_height: config.canvas_height,
            player_w: config.player_w,
            player_h: config.player_h,
            velocity: config.velocity,
            players,
            fruits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerWire {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_icon: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FruitWire {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateMsg {
    pub socket_id: PlayerId,
    pub new_state: PlayerWire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FruitAddMsg {
    pub fruit_id: FruitId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FruitRemoveMsg {
    pub fruit_id: FruitId,
    /// Updated score of the player that collected the fruit.
    pub score: u32,
    #[serde(rename = "socket_id_score")]
    pub socket_id_score: PlayerId,
}

// === Client -> Server ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "event", content = "data")]
pub enum ClientMsg {
    /// `left`, `up`, `right` or `down`. Anything else is a no-op move.
    #[serde(rename = "player-move")]
    PlayerMove(String),
    /// Spawn interval in milliseconds.
    #[serde(rename = "admin-start-fruit-game")]
    AdminStartFruitGame(i32),
    #[serde(rename = "admin-stop-fruit-game")]
    AdminStopFruitGame,
    #[serde(rename = "admin-start-crazy-mode")]
    AdminStartCrazyMode,
    #[serde(rename = "admin-stop-crazy-mode")]
    AdminStopCrazyMode,
    #[serde(rename = "admin-clear-scores")]
    AdminClearScores,
    /// New connection ceiling.
    #[serde(rename = "admin-concurrent-connections")]
    AdminConcurrentConnections(i32),
}

impl ClientMsg {
    /// Whether this event requires an admin handshake.
    pub fn is_admin(&self) -> bool {
        !matches!(self, ClientMsg::PlayerMove(_))
    }
}
