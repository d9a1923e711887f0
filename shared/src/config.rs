/// World constants, sent to every client inside the bootstrap snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    pub canvas_width: i32,
    pub canvas_height: i32,
    /// Player (and fruit) width
    pub player_w: i32,
    /// Player (and fruit) height
    pub player_h: i32,
    /// Units moved per `player-move` step
    pub velocity: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1000,
            canvas_height: 1000,
            player_w: 25,
            player_h: 25,
            velocity: 2,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.canvas_width <= 0 || self.canvas_height <= 0 {
            return Err("canvas dimensions must be > 0".to_string());
        }
        if self.player_w <= 0 || self.player_h <= 0 {
            return Err("player size must be > 0".to_string());
        }
        if self.velocity <= 0 {
            return Err("velocity must be > 0".to_string());
        }
        if self.velocity >= self.canvas_width || self.velocity >= self.canvas_height {
            return Err("velocity must be smaller than the canvas".to_string());
        }
        Ok(())
    }
}
