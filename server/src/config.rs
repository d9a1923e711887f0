use fruit_arena_shared::config::WorldConfig;

/// Path the admin page is served from unless `ADMIN_URI` overrides it.
pub const DEFAULT_ADMIN_URI: &str = "admin31ecc0596d72f84e5ee49e6dc2ecfdfdbabae49a3e3";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Secret path segment of the admin page (no leading slash)
    pub admin_uri: String,
    /// Directory holding `game.html`, `game-admin.html`, sounds and `assets/`
    pub public_dir: String,
    /// Initial connection ceiling; admins can change it at runtime
    pub max_concurrent_connections: i32,
    pub heartbeat_interval_ms: u64,
    /// Fixed seed for reproducible worlds; `None` seeds from OS entropy
    pub rng_seed: Option<u64>,
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            admin_uri: DEFAULT_ADMIN_URI.to_string(),
            public_dir: "public".to_string(),
            max_concurrent_connections: 30,
            heartbeat_interval_ms: 5000,
            rng_seed: None,
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PORT`, `ADMIN_URI`, `PUBLIC_DIR`,
    /// `MAX_CONCURRENT_CONNECTIONS`, `HEARTBEAT_INTERVAL_MS` and `RNG_SEED`.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| format!("PORT must be a port number, got {port:?}"))?;
            config.listen_addr = format!("0.0.0.0:{port}");
        }
        if let Some(admin_uri) = lookup("ADMIN_URI") {
            config.admin_uri = admin_uri.trim_start_matches('/').to_string();
        }
        if let Some(public_dir) = lookup("PUBLIC_DIR") {
            config.public_dir = public_dir;
        }
        if let Some(max) = lookup("MAX_CONCURRENT_CONNECTIONS") {
            config.max_concurrent_connections = max
                .parse()
                .map_err(|_| format!("MAX_CONCURRENT_CONNECTIONS must be an integer, got {max:?}"))?;
        }
        if let Some(ms) = lookup("HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval_ms = ms
                .parse()
                .map_err(|_| format!("HEARTBEAT_INTERVAL_MS must be an integer, got {ms:?}"))?;
        }
        if let Some(seed) = lookup("RNG_SEED") {
            config.rng_seed = Some(
                seed.parse()
                    .map_err(|_| format!("RNG_SEED must be an integer, got {seed:?}"))?,
            );
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be > 0".to_string());
        }
        if self.admin_uri.is_empty() {
            return Err("admin_uri must not be empty".to_string());
        }
        if !self
            .admin_uri
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err("admin_uri may only contain letters, digits, '-', '_' and '.'".to_string());
        }
        if matches!(
            self.admin_uri.as_str(),
            "ws" | "assets" | "collect.mp3" | "100-collect.mp3"
        ) {
            return Err(format!("admin_uri {:?} clashes with a built-in route", self.admin_uri));
        }
        self.world.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_connections, 30);
        assert_eq!(config.heartbeat_interval_ms, 5000);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("ADMIN_URI", "/secret-panel"),
            ("MAX_CONCURRENT_CONNECTIONS", "2"),
            ("RNG_SEED", "99"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.admin_uri, "secret-panel");
        assert_eq!(config.max_concurrent_connections, 2);
        assert_eq!(config.rng_seed, Some(99));
        assert_eq!(config.public_dir, "public");
    }

    #[test]
    fn bad_port_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[("PORT", "http")]));
        assert!(result.is_err());
    }

    #[test]
    fn zero_heartbeat_invalid() {
        let config = ServerConfig {
            heartbeat_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn admin_uri_must_be_plain_segment() {
        for bad in ["a/b", "{id}", ":secret", "*rest"] {
            let config = ServerConfig {
                admin_uri: bad.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn admin_uri_cannot_shadow_websocket_route() {
        let config = ServerConfig {
            admin_uri: "ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
