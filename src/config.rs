//! Configuration management

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

pub const ENV_ADDR: &str = "ROUTINE_TRACKER_ADDR";
pub const ENV_DB: &str = "ROUTINE_TRACKER_DB";
pub const ENV_TICK_MS: &str = "ROUTINE_TRACKER_TICK_MS";
pub const ENV_SCHEDULE: &str = "ROUTINE_TRACKER_SCHEDULE";
pub const ENV_TOC: &str = "ROUTINE_TRACKER_TOC";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub tick_interval: Duration,
    /// JSON schedule document written to storage at startup
    pub schedule_seed: Option<PathBuf>,
    /// JSON table-of-contents document written to storage at startup
    pub toc_seed: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_path: PathBuf::from("tracker.db"),
            tick_interval: Duration::from_secs(1),
            schedule_seed: None,
            toc_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_ADDR) {
            config.bind_addr = addr
                .parse()
                .map_err(|e| TrackerError::Config(format!("{ENV_ADDR}={addr}: {e}")))?;
        }
        if let Some(path) = lookup(ENV_DB) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(ms) = lookup(ENV_TICK_MS) {
            let ms: u64 = ms
                .parse()
                .map_err(|e| TrackerError::Config(format!("{ENV_TICK_MS}={ms}: {e}")))?;
            if ms == 0 {
                return Err(TrackerError::Config(format!("{ENV_TICK_MS} must be positive")));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        config.schedule_seed = lookup(ENV_SCHEDULE).map(PathBuf::from);
        config.toc_seed = lookup(ENV_TOC).map(PathBuf::from);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_ADDR, "0.0.0.0:9000"),
            (ENV_DB, "/tmp/t.db"),
            (ENV_TICK_MS, "250"),
            (ENV_SCHEDULE, "schedule.json"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.schedule_seed, Some(PathBuf::from("schedule.json")));
        assert_eq!(config.toc_seed, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[(ENV_ADDR, "nowhere")])),
            Err(TrackerError::Config(_))
        ));
        assert!(Config::from_lookup(lookup(&[(ENV_TICK_MS, "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_TICK_MS, "fast")])).is_err());
    }
}
