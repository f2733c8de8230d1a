use std::path::{Path, PathBuf};
use std::time::Duration;

use looper_transport::DEFAULT_BARS;
use serde::{Deserialize, Serialize};

/// Engine tuning, loaded from `engine.toml`. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cadence of `Transport::poll` when driven by the tick loop.
    pub tick_interval_ms: u64,
    /// A reported position jump larger than this (seconds) is an explicit seek.
    pub seek_threshold: f64,
    /// Remaining element time (seconds) under which a player rewinds early.
    pub near_end_epsilon: f64,
    /// Loop window floor in bars when the arrangement is shorter.
    pub min_bars: f64,
    pub undo_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            seek_threshold: 0.5,
            near_end_epsilon: 0.2,
            min_bars: DEFAULT_BARS,
            undo_history: 100,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("looper").join("engine.toml"))
    }

    /// Load from the per-user config directory, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("could not read {}: {e}", path.display());
                return Self::default();
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => {
                log::info!("loaded engine config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("invalid engine config {}: {e}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml_str("seek_threshold = 1.25\n").expect("parse");
        assert_eq!(config.seek_threshold, 1.25);
        assert_eq!(config.tick_interval_ms, 16);
        assert_eq!(config.near_end_epsilon, 0.2);
        assert_eq!(config.min_bars, 8.0);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = EngineConfig::load_from(&dir.path().join("engine.toml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "tick_interval_ms = \"fast\"").expect("write");
        assert_eq!(EngineConfig::load_from(&path), EngineConfig::default());
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
