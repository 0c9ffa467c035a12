use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the decision ledger (JSON-RPC 2.0).
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,

    /// WebSocket endpoint of the public-space context feed.
    #[serde(default = "default_context_url")]
    pub context_url: String,

    /// Host identifier stamped into every evolution frame.
    #[serde(default = "default_host_id")]
    pub host_id: String,

    #[serde(default)]
    pub turn: TurnConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Length of one evolution turn in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Upper bound on candidate tokens requested per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_turn: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Fixed delay before reconnecting the ledger socket after loss.
    #[serde(default = "default_ledger_reconnect_secs")]
    pub ledger_reconnect_secs: u64,

    /// Fixed delay before reconnecting the context socket after loss.
    #[serde(default = "default_context_reconnect_secs")]
    pub context_reconnect_secs: u64,
}

fn default_ledger_url() -> String {
    "wss://ledger.local:9443/rpc".into()
}

fn default_context_url() -> String {
    "wss://publicspace.local:9444/context".into()
}

fn default_host_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "host-unknown".into())
}

fn default_period_secs() -> u64 {
    180
}

fn default_max_tokens() -> u32 {
    4
}

fn default_ledger_reconnect_secs() -> u64 {
    3
}

fn default_context_reconnect_secs() -> u64 {
    5
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            max_tokens_per_turn: default_max_tokens(),
        }
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            ledger_reconnect_secs: default_ledger_reconnect_secs(),
            context_reconnect_secs: default_context_reconnect_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_url: default_ledger_url(),
            context_url: default_context_url(),
            host_id: default_host_id(),
            turn: TurnConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load from the given path, or the default location, falling back to
    /// built-in defaults when no file exists. A present-but-broken file is an
    /// error rather than a silent fallback.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };

        let config = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            toml::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "evolane")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("evolane.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ws_url("ledger_url", &self.ledger_url)?;
        validate_ws_url("context_url", &self.context_url)?;

        if self.turn.period_secs == 0 {
            return Err(ConfigError::Validation(
                "turn.period_secs must be at least 1".into(),
            ));
        }
        if self.turn.max_tokens_per_turn == 0 {
            return Err(ConfigError::Validation(
                "turn.max_tokens_per_turn must be at least 1".into(),
            ));
        }
        if self.host_id.trim().is_empty() {
            return Err(ConfigError::Validation("host_id must not be empty".into()));
        }
        Ok(())
    }
}

fn validate_ws_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::Validation(format!("{field}: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "{field}: unsupported scheme {other:?}, expected ws or wss"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.turn.period_secs, 180);
        assert_eq!(config.turn.max_tokens_per_turn, 4);
        assert_eq!(config.reliability.ledger_reconnect_secs, 3);
    }

    #[test]
    fn empty_toml_fills_defaults() {
        let config: Config = toml::from_str("").expect("empty toml should parse");
        assert_eq!(config.turn.period_secs, 180);
        assert!(config.ledger_url.starts_with("wss://"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            ledger_url = "ws://127.0.0.1:9000/rpc"

            [turn]
            period_secs = 60
            "#,
        )
        .expect("partial toml should parse");
        assert_eq!(config.ledger_url, "ws://127.0.0.1:9000/rpc");
        assert_eq!(config.turn.period_secs, 60);
        assert_eq!(config.turn.max_tokens_per_turn, 4);
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let mut config = Config::default();
        config.ledger_url = "https://ledger.local/rpc".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_period() {
        let mut config = Config::default();
        config.turn.period_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "host_id = \"bench-rig\"\n").expect("write config");

        let config = Config::load_or_default(Some(&path)).expect("load");
        assert_eq!(config.host_id, "bench-rig");
    }

    #[test]
    fn load_or_default_errors_on_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "turn = \"not a table\"\n").expect("write config");

        assert!(Config::load_or_default(Some(&path)).is_err());
    }
}
