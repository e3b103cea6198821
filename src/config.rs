//! Engine configuration loading
//!
//! The engine takes an immutable config snapshot at startup: phase timing
//! and the default settings new rooms start with. Values come from an
//! optional JSON file (path overridable through the environment) layered
//! over built-in defaults; a missing or unparseable file falls back with a
//! log line rather than failing startup.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{constants::timing, room::RoomSettings};

/// Default location on disk where the engine looks for its configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZCAST_CONFIG_PATH";

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lobby-to-question countdown length in seconds.
    pub countdown_secs: u32,
    /// How long the reveal screen is shown, in seconds.
    pub reveal_secs: u32,
    /// Extra reveal time when a question winner's jingle plays, in seconds.
    pub winner_jingle_secs: u32,
    /// Slack added to the question deadline for answer latency, in seconds.
    pub answer_grace_secs: u32,
    /// Settings new rooms start with.
    pub default_settings: RoomSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_secs: timing::COUNTDOWN_SECS,
            reveal_secs: timing::REVEAL_SECS,
            winner_jingle_secs: timing::WINNER_JINGLE_SECS,
            answer_grace_secs: timing::ANSWER_GRACE_SECS,
            default_settings: RoomSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from disk, falling back to built-in
    /// defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file; every field optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    countdown_secs: Option<u32>,
    reveal_secs: Option<u32>,
    winner_jingle_secs: Option<u32>,
    answer_grace_secs: Option<u32>,
    default_settings: Option<RoomSettings>,
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = EngineConfig::default();
        Self {
            countdown_secs: raw.countdown_secs.unwrap_or(defaults.countdown_secs),
            reveal_secs: raw.reveal_secs.unwrap_or(defaults.reveal_secs),
            winner_jingle_secs: raw
                .winner_jingle_secs
                .unwrap_or(defaults.winner_jingle_secs),
            answer_grace_secs: raw.answer_grace_secs.unwrap_or(defaults.answer_grace_secs),
            default_settings: raw.default_settings.unwrap_or(defaults.default_settings),
        }
    }
}

/// Resolves the configuration path, taking the environment override into
/// account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_timing() {
        let config = EngineConfig::default();
        assert_eq!(config.countdown_secs, 3);
        assert_eq!(config.reveal_secs, 5);
        assert_eq!(config.winner_jingle_secs, 3);
        assert_eq!(config.answer_grace_secs, 1);
        assert_eq!(config.default_settings.time_limit, 20);
    }

    #[test]
    fn raw_config_overrides_only_present_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "countdownSecs": 5, "revealSecs": 8 }"#).unwrap();
        let config = EngineConfig::from(raw);
        assert_eq!(config.countdown_secs, 5);
        assert_eq!(config.reveal_secs, 8);
        assert_eq!(config.winner_jingle_secs, 3);
    }
}
