//! Application-level configuration loading: arena geometry, match pacing, queue and
//! session timeouts, and the identity mode used to authenticate sockets.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PONG_ARENA_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub game: GameSettings,
    pub matchmaking: MatchmakingSettings,
    pub sessions: SessionSettings,
    pub identity: IdentitySettings,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        tick_rate = config.game.tick_rate,
                        winning_score = config.game.winning_score,
                        "loaded configuration"
                    );
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

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Arena geometry and pacing. Distances are in pixels, speeds in pixels per tick.
pub struct GameSettings {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub paddle_width: f64,
    pub paddle_height: f64,
    /// Gap between a paddle and its side wall.
    pub paddle_margin: f64,
    pub paddle_speed: f64,
    pub ball_radius: f64,
    pub ball_speed: f64,
    pub winning_score: u32,
    pub tick_rate: u32,
    pub countdown_from: u8,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "countdown_step_ms")]
    pub countdown_step: Duration,
}

impl GameSettings {
    /// Simulated time covered by a single tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            paddle_width: 10.0,
            paddle_height: 100.0,
            paddle_margin: 10.0,
            paddle_speed: 10.0,
            ball_radius: 4.0,
            ball_speed: 6.0,
            winning_score: 10,
            tick_rate: 60,
            countdown_from: 3,
            countdown_step: Duration::from_millis(1_000),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Queue pairing and direct challenge timeouts.
pub struct MatchmakingSettings {
    /// How long a proposed pair has to confirm readiness before both are re-queued.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "confirm_timeout_ms")]
    pub confirm_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "challenge_ttl_ms")]
    pub challenge_ttl: Duration,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(5),
            challenge_ttl: Duration::from_secs(30),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Disconnect handling, orphan reclamation and result persistence.
pub struct SessionSettings {
    /// Vacancy tolerated in a multiplayer match before the absent side forfeits.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "forfeit_grace_ms")]
    pub forfeit_grace: Duration,
    /// Vacancy tolerated in a single-player match before it is abandoned.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "abandon_grace_ms")]
    pub abandon_grace: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "reaper_interval_ms")]
    pub reaper_interval: Duration,
    /// Time a running session may go without any connected participant before it is reclaimed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "orphan_grace_ms")]
    pub orphan_grace: Duration,
    pub persist_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            forfeit_grace: Duration::ZERO,
            abandon_grace: Duration::from_secs(10),
            reaper_interval: Duration::from_secs(5),
            orphan_grace: Duration::from_secs(30),
            persist_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
/// How socket identification tokens are turned into user identities.
pub enum IdentitySettings {
    /// Tokens are `"<user_id>:<username>"`, issued by a trusted upstream.
    Trusted,
    /// Tokens are looked up in a fixed directory.
    Directory { users: HashMap<String, DirectoryEntry> },
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self::Trusted
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Identity bound to a token in [`IdentitySettings::Directory`].
pub struct DirectoryEntry {
    pub user_id: u64,
    pub username: String,
}

/// Resolve the configuration path taking the environment override into account.
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
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: AppConfig = serde_json::from_str(
            r#"{"game": {"winning_score": 5, "countdown_step_ms": 250}, "sessions": {"forfeit_grace_ms": 1500}}"#,
        )
        .unwrap();

        assert_eq!(config.game.winning_score, 5);
        assert_eq!(config.game.countdown_step, Duration::from_millis(250));
        assert_eq!(config.game.canvas_width, 800.0);
        assert_eq!(config.sessions.forfeit_grace, Duration::from_millis(1_500));
        assert_eq!(config.matchmaking.confirm_timeout, Duration::from_secs(5));
        assert!(matches!(config.identity, IdentitySettings::Trusted));
    }

    #[test]
    fn directory_identity_parses_users() {
        let config: AppConfig = serde_json::from_str(
            r#"{"identity": {"mode": "directory", "users": {"abc": {"user_id": 7, "username": "ada"}}}}"#,
        )
        .unwrap();

        match config.identity {
            IdentitySettings::Directory { users } => {
                assert_eq!(users["abc"].user_id, 7);
                assert_eq!(users["abc"].username, "ada");
            }
            other => panic!("unexpected identity settings: {other:?}"),
        }
    }

    #[test]
    fn tick_interval_matches_rate() {
        let settings = GameSettings::default();
        let interval = settings.tick_interval();
        assert!((interval.as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }
}
