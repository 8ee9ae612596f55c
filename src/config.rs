//! Application-level configuration loading: registry limits, timeouts and scoring policy.

use std::{collections::HashSet, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::scoring::{DecayCurve, ScoringPolicy};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_BACK_CONFIG_PATH";
/// Join code alphabet without the visually ambiguous `0`, `O`, `1` and `I`.
const DEFAULT_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Characters join codes are drawn from.
    pub code_alphabet: Vec<char>,
    /// Length of generated join codes.
    pub code_length: usize,
    /// Number of generation attempts before giving up on a free code.
    pub code_max_attempts: usize,
    /// How long a released join code stays reserved before it can be reissued.
    pub code_grace_period: Duration,
    /// Ceiling on concurrently active sessions.
    pub max_active_sessions: usize,
    /// Connected participants required before the first question can open.
    pub min_participants_to_start: usize,
    /// Whether participants may join once the first question has opened.
    pub allow_late_join: bool,
    /// Maximum participants per session.
    pub max_participants_per_session: usize,
    /// How long a session survives without an attached host.
    pub host_idle_timeout: Duration,
    /// Delay after the last question is revealed before the final leaderboard shows.
    /// `None` keeps the session in the reveal until the host acts.
    pub auto_finish_delay: Option<Duration>,
    /// How long the final leaderboard stays up before the session ends on its own.
    pub final_leaderboard_idle: Duration,
    /// Shared key required to create sessions over REST, if any.
    pub host_api_key: Option<String>,
    /// Point decay policy applied to correct answers.
    pub scoring: ScoringPolicy,
    /// JSON quiz catalog loaded into the in-memory store when no database is configured.
    pub quiz_catalog_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_sessions = app_config.max_active_sessions,
                        "loaded configuration"
                    );
                    app_config
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

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    code_alphabet: String,
    code_length: usize,
    code_max_attempts: usize,
    code_grace_period_ms: u64,
    max_active_sessions: usize,
    min_participants_to_start: usize,
    allow_late_join: bool,
    max_participants_per_session: usize,
    host_idle_timeout_ms: u64,
    auto_finish_delay_ms: Option<u64>,
    final_leaderboard_idle_ms: u64,
    host_api_key: Option<String>,
    scoring: RawScoring,
    quiz_catalog_path: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            code_alphabet: DEFAULT_CODE_ALPHABET.into(),
            code_length: 6,
            code_max_attempts: 32,
            code_grace_period_ms: 60_000,
            max_active_sessions: 1_000,
            min_participants_to_start: 1,
            allow_late_join: false,
            max_participants_per_session: 500,
            host_idle_timeout_ms: 5 * 60_000,
            auto_finish_delay_ms: Some(10_000),
            final_leaderboard_idle_ms: 10 * 60_000,
            host_api_key: None,
            scoring: RawScoring::default(),
            quiz_catalog_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the scoring section.
struct RawScoring {
    min_fraction: f64,
    curve: DecayCurve,
}

impl Default for RawScoring {
    fn default() -> Self {
        Self {
            min_fraction: 0.5,
            curve: DecayCurve::Linear,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut code_alphabet = value
            .code_alphabet
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect::<Vec<_>>();
        let mut seen = HashSet::new();
        code_alphabet.retain(|c| seen.insert(*c));
        if code_alphabet.is_empty() {
            warn!("empty join code alphabet in config; using default alphabet");
            code_alphabet = DEFAULT_CODE_ALPHABET.chars().collect();
        }

        Self {
            code_alphabet,
            code_length: value.code_length.max(1),
            code_max_attempts: value.code_max_attempts.max(1),
            code_grace_period: Duration::from_millis(value.code_grace_period_ms),
            max_active_sessions: value.max_active_sessions,
            min_participants_to_start: value.min_participants_to_start,
            allow_late_join: value.allow_late_join,
            max_participants_per_session: value.max_participants_per_session.max(1),
            host_idle_timeout: Duration::from_millis(value.host_idle_timeout_ms),
            auto_finish_delay: value.auto_finish_delay_ms.map(Duration::from_millis),
            final_leaderboard_idle: Duration::from_millis(value.final_leaderboard_idle_ms),
            host_api_key: value.host_api_key.filter(|key| !key.is_empty()),
            scoring: ScoringPolicy {
                min_fraction: value.scoring.min_fraction.clamp(0.0, 1.0),
                curve: value.scoring.curve,
            },
            quiz_catalog_path: value
                .quiz_catalog_path
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
