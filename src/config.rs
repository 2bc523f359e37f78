//! Global configuration parsing, validation, and credential loading.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::orchestrator::playback::PlaybackSettings;
use crate::orchestrator::supervisor::SupervisorSettings;
use crate::process::reaper::{validate_pattern, ReapSettings};
use crate::process::table::Discovery;
use crate::{AppError, Result};

/// Keyring service name holding the bot token.
pub const KEYRING_SERVICE: &str = "nts-radio";

/// Discord connectivity settings.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DiscordConfig {
    /// Prefix shown in user-facing command hints.
    pub command_prefix: String,
    /// Upper bound on the voice connection handshake.
    pub connect_timeout_seconds: u64,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            command_prefix: "/".into(),
            connect_timeout_seconds: 60,
            bot_token: String::new(),
        }
    }
}

/// Idle supervision timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SupervisorConfig {
    /// Seconds between supervisor ticks.
    pub tick_interval_seconds: u64,
    /// Seconds an idle condition must hold before disconnecting.
    pub idle_timeout_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 10,
            idle_timeout_seconds: 60,
        }
    }
}

/// Decoder handling during playback transitions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PlaybackConfig {
    /// Glob matched (case-insensitively) against decoder process names.
    pub decoder_pattern: String,
    /// Kill the decoder when pausing an empty channel.
    pub terminate_on_idle_pause: bool,
    /// Milliseconds to wait after reaping the decoder.
    pub settle_delay_ms: u64,
    /// Milliseconds to wait after stopping playback.
    pub stop_delay_ms: u64,
    /// Milliseconds to wait before leaving the channel.
    pub disconnect_delay_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            decoder_pattern: "ffmpeg*".into(),
            terminate_on_idle_pause: true,
            settle_delay_ms: 1000,
            stop_delay_ms: 500,
            disconnect_delay_ms: 500,
        }
    }
}

/// Process reaper escalation budget.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ReaperConfig {
    /// Where to look for decoder processes.
    pub discovery: Discovery,
    /// Milliseconds to wait for exit after `SIGTERM`.
    pub graceful_wait_ms: u64,
    /// Milliseconds to wait for exit after `SIGINT`.
    pub interrupt_wait_ms: u64,
    /// Milliseconds between liveness polls.
    pub poll_interval_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            discovery: Discovery::Descendants,
            graceful_wait_ms: 1000,
            interrupt_wait_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

/// NTS live metadata endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct NtsConfig {
    /// Live endpoint URL.
    pub api_url: String,
    /// Header line printed above the now-playing listing.
    pub header: String,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for NtsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.nts.live/api/v2/live".into(),
            header: "\u{1d615}\u{1d61b}\u{1d61a} \u{ff5c} Don't Assume".into(),
            request_timeout_seconds: 10,
        }
    }
}

/// One streamable station.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StationConfig {
    /// Channel number used in commands (`live_on_<number>`).
    pub number: u8,
    /// Audio stream URL handed to the decoder.
    pub stream_url: String,
    /// Linear playback volume.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Presence text while streaming.
    pub presence: String,
}

fn default_volume() -> f32 {
    0.4
}

fn default_stations() -> Vec<StationConfig> {
    vec![
        StationConfig {
            number: 1,
            stream_url: "https://stream-relay-geo.ntslive.net/stream".into(),
            volume: default_volume(),
            presence: "NTS 1".into(),
        },
        StationConfig {
            number: 2,
            stream_url: "https://stream-relay-geo.ntslive.net/stream2".into(),
            volume: default_volume(),
            presence: "NTS 2".into(),
        },
    ]
}

/// Global configuration parsed from `config.toml`.
///
/// Every section has defaults, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Discord connectivity settings.
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Idle supervision timing.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Decoder handling.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Reaper escalation budget.
    #[serde(default)]
    pub reaper: ReaperConfig,
    /// Metadata endpoint.
    #[serde(default)]
    pub nts: NtsConfig,
    /// Streamable stations.
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            supervisor: SupervisorConfig::default(),
            playback: PlaybackConfig::default(),
            reaper: ReaperConfig::default(),
            nts: NtsConfig::default(),
            stations: default_stations(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the Discord bot token from OS keychain with env-var fallback.
    ///
    /// Tries the `nts-radio` keyring service first, then falls back to the
    /// `DISCORD_API_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.discord.bot_token = load_credential("discord_api_token", "DISCORD_API_TOKEN").await?;
        Ok(())
    }

    /// Look up a station by its channel number.
    #[must_use]
    pub fn station(&self, number: u8) -> Option<&StationConfig> {
        self.stations.iter().find(|s| s.number == number)
    }

    /// Voice connection handshake timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.discord.connect_timeout_seconds)
    }

    /// Metadata request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.nts.request_timeout_seconds)
    }

    /// Hint appended to inactivity notices, e.g.
    /// ``Use `/live_on_1` or `/live_on_2` to start streaming again!``.
    #[must_use]
    pub fn resume_hint(&self) -> String {
        let commands: Vec<String> = self
            .stations
            .iter()
            .map(|s| format!("`{}live_on_{}`", self.discord.command_prefix, s.number))
            .collect();
        let listed = match commands.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
            Some((last, _)) => last.clone(),
            None => String::new(),
        };
        format!("Use {listed} to start streaming again!")
    }

    /// Reaper settings derived from `[reaper]`.
    #[must_use]
    pub fn reap_settings(&self) -> ReapSettings {
        ReapSettings {
            discovery: self.reaper.discovery,
            graceful_wait: Duration::from_millis(self.reaper.graceful_wait_ms),
            interrupt_wait: Duration::from_millis(self.reaper.interrupt_wait_ms),
            poll_interval: Duration::from_millis(self.reaper.poll_interval_ms),
        }
    }

    /// Playback controller settings derived from `[playback]` and the stations.
    #[must_use]
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            decoder_pattern: self.playback.decoder_pattern.clone(),
            terminate_on_idle_pause: self.playback.terminate_on_idle_pause,
            settle_delay: Duration::from_millis(self.playback.settle_delay_ms),
            stop_delay: Duration::from_millis(self.playback.stop_delay_ms),
            disconnect_delay: Duration::from_millis(self.playback.disconnect_delay_ms),
            resume_hint: Some(self.resume_hint()),
        }
    }

    /// Supervisor timing derived from `[supervisor]`.
    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            tick_interval: Duration::from_secs(self.supervisor.tick_interval_seconds),
            idle_timeout: Duration::from_secs(self.supervisor.idle_timeout_seconds),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.supervisor.tick_interval_seconds == 0 {
            return Err(AppError::Config(
                "tick_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.supervisor.idle_timeout_seconds == 0 {
            return Err(AppError::Config(
                "idle_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.reaper.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        validate_pattern(&self.playback.decoder_pattern)?;

        if self.stations.is_empty() {
            return Err(AppError::Config("at least one station is required".into()));
        }
        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.number) {
                return Err(AppError::Config(format!(
                    "station {} is defined more than once",
                    station.number
                )));
            }
            if !(0.0..=2.0).contains(&station.volume) {
                return Err(AppError::Config(format!(
                    "station {} volume {} is outside 0.0..=2.0",
                    station.number, station.volume
                )));
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain or {env_key} env var"
            ))
        })
}
