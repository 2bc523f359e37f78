//! Radio command parsing and dispatch.
//!
//! The platform adapter parses the invoked command name into a
//! [`RadioCommand`] and hands it to [`RadioCommands::dispatch`] together
//! with a [`CommandContext`]. Every dispatch first reports command activity
//! to the supervisor, which cancels idle timers for the guild.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{GlobalConfig, StationConfig};
use crate::models::ids::{ChannelId, GuildId};
use crate::orchestrator::supervisor::SessionSupervisor;
use crate::platform::{Activity, AudioSource, OutgoingMessage, TextLayer};
use crate::{AppError, Result};

use super::now_playing::NowPlayingSource;

/// A parsed radio command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCommand {
    /// Stream the given station into the author's voice channel.
    LiveOn(u8),
    /// Stop playback and leave the voice channel.
    StopNow,
    /// Pause playback.
    PauseNow,
    /// Resume paused playback.
    ResumeNow,
    /// Show what every station is playing.
    LiveNow,
}

impl RadioCommand {
    /// Command name without prefix.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::LiveOn(n) => format!("live_on_{n}"),
            Self::StopNow => "stop_now".into(),
            Self::PauseNow => "pause_now".into(),
            Self::ResumeNow => "resume_now".into(),
            Self::LiveNow => "live_now".into(),
        }
    }
}

impl FromStr for RadioCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        match name.as_str() {
            "stop_now" => Ok(Self::StopNow),
            "pause_now" => Ok(Self::PauseNow),
            "resume_now" => Ok(Self::ResumeNow),
            "live_now" => Ok(Self::LiveNow),
            other => other
                .strip_prefix("live_on_")
                .and_then(|n| n.parse::<u8>().ok())
                .map(Self::LiveOn)
                .ok_or_else(|| AppError::NotFound(format!("unknown command: {}", s.trim()))),
        }
    }
}

/// Where and by whom a command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    /// Guild the command was issued in.
    pub guild_id: GuildId,
    /// Text channel replies go to.
    pub text_channel: ChannelId,
    /// Voice channel the author is sitting in, if any.
    pub author_voice_channel: Option<ChannelId>,
}

/// Executes radio commands against the playback controller.
pub struct RadioCommands {
    supervisor: Arc<SessionSupervisor>,
    text: Arc<dyn TextLayer>,
    now_playing: Arc<dyn NowPlayingSource>,
    stations: Vec<StationConfig>,
    header: String,
    connect_timeout: Duration,
}

impl RadioCommands {
    /// Build a dispatcher from configuration.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        supervisor: Arc<SessionSupervisor>,
        text: Arc<dyn TextLayer>,
        now_playing: Arc<dyn NowPlayingSource>,
    ) -> Self {
        Self {
            supervisor,
            text,
            now_playing,
            stations: config.stations.clone(),
            header: config.nts.header.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Run one command and post its replies to the issuing channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Voice` if joining, playing, pausing, or leaving
    /// fails. The user has already been told in that case.
    pub async fn dispatch(&self, ctx: &CommandContext, command: RadioCommand) -> Result<()> {
        let span = info_span!(
            "radio_command",
            guild_id = %ctx.guild_id,
            command = %command.name()
        );
        async {
            self.supervisor
                .on_command(ctx.guild_id, ctx.text_channel)
                .await;

            match command {
                RadioCommand::LiveOn(number) => self.live_on(ctx, number).await,
                RadioCommand::StopNow => self.stop_now(ctx).await,
                RadioCommand::PauseNow => self.pause_now(ctx).await,
                RadioCommand::ResumeNow => self.resume_now(ctx).await,
                RadioCommand::LiveNow => {
                    let listing = self.live_now().await;
                    self.reply(ctx, listing).await;
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn live_on(&self, ctx: &CommandContext, number: u8) -> Result<()> {
        let Some(voice_channel) = ctx.author_voice_channel else {
            self.reply(ctx, "You're not in a voice channel.").await;
            return Ok(());
        };
        let Some(station) = self.stations.iter().find(|s| s.number == number) else {
            self.reply(ctx, format!("Unknown station {number}.")).await;
            return Ok(());
        };

        let source = AudioSource {
            url: station.stream_url.clone(),
            volume: station.volume,
        };
        let activity = Activity {
            listening_to: station.presence.clone(),
        };
        let started = self
            .supervisor
            .controller()
            .start_stream(
                ctx.guild_id,
                voice_channel,
                source,
                activity,
                self.connect_timeout,
            )
            .await;
        if let Err(err) = started {
            warn!(%err, station = number, "failed to start stream");
            self.reply(ctx, format!("Could not start NTS {number}: {err}"))
                .await;
            return Err(err);
        }

        info!(station = number, %voice_channel, "streaming station");
        let line = self.now_playing.describe(number).await;
        self.reply(ctx, line).await;
        Ok(())
    }

    async fn stop_now(&self, ctx: &CommandContext) -> Result<()> {
        let (was_playing, was_connected) = self
            .supervisor
            .controller()
            .stop_stream(ctx.guild_id)
            .await?;
        if was_playing {
            self.reply(ctx, "Playback stopped.").await;
        }
        if was_connected {
            self.reply(ctx, "Disconnected from the voice channel.").await;
        } else {
            self.reply(ctx, "Bot is not in a voice channel.").await;
        }
        Ok(())
    }

    async fn pause_now(&self, ctx: &CommandContext) -> Result<()> {
        let controller = self.supervisor.controller();
        if !controller.is_connected(ctx.guild_id) {
            self.reply(ctx, "I'm not in a voice channel.").await;
            return Ok(());
        }
        if controller.pause_stream(ctx.guild_id)? {
            self.reply(ctx, "Paused playback.").await;
        } else {
            self.reply(ctx, "There's nothing playing to pause.").await;
        }
        Ok(())
    }

    async fn resume_now(&self, ctx: &CommandContext) -> Result<()> {
        if self.supervisor.controller().resume(ctx.guild_id) {
            self.reply(ctx, "Resumed playback.").await;
        } else {
            self.reply(ctx, "Nothing is paused.").await;
        }
        Ok(())
    }

    /// The header followed by one now-playing line per station.
    pub async fn live_now(&self) -> String {
        let lines = join_all(
            self.stations
                .iter()
                .map(|station| self.now_playing.describe(station.number)),
        )
        .await;
        let mut listing = self.header.clone();
        for line in lines {
            listing.push('\n');
            listing.push_str(&line);
        }
        listing
    }

    async fn reply(&self, ctx: &CommandContext, body: impl Into<String>) {
        if let Err(err) = self
            .text
            .send(ctx.text_channel, OutgoingMessage::text(body))
            .await
        {
            warn!(channel_id = %ctx.text_channel, %err, "failed to send reply");
        }
    }
}
