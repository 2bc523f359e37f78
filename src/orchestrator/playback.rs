//! Playback control on top of the voice layer and the process reaper.
//!
//! Idle-driven actions ([`PlaybackController::pause_for_idle`],
//! [`PlaybackController::disconnect_idle`]) are best-effort: every
//! external call is guarded and logged so one failure never skips the
//! steps after it. Command-driven actions return errors to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::idle::DisconnectReason;
use crate::models::ids::{ChannelId, GuildId};
use crate::models::session::Session;
use crate::platform::{Activity, AudioSource, OutgoingMessage, TextLayer, VoiceLayer};
use crate::process::reaper::ProcessReaper;
use crate::Result;

/// Tunables for [`PlaybackController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Glob matched against decoder process names.
    pub decoder_pattern: String,
    /// Whether pausing an empty channel also kills the decoder.
    pub terminate_on_idle_pause: bool,
    /// Pause after reaping so the voice layer notices the decoder is gone.
    pub settle_delay: Duration,
    /// Pause after stopping playback.
    pub stop_delay: Duration,
    /// Pause before leaving the voice channel.
    pub disconnect_delay: Duration,
    /// Line appended to the inactivity notice, e.g. how to start again.
    pub resume_hint: Option<String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            decoder_pattern: "ffmpeg*".into(),
            terminate_on_idle_pause: true,
            settle_delay: Duration::from_millis(1000),
            stop_delay: Duration::from_millis(500),
            disconnect_delay: Duration::from_millis(500),
            resume_hint: None,
        }
    }
}

/// How an idle disconnect ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The first forced disconnect succeeded.
    Disconnected,
    /// The first attempt failed and the retry succeeded.
    DisconnectedOnRetry,
    /// Both attempts failed; the session was given up on.
    Abandoned,
}

impl DisconnectOutcome {
    /// Whether the bot actually left the channel.
    #[must_use]
    pub fn left_channel(self) -> bool {
        !matches!(self, Self::Abandoned)
    }
}

/// Facade over the voice layer, text layer, and process reaper.
pub struct PlaybackController {
    voice: Arc<dyn VoiceLayer>,
    text: Arc<dyn TextLayer>,
    reaper: Arc<ProcessReaper>,
    settings: PlaybackSettings,
}

impl PlaybackController {
    /// Build a controller.
    #[must_use]
    pub fn new(
        voice: Arc<dyn VoiceLayer>,
        text: Arc<dyn TextLayer>,
        reaper: Arc<ProcessReaper>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            voice,
            text,
            reaper,
            settings,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Pause a session whose channel emptied out.
    ///
    /// Does nothing unless the session is playing. When configured, the
    /// decoder is reaped before the pause request so it stops pulling the
    /// stream. Returns whether a pause was requested successfully.
    pub async fn pause_for_idle(&self, session: &Session) -> bool {
        let guild_id = session.guild_id;
        if !self.voice.playback_status(guild_id).is_playing() {
            return false;
        }

        if self.settings.terminate_on_idle_pause {
            self.reaper
                .terminate_matching(&self.settings.decoder_pattern)
                .await;
            sleep_if_nonzero(self.settings.settle_delay).await;
        }

        match self.voice.pause(guild_id) {
            Ok(()) => {
                info!(%guild_id, "paused idle session");
                true
            }
            Err(err) => {
                warn!(%guild_id, %err, "failed to pause idle session");
                false
            }
        }
    }

    /// Tear down an idle session.
    ///
    /// Posts the inactivity notice, kills the decoder, stops playback, clears
    /// presence, and leaves the channel with `force` set. A failed disconnect
    /// is retried once.
    pub async fn disconnect_idle(
        &self,
        session: &Session,
        reason: DisconnectReason,
    ) -> DisconnectOutcome {
        let span = info_span!("disconnect_idle", guild_id = %session.guild_id, ?reason);
        self.disconnect_idle_inner(session, reason)
            .instrument(span)
            .await
    }

    async fn disconnect_idle_inner(
        &self,
        session: &Session,
        reason: DisconnectReason,
    ) -> DisconnectOutcome {
        let guild_id = session.guild_id;

        // ── Notify ───────────────────────────────────────
        if let Some(channel_id) = self.notice_channel(session) {
            let body = match &self.settings.resume_hint {
                Some(hint) => format!("{}\n{hint}", reason.notice()),
                None => reason.notice().to_owned(),
            };
            if let Err(err) = self.text.send(channel_id, OutgoingMessage::text(body)).await {
                warn!(%channel_id, %err, "failed to post inactivity notice");
            }
        } else {
            debug!("no text channel available for inactivity notice");
        }

        // ── Release audio ────────────────────────────────
        self.halt(guild_id).await;

        if let Err(err) = self.voice.set_presence(None).await {
            warn!(%err, "failed to clear presence");
        }

        sleep_if_nonzero(self.settings.disconnect_delay).await;

        // ── Leave ────────────────────────────────────────
        match self.voice.disconnect(guild_id, true).await {
            Ok(()) => {
                info!("disconnected idle session");
                DisconnectOutcome::Disconnected
            }
            Err(first) => {
                warn!(err = %first, "disconnect failed, retrying");
                match self.voice.disconnect(guild_id, true).await {
                    Ok(()) => {
                        info!("disconnected idle session on retry");
                        DisconnectOutcome::DisconnectedOnRetry
                    }
                    Err(err) => {
                        error!(%err, "disconnect retry failed, abandoning session");
                        DisconnectOutcome::Abandoned
                    }
                }
            }
        }
    }

    /// Resume the guild's playback if it is paused. Returns whether a resume
    /// was requested successfully.
    pub fn resume(&self, guild_id: GuildId) -> bool {
        if !self.voice.playback_status(guild_id).is_paused() {
            return false;
        }
        match self.voice.resume(guild_id) {
            Ok(()) => {
                info!(%guild_id, "resumed playback");
                true
            }
            Err(err) => {
                warn!(%guild_id, %err, "failed to resume playback");
                false
            }
        }
    }

    /// Kill the decoder and stop playback if a source is loaded.
    ///
    /// The reaper is not guild-scoped, so only idle teardown uses this.
    /// Best-effort; failures are logged.
    pub async fn halt(&self, guild_id: GuildId) {
        if !self.voice.playback_status(guild_id).has_source() {
            return;
        }
        self.reaper
            .terminate_matching(&self.settings.decoder_pattern)
            .await;
        sleep_if_nonzero(self.settings.settle_delay).await;
        self.stop_source(guild_id).await;
    }

    /// Ask the voice layer to stop the loaded source, leaving processes alone.
    async fn stop_source(&self, guild_id: GuildId) {
        if !self.voice.playback_status(guild_id).has_source() {
            return;
        }
        if let Err(err) = self.voice.stop(guild_id) {
            warn!(%guild_id, %err, "failed to stop playback");
        }
        sleep_if_nonzero(self.settings.stop_delay).await;
    }

    /// Join (or move to) `channel_id` and start playing `source`.
    ///
    /// A source already loaded in the guild is stopped first. Presence
    /// failures are logged and do not fail the call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Voice` if the connection, move, or play request fails.
    pub async fn start_stream(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        source: AudioSource,
        activity: Activity,
        connect_timeout: Duration,
    ) -> Result<()> {
        let connected = self
            .voice
            .connections()
            .into_iter()
            .find(|c| c.guild_id == guild_id);

        match connected {
            Some(conn) if conn.channel_id == channel_id => {}
            Some(_) => self.voice.move_to(guild_id, channel_id).await?,
            None => {
                self.voice
                    .connect(guild_id, channel_id, connect_timeout)
                    .await?;
            }
        }

        self.stop_source(guild_id).await;
        self.voice.play(guild_id, source)?;
        info!(%guild_id, %channel_id, "stream started");

        if let Err(err) = self.voice.set_presence(Some(activity)).await {
            warn!(%err, "failed to set presence");
        }
        Ok(())
    }

    /// Stop playback and leave the voice channel on operator request.
    ///
    /// Returns `(was_playing, was_connected)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Voice` if the disconnect request fails.
    pub async fn stop_stream(&self, guild_id: GuildId) -> Result<(bool, bool)> {
        let was_playing = self.voice.playback_status(guild_id).is_playing();
        let was_connected = self.is_connected(guild_id);

        self.stop_source(guild_id).await;
        if was_connected {
            self.voice.disconnect(guild_id, false).await?;
            info!(%guild_id, "left voice channel on request");
        }
        if let Err(err) = self.voice.set_presence(None).await {
            warn!(%err, "failed to clear presence");
        }
        Ok((was_playing, was_connected))
    }

    /// Pause playback on operator request. Returns whether anything was playing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Voice` if the pause request fails.
    pub fn pause_stream(&self, guild_id: GuildId) -> Result<bool> {
        if !self.voice.playback_status(guild_id).is_playing() {
            return Ok(false);
        }
        self.voice.pause(guild_id)?;
        Ok(true)
    }

    /// Whether the bot holds a voice connection in the guild.
    #[must_use]
    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.voice
            .connections()
            .iter()
            .any(|c| c.guild_id == guild_id)
    }

    /// Pick the text channel for an inactivity notice.
    ///
    /// Preference: last command channel, then the guild's system channel,
    /// then the first text channel the bot may post in.
    #[must_use]
    pub fn notice_channel(&self, session: &Session) -> Option<ChannelId> {
        session
            .last_command_channel
            .into_iter()
            .chain(self.text.system_channel(session.guild_id))
            .chain(self.text.text_channels(session.guild_id))
            .find(|channel| self.text.can_send(*channel))
    }
}

async fn sleep_if_nonzero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
