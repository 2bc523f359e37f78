//! Periodic idle supervision of every active voice session.
//!
//! A single interval task calls [`SessionSupervisor::tick`], which walks the
//! voice layer's connections one guild at a time. Each guild is inspected
//! inside its [`SessionStateStore`] critical section, and gateway events
//! take the same lock, so a listener joining before a disconnect decision
//! always cancels it.
//!
//! Per guild and condition the timer is either absent or tracking since some
//! instant. The `empty` condition pauses playback on its first observation;
//! either condition held for `idle_timeout` disconnects the session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::models::idle::IdleCondition;
use crate::models::ids::{ChannelId, GuildId, UserId};
use crate::models::session::Session;
use crate::platform::{VoiceConnection, VoiceLayer};

use super::idle_store::{GroupState, SessionStateStore};
use super::playback::{DisconnectOutcome, PlaybackController};

/// Timing for the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// How long a condition must hold before the session is torn down.
    pub idle_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions examined.
    pub inspected: usize,
    /// Guilds auto-paused because their channel emptied.
    pub paused: Vec<GuildId>,
    /// Guilds torn down, with how each disconnect ended.
    pub disconnected: Vec<(GuildId, DisconnectOutcome)>,
}

/// Result of handling a voice-state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOutcome {
    /// Not a join into a channel the bot is streaming to.
    Ignored,
    /// The `empty` timer was cleared.
    Cleared,
    /// The `empty` timer was cleared and paused playback resumed.
    Resumed,
}

/// Drives idle detection and auto-pause, auto-resume, and auto-disconnect.
pub struct SessionSupervisor {
    voice: Arc<dyn VoiceLayer>,
    controller: Arc<PlaybackController>,
    store: Arc<SessionStateStore>,
    settings: SupervisorSettings,
}

impl SessionSupervisor {
    /// Build a supervisor around an explicitly owned state store.
    #[must_use]
    pub fn new(
        voice: Arc<dyn VoiceLayer>,
        controller: Arc<PlaybackController>,
        store: Arc<SessionStateStore>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            voice,
            controller,
            store,
            settings,
        }
    }

    /// The state store shared with event handlers.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStateStore> {
        &self.store
    }

    /// The playback controller used for auto-actions.
    #[must_use]
    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    /// Inspect every active session once.
    ///
    /// Sessions are processed sequentially; a slow teardown in one guild only
    /// holds that guild's lock. Afterwards, state for guilds without a voice
    /// connection or a running timer is dropped.
    pub async fn tick(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let connections = self.voice.connections();
        let mut active = HashSet::with_capacity(connections.len());
        for connection in connections {
            report.inspected += 1;
            active.insert(connection.guild_id);
            self.inspect(connection, now, &mut report).await;
        }
        let pruned = self.store.retain_active(&active).await;
        if pruned > 0 {
            debug!(pruned, "dropped state for guilds without a session");
        }
        report
    }

    async fn inspect(&self, connection: VoiceConnection, now: Instant, report: &mut TickReport) {
        let guild_id = connection.guild_id;
        let mut state = self.store.lock(guild_id).await;
        let session = Session::new(
            guild_id,
            connection.channel_id,
            self.voice.playback_status(guild_id),
        )
        .with_command_channel(state.last_command_channel());

        let mut expired: Option<IdleCondition> = None;

        // ── Empty channel ────────────────────────────────
        if self.is_empty(connection.channel_id) {
            if state.mark_if_absent(IdleCondition::Empty, now) {
                debug!(%guild_id, condition = %IdleCondition::Empty, "idle timer started");
                if session.playback.is_playing() && self.controller.pause_for_idle(&session).await {
                    report.paused.push(guild_id);
                }
            } else if self.has_expired(&state, IdleCondition::Empty, now) {
                expired = Some(IdleCondition::Empty);
            }
        } else {
            state.clear(IdleCondition::Empty);
        }

        // ── Paused playback ──────────────────────────────
        // Re-read: the branch above may have just paused the session.
        if self.voice.playback_status(guild_id).is_paused() {
            if state.mark_if_absent(IdleCondition::Paused, now) {
                debug!(%guild_id, condition = %IdleCondition::Paused, "idle timer started");
            } else if expired.is_none() && self.has_expired(&state, IdleCondition::Paused, now) {
                expired = Some(IdleCondition::Paused);
            }
        } else {
            state.clear(IdleCondition::Paused);
        }

        // ── Teardown ─────────────────────────────────────
        if let Some(condition) = expired {
            info!(%guild_id, %condition, "idle timeout reached");
            let outcome = self
                .controller
                .disconnect_idle(&session, condition.into())
                .await;
            state.clear_all();
            report.disconnected.push((guild_id, outcome));
        }
    }

    fn is_empty(&self, channel_id: ChannelId) -> bool {
        let me = self.voice.current_user();
        !self
            .voice
            .roster(channel_id)
            .iter()
            .any(|p| !p.bot && p.user_id != me)
    }

    fn has_expired(&self, state: &GroupState, condition: IdleCondition, now: Instant) -> bool {
        state
            .elapsed_since(condition, now)
            .is_some_and(|elapsed| elapsed >= self.settings.idle_timeout)
    }

    /// Handle a user's voice state changing.
    ///
    /// A join into the bot's channel cancels the `empty` timer. If playback
    /// sits paused with a `paused` timer running, it is resumed and that
    /// timer cleared too.
    pub async fn on_voice_state_update(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> MembershipOutcome {
        if user_id == self.voice.current_user() {
            return MembershipOutcome::Ignored;
        }
        let Some(joined) = channel_id else {
            return MembershipOutcome::Ignored;
        };
        let bound = self
            .voice
            .connections()
            .into_iter()
            .any(|c| c.guild_id == guild_id && c.channel_id == joined);
        if !bound {
            return MembershipOutcome::Ignored;
        }

        let mut state = self.store.lock(guild_id).await;
        state.clear(IdleCondition::Empty);

        if state.is_tracking(IdleCondition::Paused) && self.controller.resume(guild_id) {
            state.clear(IdleCondition::Paused);
            info!(%guild_id, %user_id, "listener joined, playback resumed");
            return MembershipOutcome::Resumed;
        }
        debug!(%guild_id, %user_id, "listener joined, empty timer cleared");
        MembershipOutcome::Cleared
    }

    /// Record command activity: remember the channel for notices and cancel
    /// both idle timers.
    pub async fn on_command(&self, guild_id: GuildId, channel_id: ChannelId) {
        let mut state = self.store.lock(guild_id).await;
        state.record_command_channel(channel_id);
        state.clear_all();
        debug!(%guild_id, %channel_id, "command activity recorded");
    }

    /// Spawn the periodic tick task.
    ///
    /// The task waits until `ready` reports `true`, then ticks every
    /// `tick_interval`. A tick that overruns delays the next one instead of
    /// overlapping it. Runs until `cancel` fires.
    #[must_use]
    pub fn spawn(
        self: Arc<Self>,
        mut ready: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                let became_ready = tokio::select! {
                    () = cancel.cancelled() => false,
                    res = ready.wait_for(|r| *r) => res.is_ok(),
                };
                if !became_ready {
                    info!("session supervisor stopped before ready");
                    return;
                }

                let mut interval = tokio::time::interval(self.settings.tick_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(
                    tick_secs = self.settings.tick_interval.as_secs(),
                    timeout_secs = self.settings.idle_timeout.as_secs(),
                    "session supervisor started"
                );

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("session supervisor shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            let report = self.tick(Instant::now()).await;
                            debug!(
                                inspected = report.inspected,
                                paused = report.paused.len(),
                                disconnected = report.disconnected.len(),
                                "tick complete"
                            );
                        }
                    }
                }
            }
            .instrument(info_span!("session_supervisor")),
        )
    }
}
