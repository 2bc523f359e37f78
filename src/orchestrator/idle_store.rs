//! Per-guild idle timer state shared by the supervisor and event handlers.
//!
//! Every guild owns one [`GroupState`] behind its own async mutex. The
//! supervisor tick and the gateway event handlers both go through
//! [`SessionStateStore::lock`], so a join that is processed before a
//! disconnect decision is always visible to that decision.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::models::idle::IdleCondition;
use crate::models::ids::{ChannelId, GuildId};

/// Timer entries and routing bookkeeping for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupState {
    empty_since: Option<Instant>,
    paused_since: Option<Instant>,
    last_command_channel: Option<ChannelId>,
}

impl GroupState {
    fn slot(&mut self, condition: IdleCondition) -> &mut Option<Instant> {
        match condition {
            IdleCondition::Empty => &mut self.empty_since,
            IdleCondition::Paused => &mut self.paused_since,
        }
    }

    fn since(&self, condition: IdleCondition) -> Option<Instant> {
        match condition {
            IdleCondition::Empty => self.empty_since,
            IdleCondition::Paused => self.paused_since,
        }
    }

    /// Start tracking `condition` at `now` unless it is already tracked.
    ///
    /// Returns `true` when this call created the entry, i.e. this is the
    /// first observation of a new idle episode.
    pub fn mark_if_absent(&mut self, condition: IdleCondition, now: Instant) -> bool {
        let slot = self.slot(condition);
        if slot.is_some() {
            return false;
        }
        *slot = Some(now);
        true
    }

    /// Time `condition` has been continuously true, or `None` if untracked.
    #[must_use]
    pub fn elapsed_since(&self, condition: IdleCondition, now: Instant) -> Option<Duration> {
        self.since(condition)
            .map(|since| now.saturating_duration_since(since))
    }

    /// Stop tracking `condition`. Idempotent.
    pub fn clear(&mut self, condition: IdleCondition) {
        *self.slot(condition) = None;
    }

    /// Stop tracking both conditions. The command channel is kept.
    pub fn clear_all(&mut self) {
        self.empty_since = None;
        self.paused_since = None;
    }

    /// Whether either idle timer is running.
    #[must_use]
    pub fn has_timers(&self) -> bool {
        self.empty_since.is_some() || self.paused_since.is_some()
    }

    /// Whether `condition` currently has a timer entry.
    #[must_use]
    pub fn is_tracking(&self, condition: IdleCondition) -> bool {
        self.since(condition).is_some()
    }

    /// Text channel the last command for this guild came from.
    #[must_use]
    pub fn last_command_channel(&self) -> Option<ChannelId> {
        self.last_command_channel
    }

    /// Remember where the latest command was issued.
    pub fn record_command_channel(&mut self, channel_id: ChannelId) {
        self.last_command_channel = Some(channel_id);
    }
}

/// Process-wide map from guild to its [`GroupState`].
///
/// Owned by the supervisor and handed to event handlers by `Arc`; there is
/// no ambient global state.
#[derive(Debug, Default)]
pub struct SessionStateStore {
    groups: Mutex<HashMap<GuildId, Arc<Mutex<GroupState>>>>,
}

impl SessionStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section for one guild.
    ///
    /// The returned guard serializes every mutation for that guild; guards
    /// for different guilds do not contend.
    pub async fn lock(&self, guild_id: GuildId) -> OwnedMutexGuard<GroupState> {
        let cell = {
            let mut groups = self.groups.lock().await;
            Arc::clone(groups.entry(guild_id).or_default())
        };
        cell.lock_owned().await
    }

    /// Drop the state of every guild outside `active` that has no running
    /// timer, returning how many were removed.
    ///
    /// A guild whose cell is held or awaited by another task is kept, so
    /// there is never more than one cell per guild.
    pub async fn retain_active(&self, active: &HashSet<GuildId>) -> usize {
        let mut groups = self.groups.lock().await;
        let before = groups.len();
        groups.retain(|guild_id, cell| {
            if active.contains(guild_id) || Arc::strong_count(cell) > 1 {
                return true;
            }
            cell.try_lock().map_or(true, |state| state.has_timers())
        });
        before - groups.len()
    }

    /// Number of guilds with stored state.
    pub async fn len(&self) -> usize {
        self.groups.lock().await.len()
    }

    /// Whether no guild has stored state.
    pub async fn is_empty(&self) -> bool {
        self.groups.lock().await.is_empty()
    }

    /// See [`GroupState::mark_if_absent`].
    pub async fn mark_if_absent(
        &self,
        guild_id: GuildId,
        condition: IdleCondition,
        now: Instant,
    ) -> bool {
        self.lock(guild_id).await.mark_if_absent(condition, now)
    }

    /// See [`GroupState::elapsed_since`].
    pub async fn elapsed_since(
        &self,
        guild_id: GuildId,
        condition: IdleCondition,
        now: Instant,
    ) -> Option<Duration> {
        self.lock(guild_id).await.elapsed_since(condition, now)
    }

    /// See [`GroupState::clear`].
    pub async fn clear(&self, guild_id: GuildId, condition: IdleCondition) {
        self.lock(guild_id).await.clear(condition);
    }

    /// See [`GroupState::clear_all`].
    pub async fn clear_all(&self, guild_id: GuildId) {
        self.lock(guild_id).await.clear_all();
    }

    /// See [`GroupState::is_tracking`].
    pub async fn is_tracking(&self, guild_id: GuildId, condition: IdleCondition) -> bool {
        self.lock(guild_id).await.is_tracking(condition)
    }

    /// See [`GroupState::last_command_channel`].
    pub async fn last_command_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.lock(guild_id).await.last_command_channel()
    }

    /// See [`GroupState::record_command_channel`].
    pub async fn record_command_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.lock(guild_id).await.record_command_channel(channel_id);
    }
}
