//! Chat-platform abstraction consumed by the supervisor and commands.
//!
//! The [`VoiceLayer`] and [`TextLayer`] traits decouple the session
//! lifecycle core from any concrete Discord client library. A client
//! adapter implements both traits and forwards gateway activity into
//! the core as [`PlatformEvent`]s.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::models::ids::{ChannelId, GuildId, UserId};
use crate::models::session::PlaybackStatus;
use crate::Result;

/// Boxed future returned by the platform traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Events emitted by the platform adapter into the shared event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The client finished connecting and caches are populated.
    Ready,
    /// A user joined, left, or moved between voice channels.
    VoiceStateUpdate {
        /// Guild the voice state belongs to.
        guild_id: GuildId,
        /// User whose voice state changed.
        user_id: UserId,
        /// Channel the user is now in; `None` when they left voice entirely.
        channel_id: Option<ChannelId>,
    },
    /// A bot command was issued in a text channel.
    CommandIssued {
        /// Guild the command was issued in.
        guild_id: GuildId,
        /// Text channel the command came from.
        channel_id: ChannelId,
    },
}

/// A member present in a voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    /// Platform user ID.
    pub user_id: UserId,
    /// Whether the account is a bot.
    pub bot: bool,
}

impl Participant {
    /// A human listener.
    #[must_use]
    pub fn listener(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            bot: false,
        }
    }

    /// A bot account.
    #[must_use]
    pub fn bot(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            bot: true,
        }
    }
}

/// A live voice connection held by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConnection {
    /// Guild the connection belongs to.
    pub guild_id: GuildId,
    /// Channel the bot is connected to.
    pub channel_id: ChannelId,
}

/// Audio input handed to the voice layer, which spawns the decoder for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    /// Stream URL passed to the decoder.
    pub url: String,
    /// Linear volume multiplier.
    pub volume: f32,
}

/// Bot presence shown next to its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Text after "Listening to".
    pub listening_to: String,
}

/// Outgoing plain-text channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Message content.
    pub body: String,
}

impl OutgoingMessage {
    /// Create a plain-text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Voice connection and playback operations.
///
/// Playback controls are keyed by guild because a guild holds at most one
/// voice connection.
pub trait VoiceLayer: Send + Sync {
    /// The bot's own user ID.
    fn current_user(&self) -> UserId;

    /// All voice connections that are currently established.
    fn connections(&self) -> Vec<VoiceConnection>;

    /// Current playback status for the guild's connection.
    fn playback_status(&self, guild_id: GuildId) -> PlaybackStatus;

    /// Members currently present in a voice channel.
    fn roster(&self, channel_id: ChannelId) -> Vec<Participant>;

    /// Join a voice channel, failing if the handshake exceeds `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) when the
    /// connection cannot be established.
    fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<()>>;

    /// Move an existing connection to another channel in the same guild.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if the move fails.
    fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> BoxFuture<'_, Result<()>>;

    /// Leave the voice channel. `force` skips graceful shutdown handshakes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if the platform
    /// rejects the disconnect.
    fn disconnect(&self, guild_id: GuildId, force: bool) -> BoxFuture<'_, Result<()>>;

    /// Start playing a source, spawning a decoder subprocess.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if not connected
    /// or the decoder cannot be started.
    fn play(&self, guild_id: GuildId, source: AudioSource) -> Result<()>;

    /// Suspend playback.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if not connected.
    fn pause(&self, guild_id: GuildId) -> Result<()>;

    /// Resume suspended playback.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if not connected.
    fn resume(&self, guild_id: GuildId) -> Result<()>;

    /// Stop playback and drop the current source.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if not connected.
    fn stop(&self, guild_id: GuildId) -> Result<()>;

    /// Set or clear the bot presence.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Voice`](crate::AppError::Voice) if the gateway
    /// rejects the update.
    fn set_presence(&self, activity: Option<Activity>) -> BoxFuture<'_, Result<()>>;
}

/// Text channel messaging operations.
pub trait TextLayer: Send + Sync {
    /// Post a message to a text channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Messaging`](crate::AppError::Messaging) if delivery fails.
    fn send(&self, channel_id: ChannelId, message: OutgoingMessage)
        -> BoxFuture<'_, Result<()>>;

    /// Whether the bot has permission to post in the channel.
    fn can_send(&self, channel_id: ChannelId) -> bool;

    /// The guild's system (default) text channel, if configured.
    fn system_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// All text channels in the guild, in display order.
    fn text_channels(&self, guild_id: GuildId) -> Vec<ChannelId>;
}
