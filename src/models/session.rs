//! Streaming session model and playback status.

use super::ids::{ChannelId, GuildId};

/// Playback status reported by the voice layer for a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Audio is being sent to the voice channel.
    Playing,
    /// A source is loaded but playback is suspended.
    Paused,
    /// Nothing is loaded.
    #[default]
    Stopped,
}

impl PlaybackStatus {
    /// Whether audio is currently flowing.
    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Whether playback is suspended.
    #[must_use]
    pub fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether a source is loaded (playing or paused), i.e. a decoder may be alive.
    #[must_use]
    pub fn has_source(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// One active audio stream bound to one voice channel in one guild.
///
/// Sessions are snapshots: the supervisor rebuilds one from the voice
/// layer every tick and the voice layer keeps ownership of the underlying
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Guild the session belongs to.
    pub guild_id: GuildId,
    /// Voice channel the bot is connected to.
    pub voice_channel: ChannelId,
    /// Playback status at snapshot time.
    pub playback: PlaybackStatus,
    /// Text channel where the last command for this guild was issued.
    pub last_command_channel: Option<ChannelId>,
}

impl Session {
    /// Construct a session snapshot with no known command channel.
    #[must_use]
    pub fn new(guild_id: GuildId, voice_channel: ChannelId, playback: PlaybackStatus) -> Self {
        Self {
            guild_id,
            voice_channel,
            playback,
            last_command_channel: None,
        }
    }

    /// Attach the last command channel used in this guild.
    #[must_use]
    pub fn with_command_channel(mut self, channel: Option<ChannelId>) -> Self {
        self.last_command_channel = channel;
        self
    }
}
