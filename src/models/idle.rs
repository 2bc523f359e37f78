//! Idle conditions tracked per guild and the reasons they end a session.

use std::fmt::{Display, Formatter};

/// A condition that, held long enough, makes a session eligible for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdleCondition {
    /// No non-bot participant is in the connected voice channel.
    Empty,
    /// Playback is paused.
    Paused,
}

impl IdleCondition {
    /// Both conditions, in evaluation order.
    pub const ALL: [Self; 2] = [Self::Empty, Self::Paused];

    /// Stable lowercase name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Paused => "paused",
        }
    }
}

impl Display for IdleCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the supervisor is tearing a session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The voice channel stayed empty past the idle timeout.
    EmptyChannel,
    /// Playback stayed paused past the idle timeout.
    PausedTooLong,
}

impl DisconnectReason {
    /// Human-readable notice posted to the guild before disconnecting.
    #[must_use]
    pub fn notice(self) -> &'static str {
        match self {
            Self::EmptyChannel => "\u{1f50c} Disconnecting due to inactivity (nobody is listening)",
            Self::PausedTooLong => "\u{1f50c} Disconnecting due to inactivity (stream paused)",
        }
    }
}

impl From<IdleCondition> for DisconnectReason {
    fn from(condition: IdleCondition) -> Self {
        match condition {
            IdleCondition::Empty => Self::EmptyChannel,
            IdleCondition::Paused => Self::PausedTooLong,
        }
    }
}
