//! Strongly typed platform identifiers.
//!
//! Guilds, channels, and users are all 64-bit snowflakes on the chat
//! platform; wrapping them keeps a channel ID from being passed where a
//! guild ID is expected.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Top-level group (server) that owns at most one streaming session.
    GuildId
);

snowflake!(
    /// Voice or text channel within a guild.
    ChannelId
);

snowflake!(
    /// Platform user, human or bot.
    UserId
);
