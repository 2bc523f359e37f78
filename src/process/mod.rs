//! Decoder subprocess discovery and escalating termination.

pub mod reaper;
pub mod table;
