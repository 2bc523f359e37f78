//! NTS radio commands and now-playing metadata.

pub mod commands;
pub mod now_playing;
