#![forbid(unsafe_code)]

//! Session lifecycle supervision for an NTS radio voice bot.
//!
//! The chat-platform client is abstracted behind [`platform`]; everything
//! else (idle supervision, decoder reaping, playback control, radio
//! commands) lives here.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod radio;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
