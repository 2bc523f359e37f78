//! Session orchestration modules.
//!
//! Covers idle timer state, playback control, periodic supervision, and
//! routing of platform events into the supervisor.

pub mod event_consumer;
pub mod idle_store;
pub mod playback;
pub mod supervisor;
