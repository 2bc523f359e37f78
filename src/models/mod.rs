//! Domain models shared by the supervisor, controller, and commands.

pub mod idle;
pub mod ids;
pub mod session;
