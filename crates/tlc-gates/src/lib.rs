//! TLC Gates - runs automated release gates as external commands
//!
//! Each automated gate (`tests`, `security`, `coverage`) maps to one
//! configured argv. The command sees the release under test through
//! `TLC_*` environment variables and reports through its exit status.

pub mod command;
pub mod runner;

pub use command::{GateCommand, DEFAULT_TIMEOUT_SECS};
pub use runner::{CommandGateRunner, CommandOutput};
