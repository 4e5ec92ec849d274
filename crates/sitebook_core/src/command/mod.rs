//! Free-text lifecycle command parsing.

pub mod intent;

pub use intent::{parse_command, CommandIntent};
