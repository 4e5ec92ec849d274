//! Project reference resolution.
//!
//! `fuzzy` holds the pure scoring helpers; `resolver` wires them to the
//! project store and session context.

pub mod fuzzy;
pub mod resolver;
