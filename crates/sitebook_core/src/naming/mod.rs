//! Canonical project naming.
//!
//! # Responsibility
//! - Turn location phrases and coordinates into store keys.

pub mod generator;
