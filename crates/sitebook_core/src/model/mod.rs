//! Domain model for site analysis projects.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep coordinates, project records and session state free of storage
//!   details.
//!
//! # Invariants
//! - Every project is addressed by its canonical name.
//! - Deletion is a hard delete; archive is the reversible soft state.

pub mod export;
pub mod geo;
pub mod project;
pub mod session;
