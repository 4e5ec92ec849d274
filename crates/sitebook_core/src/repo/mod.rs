//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the project store and session context store contracts.
//! - Isolate SQLite query details from lifecycle orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `VersionConflict`)
//!   in addition to DB transport errors.

pub mod project_repo;
pub mod session_repo;
