//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, session and naming calls into lifecycle operations.
//! - Keep callers (CLI, agents) decoupled from storage details.

pub mod lifecycle_service;
pub mod outcome;
