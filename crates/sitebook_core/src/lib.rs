//! Core domain logic for Sitebook project management.
//!
//! Resolves natural-language project references, generates canonical
//! location-based names and runs the project lifecycle over a SQLite store.

pub mod command;
pub mod config;
pub mod db;
pub mod geocode;
pub mod logging;
pub mod model;
pub mod naming;
pub mod repo;
pub mod resolve;
pub mod service;

pub use command::{parse_command, CommandIntent};
pub use config::{ConfigError, SitebookConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use geocode::{GeocodeError, GeocodingClient, OfflineGeocoder, PlaceCandidate};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::export::{ProjectExport, TransferError, EXPORT_FORMAT_VERSION};
pub use model::geo::{CoordinateError, Coordinates};
pub use model::project::{ProjectId, ProjectMetadata, ProjectRecord, ProjectStatus, ProjectSummary};
pub use model::session::SessionContext;
pub use naming::generator::{CanonicalNameGenerator, GeneratedName, NameSource};
pub use repo::project_repo::{
    ExpectedVersion, ProjectStore, RepoError, RepoResult, SqliteProjectStore,
};
pub use repo::session_repo::{SessionContextStore, SqliteSessionStore};
pub use resolve::resolver::{Confidence, ProjectReferenceResolver, ResolutionResult};
pub use service::lifecycle_service::{
    CreateProjectRequest, ProjectLifecycleManager, ProjectSearchFilters,
};
pub use service::outcome::{
    DuplicateGroup, DuplicateMatch, LifecycleErrorCode, LifecycleOutcome, OutcomePayload,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
