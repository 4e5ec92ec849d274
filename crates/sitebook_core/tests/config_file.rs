use sitebook_core::db::open_db_in_memory;
use sitebook_core::{
    ConfigError, Coordinates, CreateProjectRequest, OfflineGeocoder, ProjectLifecycleManager,
    SitebookConfig, SqliteProjectStore, SqliteSessionStore,
};
use std::io::Write;
use std::sync::Arc;

#[test]
fn file_config_drives_naming_and_duplicate_radius() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name_suffix = \"solar-farm\"").unwrap();
    writeln!(file, "duplicate_radius_km = 0.5").unwrap();
    let config = SitebookConfig::load(file.path()).unwrap();
    assert_eq!(config.history_limit, SitebookConfig::default().history_limit);

    let conn = open_db_in_memory().unwrap();
    let store = Arc::new(SqliteProjectStore::new(&conn));
    let sessions = Arc::new(SqliteSessionStore::new(&conn, config.history_limit));
    let manager = ProjectLifecycleManager::new(store, sessions, OfflineGeocoder, config);

    let first = manager.create_project(
        "s1",
        &CreateProjectRequest::from_query("array near Dalhart").at(Coordinates::new(36.06, -102.52)),
    );
    assert_eq!(first.payload.project.unwrap().name, "dalhart-solar-farm");

    // About 1.1 km north: outside the configured radius.
    let second = manager.create_project(
        "s1",
        &CreateProjectRequest::from_query("array near Texline").at(Coordinates::new(36.07, -102.52)),
    );
    assert!(second.success);
    assert!(second.payload.duplicates.is_empty());
}

#[test]
fn missing_and_invalid_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        SitebookConfig::load(dir.path().join("absent.toml")),
        Err(ConfigError::Io { .. })
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "history_limit = 0").unwrap();
    assert!(matches!(
        SitebookConfig::load(file.path()),
        Err(ConfigError::InvalidValue {
            field: "history_limit",
            ..
        })
    ));

    let mut broken = tempfile::NamedTempFile::new().unwrap();
    writeln!(broken, "name_suffix = ").unwrap();
    assert!(matches!(
        SitebookConfig::load(broken.path()),
        Err(ConfigError::Parse(_))
    ));
}
