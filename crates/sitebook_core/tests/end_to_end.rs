use sitebook_core::db::open_db_in_memory;
use sitebook_core::{
    Coordinates, CreateProjectRequest, OfflineGeocoder, ProjectLifecycleManager, ProjectStore,
    SessionContextStore, SitebookConfig, SqliteProjectStore, SqliteSessionStore,
};
use std::sync::Arc;

#[test]
fn duplicate_site_is_detected_then_cleaned_up() {
    let conn = open_db_in_memory().unwrap();
    let store = Arc::new(SqliteProjectStore::new(&conn));
    let sessions = Arc::new(SqliteSessionStore::new(&conn, 10));
    let manager = ProjectLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&sessions),
        OfflineGeocoder,
        SitebookConfig::default(),
    );
    let site = Coordinates::new(35.067482, -101.395466);

    let first = manager.create_project(
        "chat",
        &CreateProjectRequest::from_query("new wind farm")
            .at(site)
            .named("amarillo-tx-wind-farm"),
    );
    assert!(first.success, "{}", first.message);
    assert!(first.payload.duplicates.is_empty());

    let nearby = manager.check_for_duplicates(site, None);
    assert!(nearby.success, "{}", nearby.message);
    assert_eq!(nearby.payload.duplicates.len(), 1);
    assert_eq!(nearby.payload.duplicates[0].name, "amarillo-tx-wind-farm");
    assert!(nearby.payload.duplicates[0].distance_km < 0.001);

    let second = manager.create_project("chat", &CreateProjectRequest::from_query("second site").at(site));
    assert!(second.success, "{}", second.message);
    let loser = second.payload.project.unwrap().name;
    assert_eq!(loser, "site-n35-0675-w101-3955-wind-farm");
    assert_eq!(second.payload.duplicates.len(), 1);
    assert_eq!(second.payload.duplicates[0].name, "amarillo-tx-wind-farm");
    assert!(second.payload.duplicates[0].distance_km < 0.001);

    let renamed = manager.rename_project("amarillo-tx-wind-farm", "Amarillo Primary");
    assert!(renamed.success, "{}", renamed.message);

    let pending = manager.delete_project(&loser, false);
    assert!(pending.requires_confirmation);
    let deleted = manager.delete_project(&loser, true);
    assert!(deleted.success, "{}", deleted.message);

    let listing = manager.list_projects(true);
    let names = listing
        .payload
        .projects
        .iter()
        .map(|summary| summary.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["amarillo-primary-wind-farm"]);
    assert_eq!(store.list_names().unwrap(), vec!["amarillo-primary-wind-farm"]);
    // The loser was active last; deleting it leaves no dangling pointer.
    assert_eq!(sessions.active_project("chat").unwrap(), None);
    assert_eq!(sessions.history("chat").unwrap(), vec!["amarillo-primary-wind-farm"]);
}
