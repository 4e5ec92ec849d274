use rusqlite::Connection;
use sitebook_core::db::open_db_in_memory;
use sitebook_core::{
    Confidence, ExpectedVersion, ProjectRecord, ProjectReferenceResolver, ProjectStore,
    SessionContextStore, SitebookConfig, SqliteProjectStore, SqliteSessionStore,
};
use std::sync::Arc;

type Resolver<'conn> = ProjectReferenceResolver<SqliteProjectStore<'conn>, SqliteSessionStore<'conn>>;

struct Fixture<'conn> {
    store: Arc<SqliteProjectStore<'conn>>,
    sessions: Arc<SqliteSessionStore<'conn>>,
    resolver: Resolver<'conn>,
}

fn fixture<'conn>(conn: &'conn Connection, names: &[&str]) -> Fixture<'conn> {
    let store = Arc::new(SqliteProjectStore::new(conn));
    for name in names {
        store
            .save_project(&ProjectRecord::new(*name, None), ExpectedVersion::Absent)
            .unwrap();
    }
    let sessions = Arc::new(SqliteSessionStore::new(conn, 10));
    let resolver = ProjectReferenceResolver::new(
        Arc::clone(&store),
        Arc::clone(&sessions),
        &SitebookConfig::default(),
    );
    Fixture {
        store,
        sessions,
        resolver,
    }
}

#[test]
fn exact_explicit_reference_wins_over_similar_names() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["north-texas-wind-farm", "south-texas-wind-farm"]);

    let result = fx
        .resolver
        .resolve("s1", "run layout for project north-texas-wind-farm")
        .unwrap();

    assert_eq!(result.name.as_deref(), Some("north-texas-wind-farm"));
    assert_eq!(result.confidence, Confidence::Explicit);
    assert!(!result.is_ambiguous);
}

#[test]
fn explicit_reference_matches_canonical_form() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["lubbock-wind-farm"]);

    let result = fx
        .resolver
        .resolve("s1", "terrain analysis for the Lubbock project")
        .unwrap();

    assert_eq!(result.name.as_deref(), Some("lubbock-wind-farm"));
    assert_eq!(result.confidence, Confidence::Explicit);
}

#[test]
fn that_project_resolves_to_most_recent_history_entry() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["a-wind-farm", "b-wind-farm"]);
    fx.sessions.append_history("s1", "b-wind-farm").unwrap();
    fx.sessions.append_history("s1", "a-wind-farm").unwrap();

    let result = fx.resolver.resolve("s1", "open that project").unwrap();

    assert_eq!(result.name.as_deref(), Some("a-wind-farm"));
    assert_eq!(result.confidence, Confidence::Implicit);
}

#[test]
fn continue_resolves_to_active_project() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["a-wind-farm", "b-wind-farm"]);
    fx.sessions.set_active_project("s1", "b-wind-farm").unwrap();

    let result = fx.resolver.resolve("s1", "continue with the layout").unwrap();

    assert_eq!(result.name.as_deref(), Some("b-wind-farm"));
    assert_eq!(result.confidence, Confidence::Implicit);
}

#[test]
fn shared_token_is_reported_as_ambiguous() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["north-texas-wind-farm", "south-texas-wind-farm"]);

    let result = fx.resolver.resolve("s1", "for texas").unwrap();

    assert!(result.is_ambiguous);
    assert_eq!(result.name, None);
    assert_eq!(
        result.candidates,
        vec!["north-texas-wind-farm", "south-texas-wind-farm"]
    );
    // Ambiguity does not touch the session.
    assert!(fx.sessions.history("s1").unwrap().is_empty());
    assert_eq!(fx.sessions.active_project("s1").unwrap(), None);
}

#[test]
fn unmatched_explicit_fragment_seeds_partial_matching() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm", "lubbock-wind-farm"]);

    let result = fx
        .resolver
        .resolve("s1", "wake model for project amarilo")
        .unwrap();

    assert_eq!(result.name.as_deref(), Some("amarillo-tx-wind-farm"));
    assert_eq!(result.confidence, Confidence::Partial);
}

#[test]
fn unrelated_query_falls_back_to_active_project() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm"]);
    fx.sessions
        .set_active_project("s1", "amarillo-tx-wind-farm")
        .unwrap();

    let result = fx.resolver.resolve("s1", "run wake simulation").unwrap();

    assert_eq!(result.name.as_deref(), Some("amarillo-tx-wind-farm"));
    assert_eq!(result.confidence, Confidence::Active);
}

#[test]
fn nothing_to_go_on_is_unresolved() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm"]);

    let result = fx.resolver.resolve("s1", "run wake simulation").unwrap();

    assert_eq!(result.name, None);
    assert_eq!(result.confidence, Confidence::Unresolved);
    assert!(!result.is_ambiguous);
}

#[test]
fn definite_resolution_updates_session() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["a-wind-farm", "lubbock-wind-farm"]);
    fx.sessions.append_history("s1", "a-wind-farm").unwrap();

    fx.resolver.resolve("s1", "open project lubbock").unwrap();

    let context = fx.sessions.context("s1").unwrap();
    assert_eq!(context.active_project.as_deref(), Some("lubbock-wind-farm"));
    assert_eq!(context.history, vec!["lubbock-wind-farm", "a-wind-farm"]);
}

#[test]
fn fragment_resolution_never_falls_back_to_active() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm"]);
    fx.sessions
        .set_active_project("s1", "amarillo-tx-wind-farm")
        .unwrap();

    let missing = fx.resolver.resolve_fragment("s1", "sweetwater").unwrap();
    assert_eq!(missing.confidence, Confidence::Unresolved);

    let deictic = fx.resolver.resolve_fragment("s1", "this project").unwrap();
    assert_eq!(deictic.name.as_deref(), Some("amarillo-tx-wind-farm"));
    assert_eq!(deictic.confidence, Confidence::Implicit);
}

#[test]
fn name_listing_is_cached_until_cleared() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm"]);
    assert_eq!(
        fx.resolver
            .resolve_fragment("s1", "sweetwater-wind-farm")
            .unwrap()
            .confidence,
        Confidence::Unresolved
    );

    fx.store
        .save_project(
            &ProjectRecord::new("sweetwater-wind-farm", None),
            ExpectedVersion::Absent,
        )
        .unwrap();
    assert_eq!(
        fx.resolver
            .resolve_fragment("s1", "sweetwater-wind-farm")
            .unwrap()
            .confidence,
        Confidence::Unresolved
    );

    fx.resolver.clear_cache();
    let result = fx
        .resolver
        .resolve_fragment("s1", "sweetwater-wind-farm")
        .unwrap();
    assert_eq!(result.name.as_deref(), Some("sweetwater-wind-farm"));
    assert_eq!(result.confidence, Confidence::Explicit);
}

#[test]
fn session_references_skip_archived_projects() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm", "lubbock-wind-farm"]);
    let first = fx
        .resolver
        .resolve("s1", "for project amarillo-tx-wind-farm")
        .unwrap();
    assert_eq!(first.confidence, Confidence::Explicit);

    let mut record = fx
        .store
        .load_project("amarillo-tx-wind-farm")
        .unwrap()
        .unwrap();
    let expected = ExpectedVersion::Exactly(record.version);
    record.archive(record.updated_at + 1);
    fx.store.save_project(&record, expected).unwrap();

    let recent = fx.resolver.resolve("s1", "run layout on that project").unwrap();
    assert_eq!(recent.name, None);
    assert_eq!(recent.confidence, Confidence::Unresolved);

    // The active pointer still names the archived project here.
    let active = fx.resolver.resolve("s1", "continue").unwrap();
    assert_eq!(active.name, None);
    assert_eq!(
        fx.sessions.active_project("s1").unwrap().as_deref(),
        Some("amarillo-tx-wind-farm")
    );
}

#[test]
fn bare_pronoun_fragment_targets_active_project() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["lubbock-wind-farm"]);
    fx.sessions.set_active_project("s1", "lubbock-wind-farm").unwrap();

    let result = fx.resolver.resolve_fragment("s1", "it").unwrap();

    assert_eq!(result.name.as_deref(), Some("lubbock-wind-farm"));
    assert_eq!(result.confidence, Confidence::Implicit);
}

#[test]
fn named_fragment_beats_incidental_deictic_phrase() {
    let conn = open_db_in_memory().unwrap();
    let fx = fixture(&conn, &["amarillo-tx-wind-farm", "lubbock-wind-farm"]);
    fx.sessions.set_active_project("s1", "lubbock-wind-farm").unwrap();

    let result = fx
        .resolver
        .resolve("s1", "run layout for the project amarillo")
        .unwrap();

    assert_eq!(result.name.as_deref(), Some("amarillo-tx-wind-farm"));
    assert_eq!(result.confidence, Confidence::Partial);
    assert_eq!(
        fx.sessions.active_project("s1").unwrap().as_deref(),
        Some("amarillo-tx-wind-farm")
    );
}
