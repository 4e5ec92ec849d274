use serde_json::json;
use sitebook_core::db::open_db_in_memory;
use sitebook_core::{
    Coordinates, ExpectedVersion, ProjectRecord, ProjectStatus, ProjectStore, RepoError,
    SqliteProjectStore,
};

#[test]
fn save_and_load_preserves_every_field() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);

    let mut record = ProjectRecord::new(
        "amarillo-tx-wind-farm",
        Some(Coordinates::new(35.067482, -101.395466)),
    );
    record.results.insert("terrain".into(), json!({"cells": 4096}));
    record.status = ProjectStatus::InProgress;
    record.metadata.location = Some("Amarillo TX".into());
    record.archive(record.created_at + 5);

    let version = store.save_project(&record, ExpectedVersion::Absent).unwrap();
    assert_eq!(version, 1);

    let loaded = store.load_project("amarillo-tx-wind-farm").unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded, ProjectRecord { version: 1, ..record });
}

#[test]
fn versions_increase_by_one_per_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);
    let record = ProjectRecord::new("lubbock-wind-farm", None);

    assert_eq!(store.save_project(&record, ExpectedVersion::Absent).unwrap(), 1);
    assert_eq!(store.save_project(&record, ExpectedVersion::Exactly(1)).unwrap(), 2);
    assert_eq!(store.save_project(&record, ExpectedVersion::Any).unwrap(), 3);
}

#[test]
fn stale_expectations_are_rejected_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);
    let mut record = ProjectRecord::new("lubbock-wind-farm", None);
    store.save_project(&record, ExpectedVersion::Absent).unwrap();
    store.save_project(&record, ExpectedVersion::Exactly(1)).unwrap();

    record.metadata.location = Some("stale".into());
    let err = store
        .save_project(&record, ExpectedVersion::Exactly(1))
        .unwrap_err();
    match err {
        RepoError::VersionConflict {
            name,
            expected,
            actual,
        } => {
            assert_eq!(name, "lubbock-wind-farm");
            assert_eq!(expected, ExpectedVersion::Exactly(1));
            assert_eq!(actual, Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    let loaded = store.load_project("lubbock-wind-farm").unwrap().unwrap();
    assert_eq!(loaded.metadata.location, None);
    assert_eq!(loaded.version, 2);

    assert!(matches!(
        store.save_project(&record, ExpectedVersion::Absent),
        Err(RepoError::VersionConflict { actual: Some(2), .. })
    ));
}

#[test]
fn delete_honours_expected_version() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);
    let record = ProjectRecord::new("sweetwater-wind-farm", None);
    store.save_project(&record, ExpectedVersion::Absent).unwrap();

    assert!(matches!(
        store.delete_project("sweetwater-wind-farm", ExpectedVersion::Exactly(7)),
        Err(RepoError::VersionConflict { .. })
    ));
    assert!(store
        .delete_project("sweetwater-wind-farm", ExpectedVersion::Exactly(1))
        .unwrap());
    assert!(!store
        .delete_project("sweetwater-wind-farm", ExpectedVersion::Any)
        .unwrap());
    assert!(matches!(
        store.delete_project("sweetwater-wind-farm", ExpectedVersion::Exactly(1)),
        Err(RepoError::VersionConflict { actual: None, .. })
    ));
}

#[test]
fn listings_are_sorted_by_name() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);
    for name in ["c-wind-farm", "a-wind-farm", "b-wind-farm"] {
        store
            .save_project(&ProjectRecord::new(name, None), ExpectedVersion::Absent)
            .unwrap();
    }

    assert_eq!(
        store.list_names().unwrap(),
        vec!["a-wind-farm", "b-wind-farm", "c-wind-farm"]
    );
    let records = store.list_projects().unwrap();
    assert_eq!(records[0].name, "a-wind-farm");
    assert_eq!(records.len(), 3);
}

#[test]
fn partial_name_lookup_treats_like_wildcards_literally() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteProjectStore::new(&conn);
    for name in ["north-texas-wind-farm", "south-texas-wind-farm", "site_100-wind-farm"] {
        store
            .save_project(&ProjectRecord::new(name, None), ExpectedVersion::Absent)
            .unwrap();
    }

    assert_eq!(
        store.find_by_partial_name("TEXAS").unwrap(),
        vec!["north-texas-wind-farm", "south-texas-wind-farm"]
    );
    assert_eq!(
        store.find_by_partial_name("site_").unwrap(),
        vec!["site_100-wind-farm"]
    );
    assert!(store.find_by_partial_name("%").unwrap().is_empty());
}

#[test]
fn corrupted_rows_surface_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO projects (name, project_uuid, created_at, updated_at, status, version)
         VALUES ('broken-wind-farm', 'not-a-uuid', 1, 1, 'active', 1);",
        [],
    )
    .unwrap();
    let store = SqliteProjectStore::new(&conn);

    assert!(matches!(
        store.load_project("broken-wind-farm"),
        Err(RepoError::InvalidData(_))
    ));
}
