//! Project store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide key-value style persistence of [`ProjectRecord`] keyed by
//!   canonical name.
//! - Offer an optimistic versioned write primitive so multi-step lifecycle
//!   sequences (rename, merge, delete) detect concurrent writers.
//!
//! # Invariants
//! - A stored record's `version` starts at 1 and increases by exactly 1 per
//!   successful write.
//! - A write whose [`ExpectedVersion`] does not hold changes nothing and
//!   returns [`RepoError::VersionConflict`].
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::geo::Coordinates;
use crate::model::project::{ProjectMetadata, ProjectRecord, ProjectStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const PROJECT_SELECT_SQL: &str = "SELECT
    name,
    project_uuid,
    created_at,
    updated_at,
    latitude,
    longitude,
    status,
    archived,
    archived_at,
    location,
    results_json,
    version
FROM projects";

pub type RepoResult<T> = Result<T, RepoError>;

/// Version precondition attached to a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Unconditional write.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The key must exist with exactly this version.
    Exactly(u64),
}

impl Display for ExpectedVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Absent => write!(f, "absent"),
            Self::Exactly(version) => write!(f, "v{version}"),
        }
    }
}

/// Generic repository error for project and session persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(String),
    InvalidData(String),
    /// Stored version did not satisfy the write precondition.
    VersionConflict {
        name: String,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(name) => write!(f, "project not found: {name}"),
            Self::InvalidData(message) => write!(f, "invalid persisted project data: {message}"),
            Self::VersionConflict {
                name,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "project `{name}` was modified concurrently (expected {expected}, found v{actual})"
                ),
                None => write!(
                    f,
                    "project `{name}` was modified concurrently (expected {expected}, found none)"
                ),
            },
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key-value persistence for project records.
///
/// Every method may block on I/O. Implementations must honour
/// [`ExpectedVersion`] atomically per call; nothing is atomic across calls.
pub trait ProjectStore {
    /// Returns every record sorted by name.
    fn list_projects(&self) -> RepoResult<Vec<ProjectRecord>>;

    /// Returns every canonical name sorted ascending.
    fn list_names(&self) -> RepoResult<Vec<String>> {
        Ok(self
            .list_projects()?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    fn load_project(&self, name: &str) -> RepoResult<Option<ProjectRecord>>;

    /// Writes `record` under `record.name` and returns the new version.
    fn save_project(&self, record: &ProjectRecord, expected: ExpectedVersion) -> RepoResult<u64>;

    /// Removes `name`; returns whether a row was deleted.
    fn delete_project(&self, name: &str, expected: ExpectedVersion) -> RepoResult<bool>;

    /// Case-insensitive substring lookup over names.
    fn find_by_partial_name(&self, fragment: &str) -> RepoResult<Vec<String>> {
        let needle = fragment.trim().to_lowercase();
        Ok(self
            .list_names()?
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect())
    }
}

/// SQLite-backed project store.
pub struct SqliteProjectStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectStore<'conn> {
    /// Wraps a connection returned by [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectStore for SqliteProjectStore<'_> {
    fn list_projects(&self) -> RepoResult<Vec<ProjectRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_project_row(row)?);
        }
        Ok(records)
    }

    fn list_names(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM projects ORDER BY name ASC;")?;
        let mut rows = stmt.query([])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }

    fn load_project(&self, name: &str) -> RepoResult<Option<ProjectRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn save_project(&self, record: &ProjectRecord, expected: ExpectedVersion) -> RepoResult<u64> {
        if record.name.trim().is_empty() {
            return Err(RepoError::InvalidData(
                "project name must not be blank".to_string(),
            ));
        }
        let results_json = serde_json::to_string(&record.results)
            .map_err(|err| RepoError::InvalidData(format!("unserializable results: {err}")))?;

        let tx = self.conn.unchecked_transaction()?;
        let current = current_version(&tx, &record.name)?;
        check_expectation(&record.name, expected, current)?;
        let next = current.map_or(1, |version| version + 1);

        tx.execute(
            "INSERT INTO projects (
                name,
                project_uuid,
                created_at,
                updated_at,
                latitude,
                longitude,
                status,
                archived,
                archived_at,
                location,
                results_json,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(name) DO UPDATE SET
                project_uuid = excluded.project_uuid,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                status = excluded.status,
                archived = excluded.archived,
                archived_at = excluded.archived_at,
                location = excluded.location,
                results_json = excluded.results_json,
                version = excluded.version;",
            params![
                record.name.as_str(),
                record.id.to_string(),
                record.created_at,
                record.updated_at,
                record.coordinates.map(|c| c.latitude),
                record.coordinates.map(|c| c.longitude),
                record.status.as_str(),
                bool_to_int(record.metadata.archived),
                record.metadata.archived_at,
                record.metadata.location.as_deref(),
                results_json,
                version_to_db(next)?,
            ],
        )?;
        tx.commit()?;

        Ok(next)
    }

    fn delete_project(&self, name: &str, expected: ExpectedVersion) -> RepoResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let current = current_version(&tx, name)?;
        if current.is_none() && !matches!(expected, ExpectedVersion::Exactly(_)) {
            return Ok(false);
        }
        check_expectation(name, expected, current)?;

        let changed = tx.execute("DELETE FROM projects WHERE name = ?1;", [name])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn find_by_partial_name(&self, fragment: &str) -> RepoResult<Vec<String>> {
        let escaped = fragment
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = self.conn.prepare(
            "SELECT name
             FROM projects
             WHERE name LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([escaped])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }
}

fn current_version(conn: &Connection, name: &str) -> RepoResult<Option<u64>> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM projects WHERE name = ?1;",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    version.map(version_from_db).transpose()
}

fn check_expectation(
    name: &str,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> RepoResult<()> {
    let holds = match expected {
        ExpectedVersion::Any => true,
        ExpectedVersion::Absent => actual.is_none(),
        ExpectedVersion::Exactly(version) => actual == Some(version),
    };
    if holds {
        return Ok(());
    }
    Err(RepoError::VersionConflict {
        name: name.to_string(),
        expected,
        actual,
    })
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<ProjectRecord> {
    let name: String = row.get("name")?;

    let uuid_text: String = row.get("project_uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in projects.project_uuid"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = ProjectStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in projects.status"
        ))
    })?;

    let coordinates = match (
        row.get::<_, Option<f64>>("latitude")?,
        row.get::<_, Option<f64>>("longitude")?,
    ) {
        (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "project `{name}` has only one coordinate axis"
            )));
        }
    };

    let archived = match row.get::<_, i64>("archived")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid archived value `{other}` in projects.archived"
            )));
        }
    };

    let results_json: String = row.get("results_json")?;
    let results: BTreeMap<String, serde_json::Value> = serde_json::from_str(&results_json)
        .map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid results_json for project `{name}`: {err}"
            ))
        })?;

    Ok(ProjectRecord {
        id,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        coordinates,
        results,
        status,
        metadata: ProjectMetadata {
            archived,
            archived_at: row.get("archived_at")?,
            location: row.get("location")?,
        },
        version: version_from_db(row.get("version")?)?,
        name,
    })
}

fn version_from_db(value: i64) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid version `{value}` in projects.version")))
}

fn version_to_db(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("version {value} exceeds storage range")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
