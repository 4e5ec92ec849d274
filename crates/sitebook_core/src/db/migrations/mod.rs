//! Ordered schema steps for the project and session tables.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` holds the last applied step; all pending steps run
//!   in one transaction, so a failed step leaves the version untouched.
//! - A database stamped newer than [`latest_version`] is refused, never
//!   downgraded.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    /// Short label for log lines.
    label: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        label: "projects",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        label: "session_context",
        sql: include_str!("0002_session_context.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] for a database from a newer build.
/// - SQLite errors from any step; nothing is applied in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stamped = stamped_version(conn)?;
    let latest = latest_version();
    if stamped > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stamped,
            latest_supported: latest,
        });
    }

    let pending = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > stamped)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        debug!("event=db_migrate module=db status=current version={stamped}");
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=db_migrate_step module=db status=applied version={} label={}",
            step.version, step.label
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
        stamped,
        latest,
        pending.len()
    );
    Ok(())
}

fn stamped_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}
