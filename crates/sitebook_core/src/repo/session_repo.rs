//! Session context store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist per-session active project pointers and reference history.
//! - Keep soft references consistent when projects are renamed, merged or
//!   deleted.
//!
//! # Invariants
//! - History is most-recent-first, deduplicated and capped at
//!   `history_limit` entries per session.
//! - Setting an empty active project clears the pointer.
//! - Active project values are not validated against the project store.

use crate::model::project::now_epoch_ms;
use crate::model::session::SessionContext;
use crate::repo::project_repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

/// Per-session mutable reference state.
pub trait SessionContextStore {
    /// Returns the full context; unknown sessions yield an empty context.
    fn context(&self, session_id: &str) -> RepoResult<SessionContext>;

    fn active_project(&self, session_id: &str) -> RepoResult<Option<String>> {
        Ok(self.context(session_id)?.active_project)
    }

    /// Points the session at `name`; an empty or blank `name` clears it.
    fn set_active_project(&self, session_id: &str, name: &str) -> RepoResult<()>;

    /// Most-recent-first reference history.
    fn history(&self, session_id: &str) -> RepoResult<Vec<String>> {
        Ok(self.context(session_id)?.history)
    }

    /// Moves `name` to the front of the session history.
    fn append_history(&self, session_id: &str, name: &str) -> RepoResult<()>;

    /// Rewrites every active pointer and history entry from `old` to `new`.
    ///
    /// Returns the number of sessions whose active pointer changed.
    fn replace_project_references(&self, old: &str, new: &str) -> RepoResult<usize>;

    /// Drops every reference to `name`. Returns the number of sessions whose
    /// active pointer was cleared.
    fn forget_project(&self, name: &str) -> RepoResult<usize>;
}

/// SQLite-backed session store sharing the project database.
pub struct SqliteSessionStore<'conn> {
    conn: &'conn Connection,
    history_limit: usize,
}

impl<'conn> SqliteSessionStore<'conn> {
    pub fn new(conn: &'conn Connection, history_limit: usize) -> Self {
        Self {
            conn,
            history_limit: history_limit.max(1),
        }
    }

    fn touch(&self, session_id: &str, now: i64) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO session_context (session_id, active_project, updated_at)
             VALUES (?1, NULL, ?2)
             ON CONFLICT(session_id) DO UPDATE SET updated_at = excluded.updated_at;",
            params![session_id, now],
        )?;
        Ok(())
    }
}

impl SessionContextStore for SqliteSessionStore<'_> {
    fn context(&self, session_id: &str) -> RepoResult<SessionContext> {
        let row: Option<(Option<String>, i64)> = self
            .conn
            .query_row(
                "SELECT active_project, updated_at
                 FROM session_context
                 WHERE session_id = ?1;",
                [session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut stmt = self.conn.prepare(
            "SELECT project_name
             FROM session_history
             WHERE session_id = ?1
             ORDER BY id DESC;",
        )?;
        let mut rows = stmt.query([session_id])?;
        let mut history = Vec::new();
        while let Some(row) = rows.next()? {
            history.push(row.get(0)?);
        }

        let (active_project, updated_at) = row.unwrap_or((None, 0));
        Ok(SessionContext {
            active_project,
            history,
            updated_at,
            ..SessionContext::empty(session_id)
        })
    }

    fn set_active_project(&self, session_id: &str, name: &str) -> RepoResult<()> {
        let trimmed = name.trim();
        let value = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        };
        self.conn.execute(
            "INSERT INTO session_context (session_id, active_project, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                active_project = excluded.active_project,
                updated_at = excluded.updated_at;",
            params![session_id, value, now_epoch_ms()],
        )?;
        Ok(())
    }

    fn append_history(&self, session_id: &str, name: &str) -> RepoResult<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let now = now_epoch_ms();
        let limit = i64::try_from(self.history_limit).unwrap_or(i64::MAX);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM session_history WHERE session_id = ?1 AND project_name = ?2;",
            params![session_id, trimmed],
        )?;
        tx.execute(
            "INSERT INTO session_history (session_id, project_name, referenced_at)
             VALUES (?1, ?2, ?3);",
            params![session_id, trimmed, now],
        )?;
        tx.execute(
            "DELETE FROM session_history
             WHERE session_id = ?1
               AND id NOT IN (
                   SELECT id
                   FROM session_history
                   WHERE session_id = ?1
                   ORDER BY id DESC
                   LIMIT ?2
               );",
            params![session_id, limit],
        )?;
        tx.commit()?;

        self.touch(session_id, now)
    }

    fn replace_project_references(&self, old: &str, new: &str) -> RepoResult<usize> {
        if old == new {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE session_context
             SET active_project = ?2, updated_at = ?3
             WHERE active_project = ?1;",
            params![old, new, now_epoch_ms()],
        )?;
        // A session that already references `new` keeps its existing slot.
        tx.execute(
            "DELETE FROM session_history
             WHERE project_name = ?1
               AND session_id IN (
                   SELECT session_id FROM session_history WHERE project_name = ?2
               );",
            params![old, new],
        )?;
        tx.execute(
            "UPDATE session_history SET project_name = ?2 WHERE project_name = ?1;",
            params![old, new],
        )?;
        tx.commit()?;
        Ok(changed)
    }

    fn forget_project(&self, name: &str) -> RepoResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let cleared = tx.execute(
            "UPDATE session_context
             SET active_project = NULL, updated_at = ?2
             WHERE active_project = ?1;",
            params![name, now_epoch_ms()],
        )?;
        tx.execute(
            "DELETE FROM session_history WHERE project_name = ?1;",
            [name],
        )?;
        tx.commit()?;
        Ok(cleared)
    }
}
