//! Project domain model.
//!
//! # Responsibility
//! - Define the canonical record for one site analysis project.
//! - Provide lifecycle helpers for archive/unarchive and result merging.
//!
//! # Invariants
//! - `name` is the canonical store key and is unique across the store,
//!   except transiently while a rename or merge is in flight.
//! - `id` is stable across rename, merge (kept side) and export/import.
//! - `version` is assigned by the store; callers never increment it.

use crate::model::geo::Coordinates;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier that survives renames.
pub type ProjectId = Uuid;

/// Processing status of a project record.
///
/// `InProgress` is written by external analysis tools while a long-running
/// computation appends results; lifecycle operations refuse destructive work
/// in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Idle; safe to rename, merge, archive or delete.
    Active,
    /// An external tool is writing results.
    InProgress,
}

impl ProjectStatus {
    /// Returns the stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::InProgress => "in_progress",
        }
    }

    /// Parses a storage label.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "in_progress" => Some(Self::InProgress),
            _ => None,
        }
    }
}

/// Lifecycle metadata attached to every project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Archived projects are hidden from default listings.
    pub archived: bool,
    /// Unix epoch milliseconds of the last archive transition.
    pub archived_at: Option<i64>,
    /// Human location label, e.g. the phrase the name was derived from.
    pub location: Option<String>,
}

/// Canonical project record persisted by [`crate::ProjectStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    /// Canonical name; also the store key.
    pub name: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    pub coordinates: Option<Coordinates>,
    /// Per-stage analysis payloads keyed by stage name. Opaque to this crate.
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    /// Store-assigned write counter. `0` means never persisted.
    #[serde(default)]
    pub version: u64,
}

impl ProjectRecord {
    /// Creates a new, never-persisted record with a generated stable ID.
    pub fn new(name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            coordinates,
            results: BTreeMap::new(),
            status: ProjectStatus::Active,
            metadata: ProjectMetadata::default(),
            version: 0,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.metadata.archived
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ProjectStatus::InProgress
    }

    /// Marks the project archived at `at_ms`.
    pub fn archive(&mut self, at_ms: i64) {
        self.metadata.archived = true;
        self.metadata.archived_at = Some(at_ms);
        self.updated_at = at_ms;
    }

    /// Clears the archived flag.
    pub fn unarchive(&mut self, at_ms: i64) {
        self.metadata.archived = false;
        self.metadata.archived_at = None;
        self.updated_at = at_ms;
    }

    /// Returns whether a result payload exists for `stage`.
    pub fn has_stage(&self, stage: &str) -> bool {
        self.results.contains_key(stage)
    }

    /// Absorbs `other`'s stage results; entries already present here win.
    ///
    /// Also keeps the earlier creation time and borrows `other`'s coordinates
    /// and location label when this record has none.
    pub fn absorb(&mut self, other: &ProjectRecord) {
        for (stage, payload) in &other.results {
            self.results
                .entry(stage.clone())
                .or_insert_with(|| payload.clone());
        }
        self.created_at = self.created_at.min(other.created_at);
        if self.coordinates.is_none() {
            self.coordinates = other.coordinates;
        }
        if self.metadata.location.is_none() {
            self.metadata.location = other.metadata.location.clone();
        }
    }
}

/// Compact listing projection used in outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub archived: bool,
    pub status: ProjectStatus,
    pub coordinates: Option<Coordinates>,
    pub stages: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&ProjectRecord> for ProjectSummary {
    fn from(record: &ProjectRecord) -> Self {
        Self {
            name: record.name.clone(),
            archived: record.metadata.archived,
            status: record.status,
            coordinates: record.coordinates,
            stages: record.results.keys().cloned().collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::{ProjectRecord, ProjectStatus};
    use serde_json::json;

    #[test]
    fn absorb_keeps_own_stage_results_on_conflict() {
        let mut kept = ProjectRecord::new("a-wind-farm", None);
        kept.results.insert("terrain".into(), json!({"source": "a"}));
        let mut other = ProjectRecord::new("b-wind-farm", None);
        other.results.insert("terrain".into(), json!({"source": "b"}));
        other.results.insert("layout".into(), json!({"turbines": 12}));
        other.created_at = kept.created_at - 10;

        kept.absorb(&other);

        assert_eq!(kept.results["terrain"], json!({"source": "a"}));
        assert_eq!(kept.results["layout"], json!({"turbines": 12}));
        assert_eq!(kept.created_at, other.created_at);
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [ProjectStatus::Active, ProjectStatus::InProgress] {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProjectStatus::parse("archived"), None);
    }
}
