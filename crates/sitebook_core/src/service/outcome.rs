//! Lifecycle response envelope.
//!
//! # Invariants
//! - `error` is `Some` only for policy failures with a stable code; storage
//!   failures carry `success = false` with `error = None`.
//! - A confirmation prompt is never a success and never carries a code.
//! - JSON field names are camelCase and stable.

use crate::model::export::ProjectExport;
use crate::model::project::ProjectSummary;
use crate::resolve::resolver::ResolutionResult;
use serde::{Deserialize, Serialize};

/// Stable policy failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleErrorCode {
    ProjectNotFound,
    NameAlreadyExists,
    ProjectInProgress,
    InvalidCoordinates,
    InvalidKeepName,
    UnsupportedVersion,
}

impl LifecycleErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::NameAlreadyExists => "NAME_ALREADY_EXISTS",
            Self::ProjectInProgress => "PROJECT_IN_PROGRESS",
            Self::InvalidCoordinates => "INVALID_COORDINATES",
            Self::InvalidKeepName => "INVALID_KEEP_NAME",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
        }
    }
}

/// Existing project near a probe point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub name: String,
    pub distance_km: f64,
}

/// Projects linked by pairwise distance within the duplicate radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// Sorted by name; `distance_km` is the distance to the nearest peer.
    pub members: Vec<DuplicateMatch>,
}

/// Optional data attached to an outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutcomePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Names the caller must choose between.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    /// Names absorbed by a merge.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merged: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    /// In-progress names left untouched by a bulk delete.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ProjectExport>,
}

/// Uniform result of every lifecycle call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleOutcome {
    pub success: bool,
    /// User-facing text; failures always suggest a next step.
    pub message: String,
    pub error: Option<LifecycleErrorCode>,
    pub requires_confirmation: bool,
    pub requires_name_choice: bool,
    #[serde(default)]
    pub payload: OutcomePayload,
}

impl LifecycleOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self::base(true, message, None)
    }

    pub fn failure(code: LifecycleErrorCode, message: impl Into<String>) -> Self {
        Self::base(false, message, Some(code))
    }

    /// Failure without a stable code, e.g. a storage error.
    pub fn generic_failure(message: impl Into<String>) -> Self {
        Self::base(false, message, None)
    }

    pub fn confirmation_required(message: impl Into<String>) -> Self {
        Self {
            requires_confirmation: true,
            ..Self::base(false, message, None)
        }
    }

    pub fn name_choice_required(message: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            requires_name_choice: true,
            ..Self::base(false, message, None)
        }
        .with(|payload| payload.candidates = candidates)
    }

    /// Applies `update` to the payload.
    pub fn with(mut self, update: impl FnOnce(&mut OutcomePayload)) -> Self {
        update(&mut self.payload);
        self
    }

    /// Log label for this outcome.
    pub fn status_label(&self) -> &'static str {
        if self.success {
            "ok"
        } else if self.requires_confirmation {
            "pending_confirmation"
        } else if self.requires_name_choice {
            "pending_name_choice"
        } else if let Some(code) = self.error {
            code.as_str()
        } else {
            "failed"
        }
    }

    fn base(success: bool, message: impl Into<String>, error: Option<LifecycleErrorCode>) -> Self {
        Self {
            success,
            message: message.into(),
            error,
            requires_confirmation: false,
            requires_name_choice: false,
            payload: OutcomePayload::default(),
        }
    }
}
