//! Versioned project export document.
//!
//! # Invariants
//! - `format_version` is checked before the project body is decoded, so an
//!   unknown version is reported as such even when the body shape changed.

use crate::model::project::{now_epoch_ms, ProjectRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Format tag written into every export.
pub const EXPORT_FORMAT_VERSION: &str = "sitebook.project.v1";

/// Portable JSON document for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectExport {
    pub format_version: String,
    /// Unix epoch milliseconds.
    pub exported_at: i64,
    pub project: ProjectRecord,
}

/// Export/import decoding failure.
#[derive(Debug)]
pub enum TransferError {
    /// Payload is not JSON or does not have the export shape.
    Malformed(serde_json::Error),
    /// Payload is missing the format tag.
    MissingVersion,
    UnsupportedVersion(String),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed export payload: {err}"),
            Self::MissingVersion => write!(f, "export payload has no format_version"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported export format `{version}`")
            }
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value)
    }
}

impl ProjectExport {
    /// Wraps `project` in a current-format document stamped now.
    pub fn new(project: ProjectRecord) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            exported_at: now_epoch_ms(),
            project,
        }
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a document, rejecting formats other than
    /// [`EXPORT_FORMAT_VERSION`].
    pub fn from_json(payload: &str) -> Result<Self, TransferError> {
        let value: Value = serde_json::from_str(payload)?;
        let version = value
            .get("format_version")
            .and_then(Value::as_str)
            .ok_or(TransferError::MissingVersion)?;
        if version != EXPORT_FORMAT_VERSION {
            return Err(TransferError::UnsupportedVersion(version.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}
