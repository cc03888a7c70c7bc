//! Error taxonomy shared by every diagtrack crate

use std::path::{Path, PathBuf};

/// Fatal conditions raised while loading or analysing captures
///
/// Policy-governed conditions (snapshot disagreement, granularity overlap
/// while stitching) are not errors and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// A snapshot or transition file violates the capture grammar
    #[error("Malformed capture {path}: {reason}")]
    MalformedCapture { path: String, reason: String },

    /// A transition breaks the matched/departed/arrived partition
    #[error("Identity inconsistency in transition {transition}: {diagnostic} {detail}")]
    IdentityInconsistency {
        transition: String,
        diagnostic: String,
        detail: String,
    },

    /// A revision id is absent from the authoritative history
    #[error("Revision {0} is not part of the project history")]
    MissingRevision(String),

    /// A capture folder or file does not exist
    #[error("Path does not exist: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error("IO error on {path}: {message}")]
    Io { path: String, message: String },
}

impl TrackError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCapture {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Fail fast when a referenced path is missing
    pub fn require_exists(path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(Self::ResourceNotFound(path.to_path_buf()))
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;
