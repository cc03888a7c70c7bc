//! Revision-control trait and its errors

use diagtrack_core::RevisionHistory;

/// Errors from a revision-control backend
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{path} not found at revision {revision}")]
    NotFound { revision: String, path: String },

    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Formatter error: {0}")]
    Formatter(String),

    #[error("{path} at revision {revision} is not valid UTF-8")]
    InvalidUtf8 { revision: String, path: String },

    #[error("Repository state unavailable: {0}")]
    StatePoisoned(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for VcsError {
    fn from(err: std::io::Error) -> Self {
        VcsError::Io(err.to_string())
    }
}

/// Read access to a project's revisions
pub trait RevisionControl {
    /// Backend name for logs (e.g., "git")
    fn name(&self) -> &'static str;

    /// Every revision, oldest first
    fn revisions(&self) -> Result<RevisionHistory, VcsError>;

    /// Make `revision` the working state
    fn checkout(&self, revision: &str) -> Result<(), VcsError>;

    /// Paths of every file present at `revision`
    fn files_at(&self, revision: &str) -> Result<Vec<String>, VcsError>;

    /// Paths whose content differs between two revisions
    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>, VcsError>;

    /// Content of `path` at `revision`; `NotFound` when it does not exist there
    fn load_file(&self, revision: &str, path: &str) -> Result<String, VcsError>;
}
