//! In-memory revision control for tests
//!
//! Each revision is a full set of files. Nothing touches the disk.
//!
//! ```rust,ignore
//! let repo = InMemoryRepository::new()
//!     .with_revision("r0", [("src/A.java", "class A {}")])
//!     .with_revision("r1", [("src/A.java", "class A { int x; }")]);
//!
//! assert_eq!(repo.changed_files("r0", "r1")?, vec!["src/A.java"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use diagtrack_core::RevisionHistory;

use crate::repository::{RevisionControl, VcsError};

#[derive(Default)]
pub struct InMemoryRepository {
    revisions: Vec<(String, BTreeMap<String, String>)>,

    /// Revision most recently checked out
    checked_out: RwLock<Option<String>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a revision holding exactly `files`
    pub fn with_revision<'a>(
        mut self,
        revision: impl Into<String>,
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let files = files
            .into_iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.revisions.push((revision.into(), files));
        self
    }

    pub fn checked_out(&self) -> Option<String> {
        self.checked_out.read().ok().and_then(|guard| guard.clone())
    }

    fn files(&self, revision: &str) -> Result<&BTreeMap<String, String>, VcsError> {
        self.revisions
            .iter()
            .find(|(rev, _)| rev == revision)
            .map(|(_, files)| files)
            .ok_or_else(|| VcsError::UnknownRevision(revision.to_string()))
    }
}

impl RevisionControl for InMemoryRepository {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn revisions(&self) -> Result<RevisionHistory, VcsError> {
        Ok(RevisionHistory::new(
            self.revisions.iter().map(|(rev, _)| rev.clone()).collect(),
        ))
    }

    fn checkout(&self, revision: &str) -> Result<(), VcsError> {
        self.files(revision)?;
        let mut guard = self
            .checked_out
            .write()
            .map_err(|e| VcsError::StatePoisoned(e.to_string()))?;
        *guard = Some(revision.to_string());
        Ok(())
    }

    fn files_at(&self, revision: &str) -> Result<Vec<String>, VcsError> {
        Ok(self.files(revision)?.keys().cloned().collect())
    }

    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        let before = self.files(from)?;
        let after = self.files(to)?;

        let paths: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        Ok(paths
            .into_iter()
            .filter(|path| before.get(*path) != after.get(*path))
            .cloned()
            .collect())
    }

    fn load_file(&self, revision: &str, path: &str) -> Result<String, VcsError> {
        self.files(revision)?
            .get(path)
            .cloned()
            .ok_or_else(|| VcsError::NotFound {
                revision: revision.to_string(),
                path: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new()
            .with_revision("r0", [("src/A.java", "class A {}\n"), ("src/B.java", "class B {}\n")])
            .with_revision("r1", [("src/A.java", "class A { int x; }\n"), ("src/B.java", "class B {}\n")])
            .with_revision("r2", [("src/A.java", "class A { int x; }\n")])
    }

    #[test]
    fn history_in_insertion_order() {
        let history = repo().revisions().unwrap();
        assert_eq!(history.revisions(), &["r0", "r1", "r2"]);
    }

    #[test]
    fn changed_files_include_deletions() {
        let repo = repo();
        assert_eq!(repo.changed_files("r0", "r1").unwrap(), vec!["src/A.java"]);
        assert_eq!(repo.changed_files("r1", "r2").unwrap(), vec!["src/B.java"]);
        assert!(repo.changed_files("r2", "r2").unwrap().is_empty());
    }

    #[test]
    fn load_missing_file() {
        let err = repo().load_file("r2", "src/B.java").unwrap_err();
        assert!(matches!(err, VcsError::NotFound { .. }));
    }

    #[test]
    fn unknown_revision() {
        assert!(matches!(repo().files_at("nope"), Err(VcsError::UnknownRevision(_))));
    }

    #[test]
    fn checkout_is_recorded() {
        let repo = repo();
        repo.checkout("r1").unwrap();
        assert_eq!(repo.checked_out(), Some("r1".to_string()));
        assert!(repo.checkout("nope").is_err());
        assert_eq!(repo.checked_out(), Some("r1".to_string()));
    }

    #[test]
    fn poisoned_checkout_state_is_an_error() {
        let repo = repo();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = repo.checked_out.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(matches!(repo.checkout("r1"), Err(VcsError::StatePoisoned(_))));
    }
}
