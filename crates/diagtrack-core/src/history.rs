//! Authoritative revision order

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, TrackError};

/// Every revision of a project, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionHistory {
    revisions: Vec<String>,
    positions: HashMap<String, usize>,
}

impl RevisionHistory {
    pub fn new(revisions: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(revisions.len());
        for (i, rev) in revisions.iter().enumerate() {
            // first occurrence wins if a revision is listed twice
            positions.entry(rev.clone()).or_insert(i);
        }

        Self { revisions, positions }
    }

    /// One revision id per line, oldest first; blank lines and `#` comments ignored
    pub fn from_file(path: &Path) -> Result<Self> {
        TrackError::require_exists(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| TrackError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| l.split_whitespace().next().unwrap_or(l).to_string())
                .collect(),
        )
    }

    pub fn position(&self, revision: &str) -> Result<usize> {
        self.positions
            .get(revision)
            .copied()
            .ok_or_else(|| TrackError::MissingRevision(revision.to_string()))
    }

    pub fn contains(&self, revision: &str) -> bool {
        self.positions.contains_key(revision)
    }

    /// Revisions strictly between `from` and `to`
    pub fn between(&self, from: &str, to: &str) -> Result<&[String]> {
        let start = self.position(from)?;
        let end = self.position(to)?;

        if end <= start {
            return Ok(&[]);
        }
        Ok(&self.revisions[start + 1..end])
    }

    pub fn revisions(&self) -> &[String] {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> RevisionHistory {
        RevisionHistory::parse("# oldest first\nr0\nr1 initial import\n\nr2\nr3\n")
    }

    #[test]
    fn positions_follow_file_order() {
        let h = history();
        assert_eq!(h.len(), 4);
        assert_eq!(h.position("r0").unwrap(), 0);
        assert_eq!(h.position("r3").unwrap(), 3);
        assert!(h.contains("r1"));
    }

    #[test]
    fn unknown_revision_is_missing() {
        let err = history().position("nope").unwrap_err();
        assert!(matches!(err, TrackError::MissingRevision(rev) if rev == "nope"));
    }

    #[test]
    fn between_is_exclusive() {
        let h = history();
        assert_eq!(h.between("r0", "r3").unwrap(), &["r1".to_string(), "r2".to_string()]);
        assert!(h.between("r1", "r2").unwrap().is_empty());
        assert!(h.between("r3", "r0").unwrap().is_empty());
    }
}
