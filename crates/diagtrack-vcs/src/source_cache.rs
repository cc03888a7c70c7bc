//! Memoized source loading for review
//!
//! Reviewing a match means reading the flagged file on both sides of a
//! transition, often many times. The cache loads each (file, revision) pair
//! once, optionally normalizing it through an external formatter so the
//! two sides line up.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use diagtrack_core::Diagnostic;

use crate::repository::{RevisionControl, VcsError};

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

pub struct SourceCache<'r> {
    repo: &'r dyn RevisionControl,

    /// Formatter command; source is piped through stdin
    formatter: Option<Vec<String>>,

    entries: HashMap<(String, String), Arc<String>>,

    /// Pairs known not to exist, so the backend is asked only once
    missing: HashSet<(String, String)>,

    hits: usize,
    misses: usize,
}

impl<'r> SourceCache<'r> {
    pub fn new(repo: &'r dyn RevisionControl) -> Self {
        Self {
            repo,
            formatter: None,
            entries: HashMap::new(),
            missing: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Normalize every loaded file through `command`; an empty command disables it
    pub fn with_formatter(mut self, command: Vec<String>) -> Self {
        self.formatter = if command.is_empty() { None } else { Some(command) };
        self
    }

    /// Source of `file` at `revision`
    pub fn load(&mut self, file: &str, revision: &str) -> Result<Arc<String>, VcsError> {
        let key = (file.to_string(), revision.to_string());

        if let Some(source) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(source));
        }
        if self.missing.contains(&key) {
            self.hits += 1;
            return Err(VcsError::NotFound {
                revision: revision.to_string(),
                path: file.to_string(),
            });
        }

        self.misses += 1;
        let source = match self.repo.load_file(revision, file) {
            Ok(source) => source,
            Err(err @ VcsError::NotFound { .. }) => {
                self.missing.insert(key);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let source = match &self.formatter {
            Some(command) => format_source(command, &source)?,
            None => source,
        };

        tracing::debug!(file, revision, bytes = source.len(), "loaded source");

        let source = Arc::new(source);
        self.entries.insert(key, Arc::clone(&source));
        Ok(source)
    }

    /// Lines around a diagnostic's line (1-based), `radius` on each side
    pub fn context(
        &mut self,
        file: &str,
        diagnostic: &Diagnostic,
        revision: &str,
        radius: usize,
    ) -> Result<Vec<(usize, String)>, VcsError> {
        let source = self.load(file, revision)?;
        let line = diagnostic.line as usize;
        let first = line.saturating_sub(radius).max(1);
        let last = line + radius;

        Ok(source
            .lines()
            .enumerate()
            .map(|(i, text)| (i + 1, text))
            .filter(|(n, _)| *n >= first && *n <= last)
            .map(|(n, text)| (n, text.to_string()))
            .collect())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.missing.clear();
    }
}

/// Pipe `source` through an external formatter
fn format_source(command: &[String], source: &str) -> Result<String, VcsError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| VcsError::Formatter("empty formatter command".to_string()))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VcsError::Formatter(format!("failed to start {}: {}", program, e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| VcsError::Formatter("formatter stdin unavailable".to_string()))?;
    let input = source.as_bytes().to_vec();
    let writer = std::thread::spawn(move || stdin.write_all(&input));

    let output = child.wait_with_output()?;
    writer
        .join()
        .map_err(|_| VcsError::Formatter("formatter input thread panicked".to_string()))??;

    if !output.status.success() {
        return Err(VcsError::Formatter(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
