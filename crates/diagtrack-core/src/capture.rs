//! Capture file naming and on-disk helpers
//!
//! Snapshot captures are named `<seq> <revision>`, optionally followed by an
//! exclusion marker (`.skip`) or granularity tags (`.1-5`). Transition
//! captures are named `<pre-seq> <pre-revision> -> <post-seq> <post-revision>`;
//! older runs omitted the revision ids.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CaptureFormat;
use crate::error::{Result, TrackError};

/// Parsed snapshot capture file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureName {
    pub seq: u64,
    pub revision: String,

    /// Carries the exclusion marker
    pub excluded: bool,

    /// Sampling granularities encoded in the extension
    pub granularities: Vec<u32>,
}

impl CaptureName {
    pub fn new(seq: u64, revision: impl Into<String>) -> Self {
        Self {
            seq,
            revision: revision.into(),
            excluded: false,
            granularities: Vec::new(),
        }
    }

    pub fn with_granularities(mut self, granularities: Vec<u32>) -> Self {
        self.granularities = granularities;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn parse(file_name: &str, format: &CaptureFormat) -> Option<Self> {
        let mut excluded = false;
        let mut granularities = Vec::new();

        let stem = match file_name.rsplit_once('.') {
            Some((stem, ext)) if ext == format.excluded_suffix => {
                excluded = true;
                stem
            }
            Some((stem, ext)) => {
                if let Some(grains) = parse_granularities(ext) {
                    granularities = grains;
                }
                stem
            }
            None => file_name,
        };

        let (seq, revision) = stem.split_once(' ')?;
        let seq = seq.parse().ok()?;
        if revision.is_empty() || revision.contains(' ') {
            return None;
        }

        Some(Self {
            seq,
            revision: revision.to_string(),
            excluded,
            granularities,
        })
    }

    /// Render back to a file name
    pub fn file_name(&self, format: &CaptureFormat) -> String {
        let mut name = format!("{} {}", self.seq, self.revision);

        if self.excluded {
            name.push('.');
            name.push_str(&format.excluded_suffix);
        } else if !self.granularities.is_empty() {
            let grains: Vec<String> = self.granularities.iter().map(|g| g.to_string()).collect();
            name.push('.');
            name.push_str(&grains.join("-"));
        }

        name
    }
}

fn parse_granularities(ext: &str) -> Option<Vec<u32>> {
    ext.split('-').map(|g| g.parse().ok()).collect()
}

/// Parsed transition capture file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionName {
    pub pre_seq: u64,
    pub pre_revision: Option<String>,
    pub post_seq: u64,
    pub post_revision: Option<String>,
}

impl TransitionName {
    pub fn new(
        pre_seq: u64,
        pre_revision: impl Into<String>,
        post_seq: u64,
        post_revision: impl Into<String>,
    ) -> Self {
        Self {
            pre_seq,
            pre_revision: Some(pre_revision.into()),
            post_seq,
            post_revision: Some(post_revision.into()),
        }
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = match Self::derived_suffix(file_name) {
            Some(suffix) => &file_name[..file_name.len() - suffix.len() - 1],
            None => file_name,
        };

        let tokens: Vec<&str> = stem.split(' ').collect();
        match tokens.as_slice() {
            [pre, pre_rev, "->", post, post_rev] => Some(Self {
                pre_seq: pre.parse().ok()?,
                pre_revision: Some(pre_rev.to_string()),
                post_seq: post.parse().ok()?,
                post_revision: Some(post_rev.to_string()),
            }),
            [pre, "->", post] => Some(Self {
                pre_seq: pre.parse().ok()?,
                pre_revision: None,
                post_seq: post.parse().ok()?,
                post_revision: None,
            }),
            _ => None,
        }
    }

    /// Extension of a derived capture, e.g. `filtered` for `0 a -> 1 b.filtered`
    pub fn derived_suffix(file_name: &str) -> Option<&str> {
        match file_name.rsplit_once('.') {
            Some((stem, suffix)) if stem.contains(" -> ") => Some(suffix),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pre_seq)?;
        if let Some(rev) = &self.pre_revision {
            write!(f, " {}", rev)?;
        }
        write!(f, " -> {}", self.post_seq)?;
        if let Some(rev) = &self.post_revision {
            write!(f, " {}", rev)?;
        }
        Ok(())
    }
}

/// Line terminators of a capture, restored when it is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    pub crlf: bool,
    pub final_newline: bool,
}

impl Default for LineLayout {
    fn default() -> Self {
        Self {
            crlf: false,
            final_newline: true,
        }
    }
}

impl LineLayout {
    /// Layout of `text`; mixed `\n` and `\r\n` endings cannot be restored
    pub fn detect(text: &str, origin: &str) -> Result<Self> {
        let newlines = text.matches('\n').count();
        let crlf = text.matches("\r\n").count();
        if crlf > 0 && crlf != newlines {
            return Err(TrackError::malformed(origin, "mixed LF and CRLF line endings"));
        }

        Ok(Self {
            crlf: crlf > 0,
            final_newline: text.ends_with('\n'),
        })
    }

    /// Rewrite `\n`-terminated text into this layout
    pub fn apply(&self, mut text: String) -> String {
        if !self.final_newline && text.ends_with('\n') {
            text.pop();
        }
        if self.crlf {
            text = text.replace('\n', "\r\n");
        }
        text
    }
}

/// Replace `path` with `bytes` through a temporary file in the same directory
///
/// The temporary file is removed if anything fails before the rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| TrackError::io(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| TrackError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| TrackError::io(path, e))?;
    tmp.flush().map_err(|e| TrackError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| TrackError::io(path, e))?;
    tmp.persist(path).map_err(|e| TrackError::io(path, e.error))?;

    Ok(())
}

/// Regular files directly inside `folder`, ordered by name
pub fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    TrackError::require_exists(folder)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| TrackError::io(folder, e))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split `lines` into blocks each starting at a line equal (trimmed) to
/// `delimiter`. Only blank lines may precede the first delimiter.
pub(crate) fn split_blocks<'a, 'b>(
    lines: &'a [&'b str],
    delimiter: &str,
    origin: &str,
) -> Result<Vec<&'a [&'b str]>> {
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == delimiter)
        .map(|(i, _)| i)
        .collect();

    let prefix_end = starts.first().copied().unwrap_or(lines.len());
    if let Some(stray) = lines[..prefix_end].iter().find(|l| !l.trim().is_empty()) {
        return Err(TrackError::malformed(
            origin,
            format!("unexpected line '{}' outside a '{}' block", stray.trim(), delimiter),
        ));
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(lines.len());
        blocks.push(&lines[start..end]);
    }

    Ok(blocks)
}

/// Parse a `Total <n>` line
pub(crate) fn parse_total(line: Option<&str>, origin: &str) -> Result<usize> {
    let line = line.map(str::trim).unwrap_or("");
    line.strip_prefix("Total ")
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| TrackError::malformed(origin, format!("expected 'Total <n>', found '{}'", line)))
}
