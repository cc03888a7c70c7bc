//! Per-revision diagnostic snapshots
//!
//! Text format: a `<revision> <count>` header followed by `count` verbatim
//! diagnostic blocks.

use std::path::{Path, PathBuf};

use crate::capture::{self, file_name_of, split_blocks, CaptureName, LineLayout};
use crate::config::CaptureFormat;
use crate::diagnostic::Diagnostic;
use crate::error::{Result, TrackError};

/// Every diagnostic observed at one revision
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision: String,

    /// Position among all snapshots produced for the project
    pub seq: u64,

    pub diagnostics: Vec<Diagnostic>,

    /// Capture file this snapshot was loaded from
    pub origin: Option<PathBuf>,

    /// The capture carries the exclusion marker
    pub excluded: bool,

    /// Sampling granularities the capture was taken at
    pub granularities: Vec<u32>,

    pub layout: LineLayout,
}

impl Snapshot {
    pub fn new(seq: u64, revision: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            revision: revision.into(),
            seq,
            diagnostics,
            origin: None,
            excluded: false,
            granularities: Vec::new(),
            layout: LineLayout::default(),
        }
    }

    /// Parse capture text; `name` comes from the capture's file name
    pub fn parse(text: &str, name: &CaptureName, format: &CaptureFormat, origin: &str) -> Result<Self> {
        let layout = LineLayout::detect(text, origin)?;
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| TrackError::malformed(origin, "empty capture"))?;
        let (revision, count) = header
            .trim()
            .split_once(' ')
            .and_then(|(rev, count)| Some((rev, count.trim().parse::<usize>().ok()?)))
            .ok_or_else(|| {
                TrackError::malformed(origin, format!("bad header '{}', expected '<revision> <count>'", header))
            })?;

        if revision != name.revision {
            return Err(TrackError::malformed(
                origin,
                format!("header revision {} does not match file name revision {}", revision, name.revision),
            ));
        }

        let body: Vec<&str> = lines.collect();
        let diagnostics = split_blocks(&body, &format.diagnostic_delimiter, origin)?
            .into_iter()
            .map(|block| Diagnostic::parse_block(block, format, origin))
            .collect::<Result<Vec<_>>>()?;

        if diagnostics.len() != count {
            return Err(TrackError::malformed(
                origin,
                format!("header declares {} diagnostics but {} were found", count, diagnostics.len()),
            ));
        }

        Ok(Self {
            revision: name.revision.clone(),
            seq: name.seq,
            diagnostics,
            origin: None,
            excluded: name.excluded,
            granularities: name.granularities.clone(),
            layout,
        })
    }

    /// Load a single capture file
    pub fn load(path: &Path, format: &CaptureFormat) -> Result<Self> {
        TrackError::require_exists(path)?;

        let file_name = file_name_of(path);
        let name = CaptureName::parse(&file_name, format).ok_or_else(|| {
            TrackError::malformed(path.display().to_string(), "file name is not '<seq> <revision>'")
        })?;

        let text = std::fs::read_to_string(path).map_err(|e| TrackError::io(path, e))?;
        let mut snapshot = Self::parse(&text, &name, format, &path.display().to_string())?;
        snapshot.origin = Some(path.to_path_buf());

        Ok(snapshot)
    }

    /// Load every included capture of a folder, ordered by sequence number
    pub fn load_all(folder: &Path, format: &CaptureFormat) -> Result<Vec<Self>> {
        let mut snapshots: Vec<Self> = Self::load_captures(folder, format)?
            .into_iter()
            .filter(|s| !s.excluded)
            .collect();
        snapshots.sort_by_key(|s| s.seq);

        Ok(snapshots)
    }

    /// Load every capture of a folder, excluded ones included, in file name order
    pub fn load_captures(folder: &Path, format: &CaptureFormat) -> Result<Vec<Self>> {
        capture::list_files(folder)?
            .iter()
            .filter(|path| CaptureName::parse(&file_name_of(path), format).is_some())
            .map(|path| Self::load(path, format))
            .collect()
    }

    pub fn capture_name(&self) -> CaptureName {
        CaptureName {
            seq: self.seq,
            revision: self.revision.clone(),
            excluded: self.excluded,
            granularities: self.granularities.clone(),
        }
    }

    /// Serialize back to capture text, reusing each diagnostic's raw block
    /// and the line endings it was read with
    pub fn to_text(&self) -> String {
        let mut out = format!("{} {}\n", self.revision, self.diagnostics.len());
        for diag in &self.diagnostics {
            out.push_str(&diag.block_text());
            out.push('\n');
        }
        self.layout.apply(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        capture::write_atomic(path, self.to_text().as_bytes())
    }

    /// Derive a snapshot keeping only diagnostics matching `keep`
    pub fn filtered(&self, mut keep: impl FnMut(&Diagnostic) -> bool) -> Self {
        Self {
            revision: self.revision.clone(),
            seq: self.seq,
            diagnostics: self.diagnostics.iter().filter(|d| keep(d)).cloned().collect(),
            origin: None,
            excluded: self.excluded,
            granularities: self.granularities.clone(),
            layout: self.layout,
        }
    }

    pub fn contains(&self, diagnostic: &Diagnostic) -> bool {
        self.diagnostics.contains(diagnostic)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
