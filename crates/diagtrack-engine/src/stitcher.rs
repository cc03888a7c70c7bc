//! Stitch capture folders from several sampling runs into one sequence
//!
//! Runs sampled at different granularities (every revision, every 5th, ...)
//! are merged into a single history-ordered folder. Output names record
//! which granularities each revision was captured at, so the coarsest run
//! can later be recovered for reconciliation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use diagtrack_core::capture::{self, file_name_of};
use diagtrack_core::{CaptureFormat, CaptureName, Result, RevisionHistory, TrackError};
use regex::Regex;
use serde::Serialize;

static GRANULARITY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)$").expect("granularity pattern is valid"));

/// One output capture of a stitch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchEntry {
    pub seq: u64,
    pub revision: String,

    /// Capture the bytes are copied from
    pub source: PathBuf,

    pub granularities: BTreeSet<u32>,
}

impl StitchEntry {
    pub fn capture_name(&self) -> CaptureName {
        CaptureName::new(self.seq, self.revision.clone()).with_granularities(self.granularities.iter().copied().collect())
    }
}

struct Candidate {
    position: usize,
    revision: String,
    path: PathBuf,
    granularities: Vec<u32>,
}

pub struct Stitcher<'h> {
    history: &'h RevisionHistory,
    format: CaptureFormat,
}

impl<'h> Stitcher<'h> {
    pub fn new(history: &'h RevisionHistory, format: CaptureFormat) -> Self {
        Self { history, format }
    }

    /// Trailing `_<n>` of a folder name; 0 when there is none
    pub fn folder_granularity(folder: &Path) -> u32 {
        let name = file_name_of(folder);
        GRANULARITY_SUFFIX
            .captures(&name)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0)
    }

    /// Output entries in history order, one per revision
    pub fn plan(&self, folders: &[PathBuf]) -> Result<Vec<StitchEntry>> {
        for folder in folders {
            TrackError::require_exists(folder)?;
        }

        let mut candidates = Vec::new();
        for folder in folders {
            let grain = Self::folder_granularity(folder);

            for path in capture::list_files(folder)? {
                let Some(name) = CaptureName::parse(&file_name_of(&path), &self.format) else {
                    tracing::debug!(path = %path.display(), "not a capture, skipping");
                    continue;
                };
                if name.excluded {
                    continue;
                }

                let mut granularities = name.granularities;
                granularities.push(grain);

                candidates.push(Candidate {
                    position: self.history.position(&name.revision)?,
                    revision: name.revision,
                    path,
                    granularities,
                });
            }
        }

        // stable: among duplicates the first folder listed wins
        candidates.sort_by_key(|c| c.position);

        let mut grains: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
        for candidate in &candidates {
            grains
                .entry(candidate.revision.as_str())
                .or_default()
                .extend(candidate.granularities.iter().copied());
        }

        let mut entries: Vec<StitchEntry> = Vec::new();
        for candidate in &candidates {
            if entries.last().is_some_and(|e| e.revision == candidate.revision) {
                continue;
            }

            entries.push(StitchEntry {
                seq: entries.len() as u64,
                revision: candidate.revision.clone(),
                source: candidate.path.clone(),
                granularities: grains.get(candidate.revision.as_str()).cloned().unwrap_or_default(),
            });
        }

        Ok(entries)
    }

    /// Copy every entry into `output`, returning the written paths
    pub fn write(&self, entries: &[StitchEntry], output: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output).map_err(|e| TrackError::io(output, e))?;

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let bytes = std::fs::read(&entry.source).map_err(|e| TrackError::io(&entry.source, e))?;
            let destination = output.join(entry.capture_name().file_name(&self.format));
            capture::write_atomic(&destination, &bytes)?;
            written.push(destination);
        }

        Ok(written)
    }

    pub fn stitch(&self, folders: &[PathBuf], output: &Path) -> Result<Vec<StitchEntry>> {
        let entries = self.plan(folders)?;
        let written = self.write(&entries, output)?;

        tracing::info!(
            folders = folders.len(),
            revisions = written.len(),
            output = %output.display(),
            "stitched captures"
        );

        Ok(entries)
    }
}
