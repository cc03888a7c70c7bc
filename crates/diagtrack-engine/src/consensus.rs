//! Snapshot consensus across repeated capture runs
//!
//! Capturing the same revision twice does not always produce the same
//! diagnostics (flaky builds, analyzer timeouts). When independent runs
//! disagree on a revision, the capture with the most diagnostics is taken as
//! authoritative and copied over its siblings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use diagtrack_core::{capture, CaptureFormat, ConsensusPolicy, Result, Snapshot, TrackError};
use serde::Serialize;

/// Captures of one revision whose diagnostic counts differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disagreement {
    pub revision: String,

    /// Capture path and diagnostic count, in load order
    pub counts: Vec<(PathBuf, usize)>,
}

/// One planned overwrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusAction {
    pub revision: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_count: usize,
    pub replaced_count: usize,
}

/// What a consensus run planned and whether it wrote anything
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusOutcome {
    pub disagreements: Vec<Disagreement>,
    pub actions: Vec<ConsensusAction>,
    pub applied: bool,
}

pub struct SnapshotConsensus {
    format: CaptureFormat,
    policy: ConsensusPolicy,
}

impl SnapshotConsensus {
    pub fn new(format: CaptureFormat, policy: ConsensusPolicy) -> Self {
        Self { format, policy }
    }

    /// Every capture of every folder, excluded ones included
    ///
    /// All folders are checked before any is read.
    pub fn load(&self, folders: &[PathBuf]) -> Result<Vec<Snapshot>> {
        for folder in folders {
            TrackError::require_exists(folder)?;
        }

        let mut captures = Vec::new();
        for folder in folders {
            let loaded = Snapshot::load_captures(folder, &self.format)?;
            tracing::debug!(folder = %folder.display(), captures = loaded.len(), "loaded captures");
            captures.extend(loaded);
        }

        Ok(captures)
    }

    /// Revisions with more than one live capture, keyed by revision
    ///
    /// An excluded capture is superseded once its folder also holds an
    /// included capture of the same revision, which is what promoting it
    /// leaves behind.
    fn group(captures: &[Snapshot]) -> BTreeMap<&str, Vec<&Snapshot>> {
        let mut groups: BTreeMap<&str, Vec<&Snapshot>> = BTreeMap::new();
        for capture in captures {
            groups.entry(capture.revision.as_str()).or_default().push(capture);
        }

        for members in groups.values_mut() {
            let included: Vec<Option<&Path>> = members
                .iter()
                .copied()
                .filter(|s| !s.excluded)
                .map(folder_of)
                .collect();
            members.retain(|s| !s.excluded || !included.contains(&folder_of(s)));
        }

        groups.retain(|_, members| members.len() > 1);
        groups
    }

    fn agrees(members: &[&Snapshot]) -> bool {
        members.windows(2).all(|pair| pair[0].len() == pair[1].len())
    }

    pub fn disagreements(captures: &[Snapshot]) -> Vec<Disagreement> {
        Self::group(captures)
            .into_iter()
            .filter(|(_, members)| !Self::agrees(members))
            .map(|(revision, members)| Disagreement {
                revision: revision.to_string(),
                counts: members
                    .iter()
                    .map(|s| (s.origin.clone().unwrap_or_default(), s.len()))
                    .collect(),
            })
            .collect()
    }

    /// Overwrites that would bring every disagreeing group in line
    pub fn plan(&self, captures: &[Snapshot]) -> Vec<ConsensusAction> {
        let mut actions = Vec::new();

        for (revision, members) in Self::group(captures) {
            if Self::agrees(&members) {
                continue;
            }

            // max_by_key keeps the last of equal maxima
            let Some(authoritative) = members.iter().copied().max_by_key(|s| s.len()) else {
                continue;
            };
            let Some(source) = authoritative.origin.as_deref() else {
                continue;
            };

            for sibling in &members {
                let Some(sibling_path) = sibling.origin.as_deref() else {
                    continue;
                };
                if sibling_path == source {
                    continue;
                }

                actions.push(ConsensusAction {
                    revision: revision.to_string(),
                    source: source.to_path_buf(),
                    destination: self.destination(authoritative, sibling, sibling_path),
                    source_count: authoritative.len(),
                    replaced_count: sibling.len(),
                });
            }
        }

        actions
    }

    /// An included authority drops the exclusion marker of an excluded sibling
    fn destination(&self, authoritative: &Snapshot, sibling: &Snapshot, sibling_path: &Path) -> PathBuf {
        if !authoritative.excluded && sibling.excluded {
            let mut name = sibling.capture_name();
            name.excluded = false;
            sibling_path.with_file_name(name.file_name(&self.format))
        } else {
            sibling_path.to_path_buf()
        }
    }

    /// Copy each action's source bytes over its destination
    pub fn apply(&self, actions: &[ConsensusAction]) -> Result<usize> {
        for action in actions {
            let bytes = std::fs::read(&action.source).map_err(|e| TrackError::io(&action.source, e))?;
            capture::write_atomic(&action.destination, &bytes)?;

            tracing::warn!(
                revision = %action.revision,
                source = %action.source.display(),
                destination = %action.destination.display(),
                kept = action.source_count,
                replaced = action.replaced_count,
                "overwrote disagreeing capture"
            );
        }

        Ok(actions.len())
    }

    /// Load, plan and (policy permitting) apply
    pub fn run(&self, folders: &[PathBuf]) -> Result<ConsensusOutcome> {
        let captures = self.load(folders)?;
        let disagreements = Self::disagreements(&captures);
        let actions = self.plan(&captures);

        let applied = match self.policy {
            ConsensusPolicy::LargestWins => {
                self.apply(&actions)?;
                true
            }
            ConsensusPolicy::ReportOnly => false,
        };

        tracing::info!(
            captures = captures.len(),
            disagreements = disagreements.len(),
            actions = actions.len(),
            applied,
            "consensus finished"
        );

        Ok(ConsensusOutcome {
            disagreements,
            actions,
            applied,
        })
    }
}

fn folder_of(snapshot: &Snapshot) -> Option<&Path> {
    snapshot.origin.as_deref().and_then(Path::parent)
}
