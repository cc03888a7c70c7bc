//! Pairwise matchings between two snapshots
//!
//! Text format:
//!
//! ```text
//! Total <n>
//! --------Matches
//! <old block>
//!   to
//! <new block>
//! ...
//! --------Unmatched old
//! Total <n>
//! <blocks>
//! --------Unmatched new
//! Total <n>
//! <blocks>
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::capture::{self, file_name_of, parse_total, split_blocks, LineLayout, TransitionName};
use crate::config::CaptureFormat;
use crate::diagnostic::Diagnostic;
use crate::error::{Result, TrackError};
use crate::snapshot::Snapshot;

/// Matching between the diagnostics of a source and a destination snapshot
///
/// Matched keys are unique, no key is also departed and no matched value is
/// also arrived. Construction enforces this.
#[derive(Debug, Clone)]
pub struct Transition {
    pub name: TransitionName,

    matches: Vec<(Diagnostic, Diagnostic)>,
    match_index: HashMap<Diagnostic, usize>,

    departed: Vec<Diagnostic>,
    departed_set: HashSet<Diagnostic>,

    arrived: Vec<Diagnostic>,
    arrived_set: HashSet<Diagnostic>,

    layout: LineLayout,
}

impl Transition {
    pub fn new(
        name: TransitionName,
        matches: Vec<(Diagnostic, Diagnostic)>,
        departed: Vec<Diagnostic>,
        arrived: Vec<Diagnostic>,
    ) -> Result<Self> {
        let label = name.to_string();

        let mut match_index = HashMap::with_capacity(matches.len());
        for (i, (old, _)) in matches.iter().enumerate() {
            if match_index.insert(old.clone(), i).is_some() {
                return Err(inconsistency(&label, old, "is the source of more than one match"));
            }
        }

        let departed_set: HashSet<Diagnostic> = departed.iter().cloned().collect();
        if let Some(both) = departed.iter().find(|d| match_index.contains_key(*d)) {
            return Err(inconsistency(&label, both, "is both matched and departed"));
        }

        let arrived_set: HashSet<Diagnostic> = arrived.iter().cloned().collect();
        if let Some((_, both)) = matches.iter().find(|(_, new)| arrived_set.contains(new)) {
            return Err(inconsistency(&label, both, "is both a match target and arrived"));
        }

        Ok(Self {
            name,
            matches,
            match_index,
            departed,
            departed_set,
            arrived,
            arrived_set,
            layout: LineLayout::default(),
        })
    }

    pub fn parse(text: &str, name: TransitionName, format: &CaptureFormat, origin: &str) -> Result<Self> {
        let layout = LineLayout::detect(text, origin)?;
        let lines: Vec<&str> = text.lines().collect();

        let old_header = find_line(&lines, 0, &format.unmatched_old_header).ok_or_else(|| {
            TrackError::malformed(origin, format!("missing '{}' section", format.unmatched_old_header))
        })?;
        let new_header = find_line(&lines, old_header + 1, &format.unmatched_new_header).ok_or_else(|| {
            TrackError::malformed(origin, format!("missing '{}' section", format.unmatched_new_header))
        })?;

        let match_total = parse_total(lines.first().copied(), origin)?;
        let mut matches = Vec::with_capacity(match_total);
        for block in split_blocks(&lines[1..old_header], &format.match_delimiter, origin)? {
            let sep = block
                .iter()
                .position(|l| l.trim() == format.match_separator)
                .ok_or_else(|| {
                    TrackError::malformed(origin, format!("match without '{}' separator", format.match_separator))
                })?;

            let old = Diagnostic::parse_block(&block[1..sep], format, origin)?;
            let new = Diagnostic::parse_block(&block[sep + 1..], format, origin)?;
            matches.push((old, new));
        }
        expect_count(origin, "matches", match_total, matches.len())?;

        let departed = parse_section(&lines[old_header + 1..new_header], format, origin, "unmatched old")?;
        let arrived = parse_section(&lines[new_header + 1..], format, origin, "unmatched new")?;

        let mut transition = Self::new(name, matches, departed, arrived)?;
        transition.layout = layout;
        Ok(transition)
    }

    pub fn load(path: &Path, format: &CaptureFormat) -> Result<Self> {
        TrackError::require_exists(path)?;

        let origin = path.display().to_string();
        let name = TransitionName::parse(&file_name_of(path)).ok_or_else(|| {
            TrackError::malformed(origin.clone(), "file name is not '<pre> <rev> -> <post> <rev>'")
        })?;

        let text = std::fs::read_to_string(path).map_err(|e| TrackError::io(path, e))?;
        Self::parse(&text, name, format, &origin)
    }

    /// Load every plain transition of a folder, ordered by source sequence number
    ///
    /// Derived captures (`.filtered`, `.strat`, ...) written next to the
    /// chain are left out; see [`Transition::load_derived`].
    pub fn load_all(folder: &Path, format: &CaptureFormat) -> Result<Vec<Self>> {
        Self::load_matching(folder, format, None)
    }

    /// Load the derived captures of a folder carrying `suffix`
    pub fn load_derived(folder: &Path, format: &CaptureFormat, suffix: &str) -> Result<Vec<Self>> {
        Self::load_matching(folder, format, Some(suffix))
    }

    fn load_matching(folder: &Path, format: &CaptureFormat, suffix: Option<&str>) -> Result<Vec<Self>> {
        let mut transitions = capture::list_files(folder)?
            .iter()
            .filter(|path| {
                let file_name = file_name_of(path);
                file_name.contains(" -> ") && TransitionName::derived_suffix(&file_name) == suffix
            })
            .map(|path| Self::load(path, format))
            .collect::<Result<Vec<_>>>()?;

        transitions.sort_by_key(|t| (t.name.pre_seq, t.name.post_seq));
        Ok(transitions)
    }

    pub fn to_text(&self, format: &CaptureFormat) -> String {
        let mut out = String::new();

        push_line(&mut out, &format!("Total {}", self.matches.len()));
        for (old, new) in &self.matches {
            push_line(&mut out, &format.match_delimiter);
            push_line(&mut out, &old.block_text());
            push_line(&mut out, &format.separator_line());
            push_line(&mut out, &new.block_text());
        }

        push_line(&mut out, &format.unmatched_old_header);
        push_line(&mut out, &format!("Total {}", self.departed.len()));
        for diag in &self.departed {
            push_line(&mut out, &diag.block_text());
        }

        push_line(&mut out, &format.unmatched_new_header);
        push_line(&mut out, &format!("Total {}", self.arrived.len()));
        for diag in &self.arrived {
            push_line(&mut out, &diag.block_text());
        }

        self.layout.apply(out)
    }

    pub fn save(&self, path: &Path, format: &CaptureFormat) -> Result<()> {
        capture::write_atomic(path, self.to_text(format).as_bytes())
    }

    pub fn matches(&self) -> &[(Diagnostic, Diagnostic)] {
        &self.matches
    }

    pub fn departed(&self) -> &[Diagnostic] {
        &self.departed
    }

    pub fn arrived(&self) -> &[Diagnostic] {
        &self.arrived
    }

    /// Identity of `diagnostic` at the destination snapshot
    pub fn matched(&self, diagnostic: &Diagnostic) -> Option<&Diagnostic> {
        self.match_index.get(diagnostic).map(|&i| &self.matches[i].1)
    }

    pub fn is_departed(&self, diagnostic: &Diagnostic) -> bool {
        self.departed_set.contains(diagnostic)
    }

    pub fn is_arrived(&self, diagnostic: &Diagnostic) -> bool {
        self.arrived_set.contains(diagnostic)
    }

    /// Diagnostics present at the source snapshot: departed then matched keys
    pub fn source_diagnostics(&self) -> Vec<Diagnostic> {
        self.departed
            .iter()
            .cloned()
            .chain(self.matches.iter().map(|(old, _)| old.clone()))
            .collect()
    }

    /// Diagnostics present at the destination snapshot: matched values then arrived
    pub fn destination_diagnostics(&self) -> Vec<Diagnostic> {
        self.matches
            .iter()
            .map(|(_, new)| new.clone())
            .chain(self.arrived.iter().cloned())
            .collect()
    }

    pub fn pre_revision(&self) -> Option<&str> {
        self.name.pre_revision.as_deref()
    }

    pub fn post_revision(&self) -> Option<&str> {
        self.name.post_revision.as_deref()
    }

    pub fn label(&self) -> String {
        self.name.to_string()
    }

    /// Copy of this transition with different contents, e.g. after sampling
    pub fn derive(
        &self,
        matches: Vec<(Diagnostic, Diagnostic)>,
        departed: Vec<Diagnostic>,
        arrived: Vec<Diagnostic>,
    ) -> Result<Self> {
        let mut derived = Self::new(self.name.clone(), matches, departed, arrived)?;
        derived.layout = self.layout;
        Ok(derived)
    }

    /// Verify the matching exactly partitions both snapshots
    pub fn check_partition(&self, source: &Snapshot, destination: &Snapshot) -> Result<()> {
        let label = self.label();

        let source_side: HashSet<&Diagnostic> = source.diagnostics.iter().collect();
        for diag in &source.diagnostics {
            if !self.match_index.contains_key(diag) && !self.is_departed(diag) {
                return Err(inconsistency(&label, diag, "is present at the source but neither matched nor departed"));
            }
        }
        for diag in self.match_index.keys().chain(self.departed.iter()) {
            if !source_side.contains(diag) {
                return Err(inconsistency(&label, diag, "is not present in the source snapshot"));
            }
        }

        let destination_side: HashSet<&Diagnostic> = destination.diagnostics.iter().collect();
        let match_targets: HashSet<&Diagnostic> = self.matches.iter().map(|(_, new)| new).collect();
        for diag in &destination.diagnostics {
            if !match_targets.contains(diag) && !self.is_arrived(diag) {
                return Err(inconsistency(&label, diag, "is present at the destination but neither matched nor arrived"));
            }
        }
        for diag in match_targets.into_iter().chain(self.arrived.iter()) {
            if !destination_side.contains(diag) {
                return Err(inconsistency(&label, diag, "is not present in the destination snapshot"));
            }
        }

        Ok(())
    }
}

fn inconsistency(transition: &str, diagnostic: &Diagnostic, detail: &str) -> TrackError {
    TrackError::IdentityInconsistency {
        transition: transition.to_string(),
        diagnostic: diagnostic.to_string(),
        detail: detail.to_string(),
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn find_line(lines: &[&str], from: usize, wanted: &str) -> Option<usize> {
    lines
        .iter()
        .skip(from)
        .position(|l| l.trim() == wanted)
        .map(|i| i + from)
}

fn expect_count(origin: &str, section: &str, declared: usize, found: usize) -> Result<()> {
    if declared == found {
        Ok(())
    } else {
        Err(TrackError::malformed(
            origin,
            format!("{} declares {} entries but {} were found", section, declared, found),
        ))
    }
}

/// `Total <n>` followed by diagnostic blocks
fn parse_section(lines: &[&str], format: &CaptureFormat, origin: &str, section: &str) -> Result<Vec<Diagnostic>> {
    let total = parse_total(lines.first().copied(), origin)?;
    let rest = if lines.is_empty() { lines } else { &lines[1..] };

    let diagnostics = split_blocks(rest, &format.diagnostic_delimiter, origin)?
        .into_iter()
        .map(|block| Diagnostic::parse_block(block, format, origin))
        .collect::<Result<Vec<_>>>()?;

    expect_count(origin, section, total, diagnostics.len())?;
    Ok(diagnostics)
}
