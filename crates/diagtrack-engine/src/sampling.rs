//! Review sampling of transitions
//!
//! Matching quality is judged by hand. These helpers shrink a chain to a
//! reviewable sample: identical matches are dropped (they are trivially
//! right), the rest is stratified by a factor, and matches claimed by more
//! than one transition are kept only once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use diagtrack_core::capture::file_name_of;
use diagtrack_core::{Diagnostic, Result, Transition};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Suffix for a transition with exact matches removed
pub const FILTERED_SUFFIX: &str = "filtered";

/// Suffix for a stratified transition
pub const STRATIFIED_SUFFIX: &str = "strat";

/// Suffix for a filtered then stratified transition
pub const STRATIFIED_FILTERED_SUFFIX: &str = "strat_filtered";

/// `<capture>.<suffix>` next to `path`
pub fn derived_path(path: &Path, suffix: &str) -> PathBuf {
    path.with_file_name(format!("{}.{}", file_name_of(path), suffix))
}

/// Drop matches whose two sides are the same diagnostic
pub fn without_exact_matches(transition: &Transition) -> Result<Transition> {
    let matches = transition
        .matches()
        .iter()
        .filter(|(old, new)| old != new)
        .cloned()
        .collect();

    transition.derive(matches, transition.departed().to_vec(), transition.arrived().to_vec())
}

/// Keep `len / factor` randomly chosen items
fn sample<T, R: Rng + ?Sized>(mut items: Vec<T>, factor: usize, rng: &mut R) -> Vec<T> {
    items.shuffle(rng);
    items.truncate(items.len() / factor.max(1));
    items
}

/// Sample matches, departures and arrivals independently
pub fn stratify<R: Rng + ?Sized>(transition: &Transition, factor: usize, rng: &mut R) -> Result<Transition> {
    let matches = sample(transition.matches().to_vec(), factor, rng);
    let departed = sample(transition.departed().to_vec(), factor, rng);
    let arrived = sample(transition.arrived().to_vec(), factor, rng);

    transition.derive(matches, departed, arrived)
}

/// Drop matches from later transitions that an earlier one already claims
/// with the same target
pub fn remove_overlapping_matches(chain: Vec<Transition>) -> Result<Vec<Transition>> {
    let mut chain = chain;

    for i in 0..chain.len() {
        for j in 0..chain.len() {
            if i == j {
                continue;
            }

            let duplicated: HashSet<Diagnostic> = chain[j]
                .matches()
                .iter()
                .filter(|(old, new)| chain[i].matched(old) == Some(new))
                .map(|(old, _)| old.clone())
                .collect();

            if duplicated.is_empty() {
                continue;
            }

            let kept = chain[j]
                .matches()
                .iter()
                .filter(|(old, _)| !duplicated.contains(old))
                .cloned()
                .collect();

            tracing::debug!(
                transition = %chain[j].name,
                duplicates = duplicated.len(),
                "removed matches already under review"
            );
            chain[j] = chain[j].derive(kept, chain[j].departed().to_vec(), chain[j].arrived().to_vec())?;
        }
    }

    Ok(chain)
}

/// Human-readable checklist for a sampled chain
pub fn review_sheet(chain: &[Transition]) -> String {
    let mut out = String::new();

    for transition in chain {
        out.push_str(&format!("Sample {}\n", transition.name));

        out.push_str("Check these are tracked properly:\n");
        let mut matches: Vec<&(Diagnostic, Diagnostic)> = transition.matches().iter().collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        for (old, new) in matches {
            out.push_str(&format!("  Old {}\n", old));
            out.push_str(&format!("  New {}\n", new));
        }
        out.push('\n');

        out.push_str("Check these were removed:\n");
        for removed in sorted(transition.departed()) {
            out.push_str(&format!("  {}\n", removed));
        }
        out.push('\n');

        out.push_str("Check these were added:\n");
        for added in sorted(transition.arrived()) {
            out.push_str(&format!("  {}\n", added));
        }
        out.push('\n');
    }

    out
}

fn sorted(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    let mut sorted: Vec<&Diagnostic> = diagnostics.iter().collect();
    sorted.sort();
    sorted
}

/// Filter, stratify and de-duplicate a chain for review
pub struct ReviewSampler {
    factor: usize,
    rng: StdRng,
}

impl ReviewSampler {
    /// Seeded samplers are reproducible; unseeded ones draw from the OS
    pub fn new(factor: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            factor: factor.max(1),
            rng,
        }
    }

    pub fn stratify(&mut self, transition: &Transition) -> Result<Transition> {
        stratify(transition, self.factor, &mut self.rng)
    }

    pub fn sample(&mut self, chain: &[Transition]) -> Result<Vec<Transition>> {
        let mut sampled = Vec::with_capacity(chain.len());
        for transition in chain {
            let filtered = without_exact_matches(transition)?;
            sampled.push(self.stratify(&filtered)?);
        }

        let sampled = remove_overlapping_matches(sampled)?;
        tracing::info!(
            transitions = sampled.len(),
            factor = self.factor,
            matches = sampled.iter().map(|t| t.matches().len()).sum::<usize>(),
            "sampled chain for review"
        );

        Ok(sampled)
    }
}

/// Matches whose source diagnostic sits in one of `files`
pub fn matches_in_files<'t>(transition: &'t Transition, files: &HashSet<String>) -> Vec<&'t (Diagnostic, Diagnostic)> {
    transition
        .matches()
        .iter()
        .filter(|(old, _)| files.contains(&old.file))
        .collect()
}
