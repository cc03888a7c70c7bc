//! Per-diagnostic lifetimes and per-revision totals over a whole chain

use diagtrack_core::{Diagnostic, Result, Transition};
use serde::Serialize;

use crate::tracer::{Lifetime, LifetimeTracer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub diagnostic: Diagnostic,
    pub lifetime: Lifetime,
}

/// Every diagnostic seen in a chain with the interval it was alive for
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,

    /// Number of transitions in the chain
    pub transitions: usize,
}

impl Timeline {
    /// Lifetimes of the first transition's source diagnostics, then of every
    /// arrival in chain order
    pub fn build(chain: &[Transition]) -> Result<Self> {
        let tracer = LifetimeTracer::new(chain);
        let mut entries = Vec::new();

        if let Some(first) = chain.first() {
            for diagnostic in first.source_diagnostics() {
                let lifetime = tracer.lifetime(&diagnostic, 0)?;
                entries.push(TimelineEntry { diagnostic, lifetime });
            }
        }

        for (i, transition) in chain.iter().enumerate() {
            for diagnostic in transition.arrived() {
                let lifetime = tracer.lifetime(diagnostic, i)?;
                entries.push(TimelineEntry {
                    diagnostic: diagnostic.clone(),
                    lifetime,
                });
            }
        }

        tracing::debug!(diagnostics = entries.len(), transitions = chain.len(), "built timeline");

        Ok(Self {
            entries,
            transitions: chain.len(),
        })
    }

    /// Diagnostics present at each transition's destination
    pub fn totals(chain: &[Transition]) -> Vec<usize> {
        chain
            .iter()
            .map(|t| t.matches().len() + t.arrived().len())
            .collect()
    }

    /// Entries alive during transition `index`
    pub fn alive_at(&self, index: usize) -> usize {
        self.entries.iter().filter(|e| e.lifetime.contains(index)).count()
    }

    /// Entries ordered longest-lived first; ties keep chain order
    pub fn by_lifetime(&self) -> Vec<&TimelineEntry> {
        let mut sorted: Vec<&TimelineEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.lifetime.len().cmp(&a.lifetime.len()));
        sorted
    }

    /// One text row per diagnostic, `#` where it is alive
    pub fn render(&self) -> String {
        let mut out = String::new();

        for entry in self.by_lifetime() {
            let row: String = (0..self.transitions)
                .map(|i| if entry.lifetime.contains(i) { '#' } else { '.' })
                .collect();
            out.push_str(&row);
            out.push(' ');
            out.push_str(&entry.diagnostic.to_string());
            out.push('\n');
        }

        out
    }
}
