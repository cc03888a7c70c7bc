//! Lifetime tracing through transition chains
//!
//! A diagnostic's identity changes as it is matched forward (line numbers
//! shift, files are reformatted), so a trace must follow each match rather
//! than look the original identity up in later departed sets.

use diagtrack_core::{Diagnostic, Result, TrackError, Transition};
use serde::{Deserialize, Serialize};

/// Half-open transition index interval `[enters, leaves)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub enters: usize,
    pub leaves: usize,
}

impl Lifetime {
    pub fn len(&self) -> usize {
        self.leaves.saturating_sub(self.enters)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.enters <= index && index < self.leaves
    }
}

/// Outcome of following a diagnostic through a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// Found in the departed set of transition `index`; `identity` is how the
    /// diagnostic looked entering that transition
    Departed { index: usize, identity: Diagnostic },

    /// Alive through the window; `end` is the index a trace reports
    Survived { end: usize },
}

impl Departure {
    pub fn index(&self) -> usize {
        match self {
            Self::Departed { index, .. } => *index,
            Self::Survived { end } => *end,
        }
    }

    pub fn departed(&self) -> bool {
        matches!(self, Self::Departed { .. })
    }
}

/// Follows diagnostics through a borrowed chain; never mutates it
#[derive(Debug, Clone, Copy)]
pub struct LifetimeTracer<'a> {
    chain: &'a [Transition],
}

impl<'a> LifetimeTracer<'a> {
    pub fn new(chain: &'a [Transition]) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &'a [Transition] {
        self.chain
    }

    /// Index of the transition at which `diagnostic` departs, or `end` if it
    /// survives the window `[start, end)`
    ///
    /// A diagnostic that arrives at `chain[start]` is traced from `start + 1`.
    /// Starting at the last transition of the chain reports `start`: there is
    /// no data to decide a departure from. An inverted window (`start > end`)
    /// is treated as empty and also reports `start`, not `end`.
    pub fn trace(&self, diagnostic: &Diagnostic, start: usize, end: usize) -> Result<usize> {
        self.trace_departure(diagnostic, start, end).map(|d| d.index())
    }

    pub fn trace_from(&self, diagnostic: &Diagnostic, start: usize) -> Result<usize> {
        self.trace(diagnostic, start, self.chain.len())
    }

    /// `trace`, keeping the identity the diagnostic had when it departed
    pub fn trace_departure(&self, diagnostic: &Diagnostic, start: usize, end: usize) -> Result<Departure> {
        // empty or inverted window, or nothing left to walk
        if start >= end || start >= self.chain.len() {
            return Ok(Departure::Survived { end: start });
        }

        let mut start = start;
        if self.chain[start].is_arrived(diagnostic) {
            start += 1;
        }

        if start == self.chain.len() - 1 {
            return Ok(Departure::Survived { end: start });
        }

        self.follow(diagnostic, start, end)
    }

    /// Walk `[start, end)` assuming `diagnostic` is alive entering `start`
    pub fn walk(&self, diagnostic: &Diagnostic, start: usize, end: usize) -> Result<usize> {
        self.follow(diagnostic, start, end).map(|d| d.index())
    }

    /// `walk`, keeping the identity the diagnostic had when it departed
    pub fn follow(&self, diagnostic: &Diagnostic, start: usize, end: usize) -> Result<Departure> {
        let stop = end.min(self.chain.len());
        let mut current = diagnostic;

        for cur in start..stop {
            let transition = &self.chain[cur];

            if transition.is_departed(current) {
                tracing::trace!(diagnostic = %diagnostic, index = cur, "departed");
                return Ok(Departure::Departed {
                    index: cur,
                    identity: current.clone(),
                });
            }

            current = transition.matched(current).ok_or_else(|| TrackError::IdentityInconsistency {
                transition: transition.label(),
                diagnostic: current.to_string(),
                detail: format!("is neither matched nor departed at chain index {}", cur),
            })?;
        }

        Ok(Departure::Survived { end })
    }

    /// Lifetime of a diagnostic first observed at transition `enters`
    pub fn lifetime(&self, diagnostic: &Diagnostic, enters: usize) -> Result<Lifetime> {
        let leaves = self.trace_from(diagnostic, enters)?;
        Ok(Lifetime { enters, leaves })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use diagtrack_core::{Span, TransitionName};
    use pretty_assertions::assert_eq;

    pub(crate) fn diag(file: &str, line: u32) -> Diagnostic {
        Diagnostic::new(file, line, 1, Span::new(0, 0, 8), "[Finding] something")
    }

    pub(crate) fn step(
        pre: u64,
        post: u64,
        matches: Vec<(Diagnostic, Diagnostic)>,
        departed: Vec<Diagnostic>,
        arrived: Vec<Diagnostic>,
    ) -> Transition {
        Transition::new(
            TransitionName::new(pre, format!("r{}", pre), post, format!("r{}", post)),
            matches,
            departed,
            arrived,
        )
        .unwrap()
    }

    /// X arrives in T1, is matched (and moves) through T2, departs in T3
    fn four_step_chain() -> (Vec<Transition>, Diagnostic) {
        let keep = diag("Keep.java", 1);
        let x = diag("X.java", 10);
        let x_moved = diag("X.java", 12);

        let chain = vec![
            step(0, 1, vec![(keep.clone(), keep.clone())], vec![], vec![]),
            step(1, 2, vec![(keep.clone(), keep.clone())], vec![], vec![x.clone()]),
            step(2, 3, vec![(keep.clone(), keep.clone()), (x.clone(), x_moved.clone())], vec![], vec![]),
            step(3, 4, vec![(keep.clone(), keep.clone())], vec![x_moved], vec![]),
        ];

        (chain, x)
    }

    #[test]
    fn follows_identity_to_departure() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.trace(&x, 1, chain.len()).unwrap(), 3);
    }

    #[test]
    fn trace_is_deterministic() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        let first = tracer.trace(&x, 1, 4).unwrap();
        let second = tracer.trace(&x, 1, 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn arrival_is_same_as_starting_one_later() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert!(chain[1].is_arrived(&x));
        assert_eq!(tracer.trace(&x, 1, 4).unwrap(), tracer.trace(&x, 2, 4).unwrap());
    }

    #[test]
    fn survivor_reports_window_end() {
        let (chain, _) = four_step_chain();
        let keep = diag("Keep.java", 1);
        let tracer = LifetimeTracer::new(&chain);

        assert_eq!(tracer.trace(&keep, 0, 4).unwrap(), 4);
        assert_eq!(tracer.trace(&keep, 0, 2).unwrap(), 2);
        // an end past the chain is reported as given
        assert_eq!(tracer.trace(&keep, 0, 9).unwrap(), 9);
    }

    #[test]
    fn window_can_stop_before_departure() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.trace(&x, 1, 3).unwrap(), 3);
    }

    #[test]
    fn zero_length_window_returns_start() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.trace(&x, 2, 2).unwrap(), 2);
    }

    #[test]
    fn inverted_window_returns_start() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.trace(&x, 3, 1).unwrap(), 3);
        assert!(!tracer.trace_departure(&x, 3, 1).unwrap().departed());
    }

    #[test]
    fn starting_at_last_transition_returns_start() {
        let (chain, x) = four_step_chain();
        let x_moved = diag("X.java", 12);
        let tracer = LifetimeTracer::new(&chain);

        // departs at index 3, but there is no data past the last transition
        assert_eq!(tracer.trace(&x_moved, 3, 4).unwrap(), 3);
        // arriving in the second to last transition lands on the last one
        let late = diag("Late.java", 1);
        let mut chain = chain;
        chain[2] = step(2, 3, vec![(diag("Keep.java", 1), diag("Keep.java", 1)), (x.clone(), x_moved)], vec![], vec![late.clone()]);
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.trace(&late, 2, 4).unwrap(), 3);
    }

    #[test]
    fn unmatched_identity_is_an_error() {
        let (chain, _) = four_step_chain();
        let stranger = diag("Nowhere.java", 99);
        let tracer = LifetimeTracer::new(&chain);

        let err = tracer.trace(&stranger, 0, 4).unwrap_err();
        match err {
            TrackError::IdentityInconsistency { transition, .. } => assert_eq!(transition, "0 r0 -> 1 r1"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn departure_keeps_last_identity() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);

        let departure = tracer.trace_departure(&x, 1, 4).unwrap();
        assert_eq!(
            departure,
            Departure::Departed { index: 3, identity: diag("X.java", 12) }
        );
        assert!(departure.departed());
    }

    #[test]
    fn walk_skips_boundary_adjustments() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);
        assert_eq!(tracer.walk(&x, 2, 4).unwrap(), 3);
        assert_eq!(tracer.walk(&diag("X.java", 12), 3, 4).unwrap(), 3);
    }

    #[test]
    fn lifetime_interval() {
        let (chain, x) = four_step_chain();
        let tracer = LifetimeTracer::new(&chain);

        let lifetime = tracer.lifetime(&x, 1).unwrap();
        assert_eq!(lifetime, Lifetime { enters: 1, leaves: 3 });
        assert_eq!(lifetime.len(), 2);
        assert!(lifetime.contains(2));
        assert!(!lifetime.contains(3));
    }

    #[test]
    fn empty_chain() {
        let tracer = LifetimeTracer::new(&[]);
        assert_eq!(tracer.trace(&diag("A.java", 1), 0, 0).unwrap(), 0);
    }
}
