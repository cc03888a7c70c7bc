//! Coarse/fine chain reconciliation
//!
//! A coarse chain samples every Nth revision; a fine chain samples every
//! revision in between. Comparing the two over each coarse gap surfaces
//! diagnostics the coarse chain never saw (missed) and coarse matches that
//! the fine chain says actually departed (mistracked).

use std::collections::HashSet;
use std::ops::Range;

use diagtrack_core::{
    Diagnostic, Finding, FindingKind, Report, Result, RevisionHistory, RevisionPoint, Snapshot, TrackError,
    Transition, ZombieFilter,
};
use serde::Serialize;

use crate::tracer::{Departure, LifetimeTracer};

/// The fine transitions covering one coarse step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapWindow {
    pub coarse_from: RevisionPoint,
    pub coarse_to: RevisionPoint,

    /// Indices into the fine chain, first transition through last
    pub fine: Range<usize>,
}

impl GapWindow {
    /// Whether any fine revision sits strictly inside the coarse step
    pub fn has_gap(&self) -> bool {
        self.fine.len() > 1
    }

    pub fn len(&self) -> usize {
        self.fine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fine.is_empty()
    }
}

fn pre_point(t: &Transition) -> RevisionPoint {
    RevisionPoint::new(t.name.pre_seq, t.pre_revision())
}

fn post_point(t: &Transition) -> RevisionPoint {
    RevisionPoint::new(t.name.post_seq, t.post_revision())
}

fn require_revisions(t: &Transition) -> Result<(&str, &str)> {
    match (t.pre_revision(), t.post_revision()) {
        (Some(pre), Some(post)) => Ok((pre, post)),
        _ => Err(TrackError::malformed(
            t.label(),
            "transition name carries no revision ids; re-capture with '<seq> <revision>' names",
        )),
    }
}

/// Fine sub-chain running from `from` to `to`
fn window_between(
    fine: &[Transition],
    from: RevisionPoint,
    to: RevisionPoint,
) -> Result<GapWindow> {
    let pre = from.revision.as_deref().unwrap_or_default();
    let post = to.revision.as_deref().unwrap_or_default();

    let start = fine
        .iter()
        .position(|t| t.pre_revision() == Some(pre))
        .ok_or_else(|| TrackError::MissingRevision(pre.to_string()))?;

    let last = fine[start..]
        .iter()
        .position(|t| t.post_revision() == Some(post))
        .map(|offset| start + offset)
        .ok_or_else(|| TrackError::MissingRevision(post.to_string()))?;

    Ok(GapWindow {
        coarse_from: from,
        coarse_to: to,
        fine: start..last + 1,
    })
}

/// Window of the fine chain covering the coarse transition `step`
pub fn window_for(step: &Transition, fine: &[Transition]) -> Result<GapWindow> {
    require_revisions(step)?;
    for t in fine {
        require_revisions(t)?;
    }

    window_between(fine, pre_point(step), post_point(step))
}

/// One window per coarse transition, in coarse order
pub fn align(coarse: &[Transition], fine: &[Transition]) -> Result<Vec<GapWindow>> {
    coarse.iter().map(|step| window_for(step, fine)).collect()
}

/// Windows between consecutive snapshots tagged with the largest granularity
///
/// Used when there is no separate coarse chain: the coarsest sampling run of a
/// stitched folder plays its part.
pub fn windows_from_granularity(stitched: &[Snapshot], fine: &[Transition]) -> Result<Vec<GapWindow>> {
    for t in fine {
        require_revisions(t)?;
    }

    let Some(coarsest) = stitched.iter().flat_map(|s| s.granularities.iter().copied()).max() else {
        return Ok(Vec::new());
    };

    let points: Vec<RevisionPoint> = stitched
        .iter()
        .filter(|s| s.granularities.contains(&coarsest))
        .map(|s| RevisionPoint::new(s.seq, Some(s.revision.as_str())))
        .collect();

    points
        .windows(2)
        .map(|pair| window_between(fine, pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Every snapshot of `sets` once per revision (first seen wins), in history order
pub fn merge_timeline(history: &RevisionHistory, sets: &[&[Snapshot]]) -> Result<Vec<Snapshot>> {
    let mut seen = HashSet::new();
    let mut keyed = Vec::new();

    for snapshot in sets.iter().flat_map(|set| set.iter()) {
        if seen.insert(snapshot.revision.clone()) {
            keyed.push((history.position(&snapshot.revision)?, snapshot.clone()));
        }
    }

    keyed.sort_by_key(|(position, _)| *position);
    Ok(keyed.into_iter().map(|(_, snapshot)| snapshot).collect())
}

/// Compares coarse steps against a fine chain
pub struct Reconciler<'a> {
    fine: &'a [Transition],
    filter: ZombieFilter,

    /// Coarse and fine snapshots merged in history order
    timeline: Vec<Snapshot>,
}

impl<'a> Reconciler<'a> {
    pub fn new(fine: &'a [Transition], filter: ZombieFilter) -> Self {
        Self {
            fine,
            filter,
            timeline: Vec::new(),
        }
    }

    /// Snapshots the build-failure heuristic consults
    pub fn with_timeline(mut self, timeline: Vec<Snapshot>) -> Self {
        self.timeline = timeline;
        self
    }

    /// Diagnostics that arrive and depart strictly inside `window`
    ///
    /// Arrivals in the window's last transition are present at the coarse
    /// destination, so the coarse chain sees them.
    pub fn missed(&self, window: &GapWindow) -> Result<Vec<Finding>> {
        let tracer = LifetimeTracer::new(self.fine);
        let mut findings = Vec::new();

        if !window.has_gap() {
            return Ok(findings);
        }

        for i in window.fine.start..window.fine.end - 1 {
            let arriving = &self.fine[i];

            for diag in arriving.arrived() {
                if let Departure::Departed { index, .. } = tracer.follow(diag, i + 1, window.fine.end)? {
                    findings.push(Finding {
                        kind: FindingKind::Missed,
                        diagnostic: diag.clone(),
                        coarse_from: window.coarse_from.clone(),
                        coarse_to: window.coarse_to.clone(),
                        enters: post_point(arriving),
                        leaves: post_point(&self.fine[index]),
                        matched_to: None,
                    });
                }
            }
        }

        Ok(findings)
    }

    /// Coarse matches of `step` that depart somewhere inside `window`
    pub fn mistracked(&self, step: &Transition, window: &GapWindow) -> Result<Vec<Finding>> {
        let sub = &self.fine[window.fine.clone()];
        let tracer = LifetimeTracer::new(sub);
        let mut findings = Vec::new();

        for (old, new) in step.matches() {
            let Departure::Departed { index, identity } = tracer.trace_departure(old, 0, sub.len())? else {
                continue;
            };

            let departing = &sub[index];
            let kind = if self.likely_build_failure(&identity, departing) {
                FindingKind::SuppressedBuildFailure
            } else {
                FindingKind::Mistracked
            };

            findings.push(Finding {
                kind,
                diagnostic: old.clone(),
                coarse_from: window.coarse_from.clone(),
                coarse_to: window.coarse_to.clone(),
                enters: pre_point(departing),
                leaves: post_point(departing),
                matched_to: Some(new.clone()),
            });
        }

        Ok(findings)
    }

    /// Absent at the departure revision, present just before and just after
    fn likely_build_failure(&self, identity: &Diagnostic, departing: &Transition) -> bool {
        if self.filter == ZombieFilter::None {
            return false;
        }

        let Some(revision) = departing.post_revision() else {
            return false;
        };
        let Some(i) = self.timeline.iter().position(|s| s.revision == revision) else {
            return false;
        };

        if self.timeline[i].contains(identity) || i == 0 || i + 1 >= self.timeline.len() {
            return false;
        }

        self.timeline[i - 1].contains(identity) && self.timeline[i + 1].contains(identity)
    }

    /// Full comparison of a coarse chain against the fine chain
    pub fn reconcile(&self, coarse: &[Transition]) -> Result<Report> {
        if self.filter != ZombieFilter::None && self.timeline.is_empty() {
            tracing::warn!("no snapshots supplied; build-failure suppression is disabled");
        }

        let mut report = Report::new();

        for step in coarse {
            let window = window_for(step, self.fine)?;
            if !window.has_gap() {
                tracing::debug!(step = %step.name, "no intervening revisions");
                continue;
            }

            report.summary.gaps_checked += 1;

            let missed = self.missed(&window)?;
            let mistracked = self.mistracked(step, &window)?;
            tracing::info!(
                step = %step.name,
                fine = window.len(),
                missed = missed.len(),
                mistracked = mistracked.len(),
                "reconciled coarse step"
            );

            for finding in missed.into_iter().chain(mistracked) {
                report.add_finding(finding);
            }
        }

        Ok(report)
    }

    /// Missed diagnostics only, over precomputed windows
    pub fn reconcile_windows(&self, windows: &[GapWindow]) -> Result<Report> {
        let mut report = Report::new();

        for window in windows.iter().filter(|w| w.has_gap()) {
            report.summary.gaps_checked += 1;
            for finding in self.missed(window)? {
                report.add_finding(finding);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::tests::{diag, step};
    use pretty_assertions::assert_eq;

    fn snapshot(seq: u64, diagnostics: Vec<Diagnostic>) -> Snapshot {
        Snapshot::new(seq, format!("r{}", seq), diagnostics)
    }

    /// Y exists only at r1; the coarse step r0 -> r3 never sees it
    fn transient_gap() -> (Vec<Transition>, Vec<Transition>, Diagnostic) {
        let keep = diag("Keep.java", 1);
        let y = diag("Y.java", 5);

        let fine = vec![
            step(0, 1, vec![(keep.clone(), keep.clone())], vec![], vec![y.clone()]),
            step(1, 2, vec![(keep.clone(), keep.clone())], vec![y.clone()], vec![]),
            step(2, 3, vec![(keep.clone(), keep.clone())], vec![], vec![]),
        ];
        let coarse = vec![step(0, 3, vec![(keep.clone(), keep)], vec![], vec![])];

        (coarse, fine, y)
    }

    #[test]
    fn aligns_coarse_step_to_fine_window() {
        let (coarse, fine, _) = transient_gap();
        let windows = align(&coarse, &fine).unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].fine, 0..3);
        assert_eq!(windows[0].coarse_from, RevisionPoint::new(0, Some("r0")));
        assert!(windows[0].has_gap());
    }

    #[test]
    fn unknown_coarse_revision_is_missing() {
        let (_, fine, _) = transient_gap();
        let coarse = vec![step(0, 7, vec![], vec![], vec![])];

        let err = align(&coarse, &fine).unwrap_err();
        assert!(matches!(err, TrackError::MissingRevision(rev) if rev == "r7"));
    }

    #[test]
    fn transitions_without_revisions_are_rejected() {
        let (_, fine, _) = transient_gap();
        let bare = Transition::new(diagtrack_core::TransitionName::parse("0 -> 3").unwrap(), vec![], vec![], vec![]).unwrap();

        assert!(matches!(window_for(&bare, &fine), Err(TrackError::MalformedCapture { .. })));
    }

    #[test]
    fn finds_missed_diagnostic() {
        let (coarse, fine, y) = transient_gap();
        let reconciler = Reconciler::new(&fine, ZombieFilter::None);

        let report = reconciler.reconcile(&coarse).unwrap();
        assert_eq!(report.summary.gaps_checked, 1);
        assert_eq!(report.summary.missed, 1);

        let finding = &report.findings[0];
        assert_eq!(finding.diagnostic, y);
        assert_eq!(finding.enters, RevisionPoint::new(1, Some("r1")));
        assert_eq!(finding.leaves, RevisionPoint::new(2, Some("r2")));
    }

    #[test]
    fn arrival_surviving_to_coarse_end_is_not_missed() {
        let keep = diag("Keep.java", 1);
        let late = diag("Late.java", 3);
        let fine = vec![
            step(0, 1, vec![(keep.clone(), keep.clone())], vec![], vec![late.clone()]),
            step(1, 2, vec![(keep.clone(), keep.clone()), (late.clone(), late.clone())], vec![], vec![]),
        ];
        let coarse = vec![step(0, 2, vec![(keep.clone(), keep)], vec![], vec![late])];

        let report = Reconciler::new(&fine, ZombieFilter::None).reconcile(&coarse).unwrap();
        assert_eq!(report.summary.total, 0);
    }

    #[test]
    fn arrival_in_last_step_is_visible_to_coarse_chain() {
        let keep = diag("Keep.java", 1);
        let last = diag("Last.java", 9);
        let fine = vec![
            step(0, 1, vec![(keep.clone(), keep.clone())], vec![], vec![]),
            step(1, 2, vec![(keep.clone(), keep.clone())], vec![], vec![last.clone()]),
        ];

        let window = window_for(&step(0, 2, vec![], vec![], vec![]), &fine).unwrap();
        let missed = Reconciler::new(&fine, ZombieFilter::None).missed(&window).unwrap();
        assert!(missed.is_empty());
    }

    /// Coarse chain matches Z straight through r0 -> r3
    fn zombie_case(z_in: [bool; 4]) -> (Vec<Transition>, Vec<Transition>, Vec<Snapshot>) {
        let z = diag("Z.java", 20);
        let mut fine = Vec::new();

        for i in 0..3usize {
            let (before, after) = (z_in[i], z_in[i + 1]);
            let (matches, departed, arrived) = match (before, after) {
                (true, true) => (vec![(z.clone(), z.clone())], vec![], vec![]),
                (true, false) => (vec![], vec![z.clone()], vec![]),
                (false, true) => (vec![], vec![], vec![z.clone()]),
                (false, false) => (vec![], vec![], vec![]),
            };
            fine.push(step(i as u64, i as u64 + 1, matches, departed, arrived));
        }

        let coarse = vec![step(0, 3, vec![(z.clone(), z.clone())], vec![], vec![])];
        let snapshots = (0..4)
            .map(|i| snapshot(i as u64, if z_in[i] { vec![z.clone()] } else { vec![] }))
            .collect();

        (coarse, fine, snapshots)
    }

    #[test]
    fn zombie_is_mistracked() {
        let (coarse, fine, snapshots) = zombie_case([true, false, false, true]);
        let report = Reconciler::new(&fine, ZombieFilter::TransientBuildFailure)
            .with_timeline(snapshots)
            .reconcile(&coarse)
            .unwrap();

        let mistracked: Vec<&Finding> = report.of_kind(FindingKind::Mistracked).collect();
        assert_eq!(mistracked.len(), 1);
        assert_eq!(mistracked[0].leaves, RevisionPoint::new(1, Some("r1")));
        assert_eq!(mistracked[0].matched_to, Some(diag("Z.java", 20)));
    }

    #[test]
    fn single_revision_dropout_is_suppressed() {
        let (coarse, fine, snapshots) = zombie_case([true, true, false, true]);
        let report = Reconciler::new(&fine, ZombieFilter::TransientBuildFailure)
            .with_timeline(snapshots)
            .reconcile(&coarse)
            .unwrap();

        assert_eq!(report.summary.mistracked, 0);
        assert_eq!(report.summary.suppressed, 1);
        assert!(!report.has_findings());
    }

    #[test]
    fn filter_can_be_disabled() {
        let (coarse, fine, snapshots) = zombie_case([true, true, false, true]);
        let report = Reconciler::new(&fine, ZombieFilter::None)
            .with_timeline(snapshots)
            .reconcile(&coarse)
            .unwrap();

        assert_eq!(report.summary.mistracked, 1);
    }

    #[test]
    fn windows_from_coarsest_granularity() {
        let (_, fine, _) = transient_gap();
        let stitched = vec![
            Snapshot { granularities: vec![1, 3], ..snapshot(0, vec![]) },
            Snapshot { granularities: vec![1], ..snapshot(1, vec![]) },
            Snapshot { granularities: vec![1], ..snapshot(2, vec![]) },
            Snapshot { granularities: vec![1, 3], ..snapshot(3, vec![]) },
        ];

        let windows = windows_from_granularity(&stitched, &fine).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].fine, 0..3);

        let report = Reconciler::new(&fine, ZombieFilter::None).reconcile_windows(&windows).unwrap();
        assert_eq!(report.summary.missed, 1);
    }

    #[test]
    fn merge_timeline_orders_by_history() {
        let history = RevisionHistory::new((0..4).map(|i| format!("r{}", i)).collect());
        let coarse = vec![snapshot(0, vec![]), snapshot(3, vec![])];
        let fine = vec![snapshot(2, vec![]), snapshot(0, vec![diag("A.java", 1)]), snapshot(1, vec![])];

        let merged = merge_timeline(&history, &[coarse.as_slice(), fine.as_slice()]).unwrap();
        let revisions: Vec<&str> = merged.iter().map(|s| s.revision.as_str()).collect();
        assert_eq!(revisions, vec!["r0", "r1", "r2", "r3"]);
        // coarse copy of r0 was seen first
        assert!(merged[0].is_empty());
    }
}
