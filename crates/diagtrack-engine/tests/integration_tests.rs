//! End-to-end flows over capture folders on disk

use std::fs;
use std::path::Path;

use diagtrack_core::{
    CaptureFormat, Diagnostic, FindingKind, RevisionHistory, RevisionPoint, Snapshot, Span, Transition,
    TransitionName, ZombieFilter,
};
use diagtrack_engine::{merge_timeline, sampling, windows_from_granularity, Reconciler, Stitcher, Timeline};
use pretty_assertions::assert_eq;

fn diag(file: &str, line: u32) -> Diagnostic {
    Diagnostic::new(file, line, 3, Span::new(100, 104, 120), "[UnusedVariable] unused local")
}

fn history() -> RevisionHistory {
    RevisionHistory::parse("c0\nc1\nc2\nc3\n")
}

fn save_transition(folder: &Path, pre: u64, post: u64, matches: Vec<(Diagnostic, Diagnostic)>, departed: Vec<Diagnostic>, arrived: Vec<Diagnostic>) {
    let name = TransitionName::new(pre, format!("c{}", pre), post, format!("c{}", post));
    let transition = Transition::new(name, matches, departed, arrived).unwrap();
    transition
        .save(&folder.join(transition.label()), &CaptureFormat::default())
        .unwrap();
}

/// Fine chain c0..c3 where `Flaky.java` lives only at c1 and `Keep.java`
/// moves one line down at c2
fn write_fine_chain(folder: &Path) {
    fs::create_dir_all(folder).unwrap();
    let keep = diag("src/Keep.java", 10);
    let keep_moved = diag("src/Keep.java", 11);
    let flaky = diag("src/Flaky.java", 4);

    save_transition(folder, 0, 1, vec![(keep.clone(), keep.clone())], vec![], vec![flaky.clone()]);
    save_transition(folder, 1, 2, vec![(keep.clone(), keep_moved.clone())], vec![flaky], vec![]);
    save_transition(folder, 2, 3, vec![(keep_moved.clone(), keep_moved)], vec![], vec![]);
}

#[test]
fn reconcile_loaded_chains() {
    let dir = tempfile::tempdir().unwrap();
    let fine_dir = dir.path().join("fine");
    let coarse_dir = dir.path().join("coarse");
    write_fine_chain(&fine_dir);

    fs::create_dir_all(&coarse_dir).unwrap();
    save_transition(
        &coarse_dir,
        0,
        3,
        vec![(diag("src/Keep.java", 10), diag("src/Keep.java", 11))],
        vec![],
        vec![],
    );

    let format = CaptureFormat::default();
    let fine = Transition::load_all(&fine_dir, &format).unwrap();
    let coarse = Transition::load_all(&coarse_dir, &format).unwrap();
    assert_eq!(fine.len(), 3);

    let report = Reconciler::new(&fine, ZombieFilter::TransientBuildFailure)
        .reconcile(&coarse)
        .unwrap();

    assert_eq!(report.summary.missed, 1);
    assert_eq!(report.summary.mistracked, 0);

    let missed: Vec<_> = report.of_kind(FindingKind::Missed).collect();
    assert_eq!(missed[0].diagnostic.file, "src/Flaky.java");
    assert_eq!(missed[0].coarse_from, RevisionPoint::new(0, Some("c0")));
    assert_eq!(missed[0].enters, RevisionPoint::new(1, Some("c1")));
    assert_eq!(missed[0].leaves, RevisionPoint::new(2, Some("c2")));

    let path = dir.path().join("report.json");
    report.save_to_file(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["summary"]["missed"], 1);
}

#[test]
fn stitched_runs_drive_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let every = dir.path().join("proj_1");
    let third = dir.path().join("proj_3");
    fs::create_dir_all(&every).unwrap();
    fs::create_dir_all(&third).unwrap();

    for seq in 0..4u64 {
        Snapshot::new(seq, format!("c{}", seq), vec![])
            .save(&every.join(format!("{} c{}", seq, seq)))
            .unwrap();
    }
    for (seq, rev) in [(0u64, "c0"), (1, "c3")] {
        Snapshot::new(seq, rev, vec![]).save(&third.join(format!("{} {}", seq, rev))).unwrap();
    }

    let history = history();
    let format = CaptureFormat::default();
    let stitched_dir = dir.path().join("stitched");
    Stitcher::new(&history, format.clone())
        .stitch(&[every, third], &stitched_dir)
        .unwrap();

    let stitched = Snapshot::load_all(&stitched_dir, &format).unwrap();
    let grains: Vec<Vec<u32>> = stitched.iter().map(|s| s.granularities.clone()).collect();
    assert_eq!(grains, vec![vec![1, 3], vec![1], vec![1], vec![1, 3]]);

    let fine_dir = dir.path().join("fine");
    write_fine_chain(&fine_dir);
    let fine = Transition::load_all(&fine_dir, &format).unwrap();

    let windows = windows_from_granularity(&stitched, &fine).unwrap();
    assert_eq!(windows.len(), 1);

    let report = Reconciler::new(&fine, ZombieFilter::None)
        .reconcile_windows(&windows)
        .unwrap();
    assert_eq!(report.summary.missed, 1);
}

#[test]
fn zombie_suppressed_with_merged_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let fine_dir = dir.path().join("fine");
    fs::create_dir_all(&fine_dir).unwrap();

    let z = diag("src/Zombie.java", 7);
    save_transition(&fine_dir, 0, 1, vec![(z.clone(), z.clone())], vec![], vec![]);
    save_transition(&fine_dir, 1, 2, vec![], vec![z.clone()], vec![]);
    save_transition(&fine_dir, 2, 3, vec![], vec![], vec![z.clone()]);

    let coarse = vec![Transition::new(
        TransitionName::new(0, "c0", 3, "c3"),
        vec![(z.clone(), z.clone())],
        vec![],
        vec![],
    )
    .unwrap()];

    let coarse_snapshots = vec![Snapshot::new(0, "c0", vec![z.clone()]), Snapshot::new(1, "c3", vec![z.clone()])];
    let fine_snapshots = vec![
        Snapshot::new(0, "c0", vec![z.clone()]),
        Snapshot::new(1, "c1", vec![z.clone()]),
        Snapshot::new(2, "c2", vec![]),
        Snapshot::new(3, "c3", vec![z.clone()]),
    ];
    let timeline = merge_timeline(&history(), &[coarse_snapshots.as_slice(), fine_snapshots.as_slice()]).unwrap();

    let fine = Transition::load_all(&fine_dir, &CaptureFormat::default()).unwrap();
    let report = Reconciler::new(&fine, ZombieFilter::TransientBuildFailure)
        .with_timeline(timeline)
        .reconcile(&coarse)
        .unwrap();

    assert_eq!(report.summary.suppressed, 1);
    assert!(!report.has_findings());
}

#[test]
fn timeline_over_loaded_chain() {
    let dir = tempfile::tempdir().unwrap();
    let fine_dir = dir.path().join("fine");
    write_fine_chain(&fine_dir);

    let fine = Transition::load_all(&fine_dir, &CaptureFormat::default()).unwrap();
    let timeline = Timeline::build(&fine).unwrap();

    assert_eq!(timeline.entries.len(), 2);
    assert_eq!(Timeline::totals(&fine), vec![2, 1, 1]);
    assert_eq!(timeline.entries[0].lifetime.leaves, 3);
}

#[test]
fn filtered_copies_leave_the_chain_intact() {
    let dir = tempfile::tempdir().unwrap();
    let fine_dir = dir.path().join("fine");
    write_fine_chain(&fine_dir);
    let format = CaptureFormat::default();

    for transition in Transition::load_all(&fine_dir, &format).unwrap() {
        let path = fine_dir.join(transition.label());
        let filtered = sampling::without_exact_matches(&transition).unwrap();
        filtered
            .save(&sampling::derived_path(&path, sampling::FILTERED_SUFFIX), &format)
            .unwrap();
    }

    let fine = Transition::load_all(&fine_dir, &format).unwrap();
    assert_eq!(fine.len(), 3);
    let timeline = Timeline::build(&fine).unwrap();
    assert_eq!(timeline.entries.len(), 2);

    let filtered = Transition::load_derived(&fine_dir, &format, sampling::FILTERED_SUFFIX).unwrap();
    assert_eq!(filtered.len(), 3);
    assert!(filtered[0].matches().is_empty());
}
