use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use diagtrack_core::{capture, Config, ConsensusPolicy, FindingKind, Report, RevisionHistory, Snapshot, Transition};
use diagtrack_engine::sampling::{self, FILTERED_SUFFIX};
use diagtrack_engine::{
    merge_timeline, windows_from_granularity, Reconciler, ReviewSampler, SnapshotConsensus, Stitcher, Timeline,
};
use diagtrack_vcs::{GitRepository, RevisionControl, SourceCache};

/// diagtrack - track static-analysis findings across revisions
#[derive(Parser)]
#[command(name = "diagtrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: diagtrack.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the true revision order comes from
#[derive(clap::Args, Debug, Clone)]
struct HistoryArgs {
    /// Revision list file, one id per line, oldest first
    #[arg(long, conflicts_with = "repo")]
    history: Option<PathBuf>,

    /// Git checkout of the analysed project
    #[arg(long)]
    repo: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lifetime of every diagnostic in a transition chain
    Timeline {
        /// Folder of transition captures
        transitions: PathBuf,

        /// Write lifetimes as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Number of diagnostics after each transition
    Totals {
        /// Folder of transition captures
        transitions: PathBuf,
    },

    /// Compare a coarse chain against a fine chain
    Reconcile {
        /// Folder of coarse transition captures
        #[arg(long)]
        coarse: PathBuf,

        /// Folder of fine transition captures
        #[arg(long)]
        fine: PathBuf,

        /// Snapshot folders consulted by the build-failure filter
        #[arg(long = "snapshots")]
        snapshots: Vec<PathBuf>,

        #[command(flatten)]
        history: HistoryArgs,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,

        /// Exit with status 1 when anything was missed or mistracked
        #[arg(long)]
        strict: bool,
    },

    /// Missed diagnostics between the coarsest samples of a stitched folder
    Missed {
        /// Stitched snapshot folder
        #[arg(long)]
        stitched: PathBuf,

        /// Folder of fine transition captures
        #[arg(long)]
        fine: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },

    /// Merge capture folders from several sampling runs
    Stitch {
        /// Capture folders; a trailing `_<n>` names the run's granularity
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// Output folder
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Resolve disagreeing captures of the same revision
    Consensus {
        /// Capture folders from independent runs
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// Plan and report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Drop exact matches, writing `<transition>.filtered`
    Filter {
        /// Transition capture files
        #[arg(required = true)]
        transitions: Vec<PathBuf>,
    },

    /// Build a review sheet from a sample of a chain
    Sample {
        /// Folder of transition captures
        transitions: PathBuf,

        /// Keep one in `factor` entries (default from config)
        #[arg(long)]
        factor: Option<usize>,

        /// Seed for a reproducible sample (default from config)
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (default: <folder>/pr_sample)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show source around matches in files that changed during a transition
    Inspect {
        /// Transition capture file
        transition: PathBuf,

        /// Git checkout of the analysed project
        #[arg(long)]
        repo: PathBuf,

        /// Lines of context on each side
        #[arg(long, default_value_t = 2)]
        radius: usize,
    },

    /// Check that transitions exactly partition their snapshots
    Verify {
        /// Folder of transition captures
        #[arg(long)]
        transitions: PathBuf,

        /// Folder of snapshot captures
        #[arg(long)]
        snapshots: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("diagtrack.toml").exists() {
        Config::from_file(Path::new("diagtrack.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Timeline { transitions, output } => timeline_command(&config, &transitions, output.as_deref()),
        Commands::Totals { transitions } => totals_command(&config, &transitions),
        Commands::Reconcile {
            coarse,
            fine,
            snapshots,
            history,
            output,
            markdown,
            strict,
        } => reconcile_command(
            &config,
            ReconcileInputs {
                coarse: &coarse,
                fine: &fine,
                snapshots: &snapshots,
                history: &history,
            },
            &output,
            markdown.as_deref(),
            strict,
            cli.verbose,
        ),
        Commands::Missed { stitched, fine, output } => missed_command(&config, &stitched, &fine, &output),
        Commands::Stitch {
            folders,
            output,
            history,
        } => stitch_command(&config, &folders, &output, &history, cli.verbose),
        Commands::Consensus { folders, dry_run } => consensus_command(&config, &folders, dry_run),
        Commands::Filter { transitions } => filter_command(&config, &transitions, cli.verbose),
        Commands::Sample {
            transitions,
            factor,
            seed,
            output,
        } => sample_command(&config, &transitions, factor, seed, output),
        Commands::Inspect {
            transition,
            repo,
            radius,
        } => inspect_command(&config, &transition, &repo, radius),
        Commands::Verify { transitions, snapshots } => verify_command(&config, &transitions, &snapshots),
    }
}

/// Log to stderr; `--verbose` lowers the default level, RUST_LOG wins
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Replace `path` atomically with `text`
fn write_output(path: &Path, text: &str) -> Result<()> {
    capture::write_atomic(path, text.as_bytes()).with_context(|| format!("Failed to write {}", path.display()))
}

fn load_history(args: &HistoryArgs) -> Result<RevisionHistory> {
    match (&args.history, &args.repo) {
        (Some(path), _) => RevisionHistory::from_file(path)
            .with_context(|| format!("Failed to read revision history from {}", path.display())),
        (None, Some(repo)) => {
            let repo = GitRepository::open(repo)?;
            Ok(repo.revisions()?)
        }
        (None, None) => Err(anyhow::anyhow!("Revision history required: pass --history <file> or --repo <dir>")),
    }
}

fn load_chain(config: &Config, folder: &Path) -> Result<Vec<Transition>> {
    Transition::load_all(folder, &config.format)
        .with_context(|| format!("Failed to load transitions from {}", folder.display()))
}

/// Timeline command - lifetimes of every diagnostic
fn timeline_command(config: &Config, transitions: &Path, output: Option<&Path>) -> Result<()> {
    let chain = load_chain(config, transitions)?;
    let timeline = Timeline::build(&chain)?;

    print!("{}", timeline.render());
    println!();
    println!(
        "{} {} diagnostics over {} transitions",
        "Tracked".bold(),
        timeline.entries.len(),
        timeline.transitions
    );

    if let Some(path) = output {
        write_output(path, &serde_json::to_string_pretty(&timeline)?)?;
        println!("{} {}", "Timeline saved to:".green(), path.display());
    }

    Ok(())
}

/// Totals command - diagnostics present after each transition
fn totals_command(config: &Config, transitions: &Path) -> Result<()> {
    let chain = load_chain(config, transitions)?;
    let totals = Timeline::totals(&chain);
    let widest = totals.iter().copied().max().unwrap_or(0).max(1);

    for (transition, total) in chain.iter().zip(totals) {
        let bar = "#".repeat(total * 40 / widest);
        println!("{:>6}  {:<40}  {}", total, bar, transition.name.to_string().dimmed());
    }

    Ok(())
}

struct ReconcileInputs<'a> {
    coarse: &'a Path,
    fine: &'a Path,
    snapshots: &'a [PathBuf],
    history: &'a HistoryArgs,
}

/// Reconcile command - missed and mistracked diagnostics
fn reconcile_command(
    config: &Config,
    inputs: ReconcileInputs<'_>,
    output: &Path,
    markdown: Option<&Path>,
    strict: bool,
    verbose: bool,
) -> Result<()> {
    let coarse = load_chain(config, inputs.coarse)?;
    let fine = load_chain(config, inputs.fine)?;

    if verbose {
        eprintln!(
            "{} {} coarse and {} fine transitions",
            "Loaded".cyan(),
            coarse.len(),
            fine.len()
        );
    }

    let mut reconciler = Reconciler::new(&fine, config.reconcile.zombie_filter);

    if !inputs.snapshots.is_empty() {
        let history = load_history(inputs.history)?;
        let sets = inputs
            .snapshots
            .iter()
            .map(|folder| {
                Snapshot::load_all(folder, &config.format)
                    .with_context(|| format!("Failed to load snapshots from {}", folder.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        let slices: Vec<&[Snapshot]> = sets.iter().map(Vec::as_slice).collect();

        reconciler = reconciler.with_timeline(merge_timeline(&history, &slices)?);
    }

    let report = reconciler.reconcile(&coarse)?;
    save_report(&report, output, markdown)?;
    print_report_summary(&report);

    if strict && report.has_findings() {
        std::process::exit(1);
    }

    Ok(())
}

/// Missed command - gaps taken from the coarsest run of a stitched folder
fn missed_command(config: &Config, stitched: &Path, fine: &Path, output: &Path) -> Result<()> {
    let snapshots = Snapshot::load_all(stitched, &config.format)
        .with_context(|| format!("Failed to load stitched snapshots from {}", stitched.display()))?;
    let fine = load_chain(config, fine)?;

    let windows = windows_from_granularity(&snapshots, &fine)?;
    let report = Reconciler::new(&fine, config.reconcile.zombie_filter).reconcile_windows(&windows)?;

    save_report(&report, output, None)?;
    print_report_summary(&report);

    Ok(())
}

fn save_report(report: &Report, output: &Path, markdown: Option<&Path>) -> Result<()> {
    report.save_to_file(output)?;
    println!("{} {}", "Report saved to:".green(), output.display());

    if let Some(md_path) = markdown {
        report.save_markdown(md_path)?;
        println!("{} {}", "Markdown report saved to:".green(), md_path.display());
    }

    Ok(())
}

/// Stitch command - merge sampling runs into one sequence
fn stitch_command(
    config: &Config,
    folders: &[PathBuf],
    output: &Path,
    history: &HistoryArgs,
    verbose: bool,
) -> Result<()> {
    let history = load_history(history)?;
    let stitcher = Stitcher::new(&history, config.format.clone());

    if verbose {
        for folder in folders {
            eprintln!(
                "  {} {} (granularity {})",
                "Reading".cyan(),
                folder.display(),
                Stitcher::folder_granularity(folder)
            );
        }
    }

    let entries = stitcher.stitch(folders, output)?;
    println!(
        "{} {} revisions into {}",
        "Stitched".green(),
        entries.len(),
        output.display()
    );

    Ok(())
}

/// Consensus command - align captures that disagree
fn consensus_command(config: &Config, folders: &[PathBuf], dry_run: bool) -> Result<()> {
    let policy = if dry_run {
        ConsensusPolicy::ReportOnly
    } else {
        config.consensus.policy
    };

    let outcome = SnapshotConsensus::new(config.format.clone(), policy).run(folders)?;

    if outcome.disagreements.is_empty() {
        println!("{}", "✓ All captures agree".green());
        return Ok(());
    }

    for disagreement in &outcome.disagreements {
        println!("{} {}", "Revision".bold(), disagreement.revision.yellow());
        for (path, count) in &disagreement.counts {
            println!("    {:>6}  {}", count, path.display());
        }
    }

    println!();
    let verb = if outcome.applied { "Overwrote" } else { "Would overwrite" };
    for action in &outcome.actions {
        println!(
            "{} {} ({} diagnostics) with {} ({} diagnostics)",
            verb.cyan(),
            action.destination.display(),
            action.replaced_count,
            action.source.display(),
            action.source_count
        );
    }

    Ok(())
}

/// Filter command - write `.filtered` copies without exact matches
fn filter_command(config: &Config, transitions: &[PathBuf], verbose: bool) -> Result<()> {
    for path in transitions {
        let transition = Transition::load(path, &config.format)
            .with_context(|| format!("Failed to load transition {}", path.display()))?;
        let filtered = sampling::without_exact_matches(&transition)?;
        let destination = sampling::derived_path(path, FILTERED_SUFFIX);
        filtered.save(&destination, &config.format)?;

        if verbose {
            eprintln!(
                "{} {} -> {} matches",
                "Filtered".cyan(),
                transition.matches().len(),
                filtered.matches().len()
            );
        }
        println!("{} {}", "Wrote".green(), destination.display());
    }

    Ok(())
}

/// Sample command - review sheet for a stratified sample
fn sample_command(
    config: &Config,
    transitions: &Path,
    factor: Option<usize>,
    seed: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let chain = load_chain(config, transitions)?;
    let factor = factor.unwrap_or(config.sampling.factor);
    if factor == 0 {
        return Err(anyhow::anyhow!("--factor must be at least 1"));
    }

    let mut sampler = ReviewSampler::new(factor, seed.or(config.sampling.seed));
    let sampled = sampler.sample(&chain)?;

    let output = output.unwrap_or_else(|| transitions.join("pr_sample"));
    write_output(&output, &sampling::review_sheet(&sampled))?;

    let checks: usize = sampled
        .iter()
        .map(|t| t.matches().len() + t.departed().len() + t.arrived().len())
        .sum();
    println!("{} {} checks to {}", "Wrote".green(), checks, output.display());

    Ok(())
}

/// Inspect command - source context for matches in changed files
fn inspect_command(config: &Config, transition_path: &Path, repo: &Path, radius: usize) -> Result<()> {
    let transition = Transition::load(transition_path, &config.format)?;
    let (Some(pre), Some(post)) = (transition.pre_revision(), transition.post_revision()) else {
        return Err(anyhow::anyhow!(
            "Transition {} carries no revision ids",
            transition_path.display()
        ));
    };

    let repo = GitRepository::open(repo)?;
    let changed: HashSet<String> = repo.changed_files(pre, post)?.into_iter().collect();
    let mut sources = SourceCache::new(&repo).with_formatter(config.formatter.command.clone());

    // git reports repository-relative paths; diagnostics may carry absolute ones
    let flagged: HashSet<String> = transition
        .matches()
        .iter()
        .map(|(old, _)| old.file.clone())
        .filter(|file| changed.contains(&config.format.relative_path(file)))
        .collect();
    let matches = sampling::matches_in_files(&transition, &flagged);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} {}", "Transition".bold().bright_blue(), transition.name);
    println!("{}", "=".repeat(60).bright_blue());
    println!(
        "{} {} of {} matches in changed files",
        "Found".bold(),
        matches.len(),
        transition.matches().len()
    );

    for (old, new) in matches {
        println!();
        println!("{} {}", "Old".red().bold(), old);
        print_context(&mut sources, &config.format.relative_path(&old.file), old, pre, radius);
        println!("{} {}", "New".green().bold(), new);
        print_context(&mut sources, &config.format.relative_path(&new.file), new, post, radius);
    }

    let stats = sources.stats();
    tracing::debug!(hits = stats.hits, misses = stats.misses, "source cache");

    Ok(())
}

fn print_context(
    sources: &mut SourceCache<'_>,
    file: &str,
    diagnostic: &diagtrack_core::Diagnostic,
    revision: &str,
    radius: usize,
) {
    match sources.context(file, diagnostic, revision, radius) {
        Ok(lines) => {
            for (n, text) in lines {
                let marker = if n == diagnostic.line as usize { ">" } else { " " };
                println!("  {} {:>5} | {}", marker, n, text);
            }
        }
        Err(e) => println!("  {}", e.to_string().yellow()),
    }
}

/// Verify command - every transition partitions its two snapshots
fn verify_command(config: &Config, transitions: &Path, snapshots: &Path) -> Result<()> {
    let chain = load_chain(config, transitions)?;
    let snapshots = Snapshot::load_all(snapshots, &config.format)?;
    let by_seq = |seq: u64| snapshots.iter().find(|s| s.seq == seq);

    let mut checked = 0;
    let mut skipped = 0;
    for transition in &chain {
        match (by_seq(transition.name.pre_seq), by_seq(transition.name.post_seq)) {
            (Some(source), Some(destination)) => {
                transition.check_partition(source, destination)?;
                checked += 1;
            }
            _ => {
                tracing::warn!(transition = %transition.name, "snapshots not found, skipping");
                skipped += 1;
            }
        }
    }

    println!("{} {} transitions ({} skipped)", "✓ Verified".green(), checked, skipped);
    Ok(())
}

/// Print reconciliation summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Reconciliation Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Coarse gaps checked: {}", report.summary.gaps_checked);
    println!("Missed:              {}", report.summary.missed.to_string().red());
    println!("Mistracked:          {}", report.summary.mistracked.to_string().yellow());
    println!("Suppressed:          {}", report.summary.suppressed.to_string().dimmed());
    println!();

    if !report.has_findings() {
        println!("{}", "✓ Coarse chain agrees with fine chain".green());
    } else {
        for kind in [FindingKind::Missed, FindingKind::Mistracked] {
            for finding in report.of_kind(kind) {
                let label = match kind {
                    FindingKind::Missed => "MISSED".red().bold(),
                    _ => "MISTRACKED".yellow().bold(),
                };
                println!("{} {}", label, finding.diagnostic);
                println!(
                    "    gap {} -> {}, present from {} until {}",
                    finding.coarse_from, finding.coarse_to, finding.enters, finding.leaves
                );
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
