//! diagtrack engine - analyses over transition chains
//!
//! This crate implements the analyses built on the core model:
//! - Lifetime tracing through a chain
//! - Coarse/fine reconciliation (missed and mistracked diagnostics)
//! - Consensus across repeated captures
//! - Stitching of multi-granularity capture runs
//! - Timelines and review sampling

pub mod consensus;
pub mod reconciler;
pub mod sampling;
pub mod stitcher;
pub mod timeline;
pub mod tracer;

pub use consensus::{ConsensusAction, ConsensusOutcome, Disagreement, SnapshotConsensus};
pub use reconciler::{align, merge_timeline, window_for, windows_from_granularity, GapWindow, Reconciler};
pub use sampling::ReviewSampler;
pub use stitcher::{StitchEntry, Stitcher};
pub use timeline::{Timeline, TimelineEntry};
pub use tracer::{Departure, Lifetime, LifetimeTracer};
