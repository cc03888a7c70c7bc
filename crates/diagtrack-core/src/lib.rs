//! diagtrack core
//!
//! Domain model for tracking analyzer findings across revisions: diagnostics,
//! per-revision snapshots, pairwise transitions and the revision history they
//! are ordered by. The capture text formats are part of the public surface;
//! loading then saving an untouched capture must reproduce it byte for byte.

pub mod capture;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod history;
pub mod report;
pub mod snapshot;
pub mod transition;

pub use capture::{CaptureName, LineLayout, TransitionName};
pub use config::{CaptureFormat, Config, ConfigError, ConsensusPolicy, ZombieFilter};
pub use diagnostic::{Diagnostic, Span};
pub use error::{Result, TrackError};
pub use history::RevisionHistory;
pub use report::{Finding, FindingKind, Report, ReportVersion, RevisionPoint};
pub use snapshot::Snapshot;
pub use transition::Transition;
