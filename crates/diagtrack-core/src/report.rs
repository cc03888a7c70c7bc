//! Reconciliation report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diagnostic::Diagnostic;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A sampled revision: sequence number plus revision id when known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPoint {
    pub seq: u64,
    pub revision: Option<String>,
}

impl RevisionPoint {
    pub fn new(seq: u64, revision: Option<&str>) -> Self {
        Self {
            seq,
            revision: revision.map(str::to_string),
        }
    }
}

impl fmt::Display for RevisionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{} {}", self.seq, rev),
            None => write!(f, "{}", self.seq),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Appeared and disappeared strictly between two coarse sample points
    Missed,

    /// Matched straight through a coarse step but departed in the fine chain
    Mistracked,

    /// Mistracked, but looks like a single-revision build failure
    SuppressedBuildFailure,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missed => write!(f, "missed"),
            Self::Mistracked => write!(f, "mistracked"),
            Self::SuppressedBuildFailure => write!(f, "suppressed (build failure)"),
        }
    }
}

/// One advisory finding from comparing a coarse and a fine chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,

    pub diagnostic: Diagnostic,

    /// Coarse gap the finding falls within
    pub coarse_from: RevisionPoint,
    pub coarse_to: RevisionPoint,

    /// First fine revision the diagnostic is present at
    pub enters: RevisionPoint,

    /// First fine revision the diagnostic is absent from
    pub leaves: RevisionPoint,

    /// Coarse chain's match for mistracked findings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_to: Option<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub missed: usize,
    pub mistracked: usize,
    pub suppressed: usize,

    /// Coarse steps that had intervening fine revisions
    pub gaps_checked: usize,
}

/// Reconciliation report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub summary: ReportSummary,

    pub findings: Vec<Finding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            findings: Vec::new(),
            metadata: None,
        }
    }

    pub fn from_findings(findings: Vec<Finding>) -> Self {
        let mut report = Self::new();
        for finding in findings {
            report.add_finding(finding);
        }
        report
    }

    pub fn add_finding(&mut self, finding: Finding) {
        match finding.kind {
            FindingKind::Missed => self.summary.missed += 1,
            FindingKind::Mistracked => self.summary.mistracked += 1,
            FindingKind::SuppressedBuildFailure => self.summary.suppressed += 1,
        }

        self.summary.total += 1;
        self.findings.push(finding);
    }

    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Whether anything other than suppressed findings was reported
    pub fn has_findings(&self) -> bool {
        self.summary.missed + self.summary.mistracked > 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| crate::error::TrackError::io(path, e))?;
        crate::capture::write_atomic(path, json.as_bytes())
    }

    pub fn save_markdown(&self, path: &std::path::Path) -> crate::error::Result<()> {
        crate::capture::write_atomic(path, self.to_markdown().as_bytes())
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Diagnostic Reconciliation Report\n\n");
        md.push_str(&format!("**Version:** {}\n\n", self.version));
        md.push_str(&format!("**Timestamp:** {}\n\n", self.timestamp));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- Coarse gaps checked: {}\n", self.summary.gaps_checked));
        md.push_str(&format!("- Missed diagnostics: {}\n", self.summary.missed));
        md.push_str(&format!("- Mistracked findings: {}\n", self.summary.mistracked));
        md.push_str(&format!("- Suppressed (likely build failure): {}\n\n", self.summary.suppressed));

        for kind in [FindingKind::Missed, FindingKind::Mistracked] {
            let findings: Vec<&Finding> = self.of_kind(kind).collect();
            if findings.is_empty() {
                continue;
            }

            md.push_str(&format!("## {} ({})\n\n", kind, findings.len()));
            for finding in findings {
                md.push_str(&format!(
                    "### `{}` between {} and {}\n\n",
                    finding.diagnostic, finding.coarse_from, finding.coarse_to
                ));
                md.push_str(&format!("{}\n\n", finding.diagnostic.message));
                md.push_str(&format!(
                    "**Enters:** {}  \n**Leaves:** {}\n\n",
                    finding.enters, finding.leaves
                ));
                if let Some(to) = &finding.matched_to {
                    md.push_str(&format!("**Coarse match:** `{}`\n\n", to));
                }
            }
        }

        md
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}
