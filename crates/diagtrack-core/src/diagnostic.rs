//! Analyzer diagnostics and their identity
//!
//! A diagnostic's identity tolerates reformatting: absolute byte offsets may
//! move between revisions, only the span length takes part in equality.
//! The raw block a diagnostic was parsed from is kept verbatim so captures
//! can be written back byte for byte.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::config::CaptureFormat;
use crate::error::{Result, TrackError};

/// Byte span of a diagnostic within its file, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,

    /// Preferred caret position reported by the analyzer
    pub pos: u64,

    pub end: u64,
}

impl Span {
    pub fn new(start: u64, pos: u64, end: u64) -> Self {
        Self { start, pos, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One finding at one revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File path relative to the project root
    pub file: String,

    pub line: u32,

    pub column: u32,

    pub span: Span,

    /// Full message line
    pub message: String,

    /// Verbatim lines of the block this diagnostic was parsed from
    #[serde(skip)]
    raw: Vec<String>,
}

impl Diagnostic {
    /// Build a diagnostic from its fields, rendering a canonical raw block
    pub fn new(
        file: impl Into<String>,
        line: u32,
        column: u32,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        let file = file.into();
        let message = message.into();
        let raw = vec![
            CaptureFormat::default().diagnostic_delimiter,
            format!("{} {} {} {} {} {}", file, line, column, span.start, span.pos, span.end),
            message.clone(),
        ];

        Self {
            file,
            line,
            column,
            span,
            message,
            raw,
        }
    }

    /// Parse one delimited block: delimiter, location line, message line
    ///
    /// `origin` names the capture in error messages.
    pub fn parse_block(lines: &[&str], format: &CaptureFormat, origin: &str) -> Result<Self> {
        let location = lines.get(1).map(|l| l.trim()).ok_or_else(|| {
            TrackError::malformed(origin, "diagnostic block has no location line")
        })?;
        let message = lines.get(2).map(|l| l.trim()).ok_or_else(|| {
            TrackError::malformed(
                origin,
                format!("diagnostic at '{}' has no message line", location),
            )
        })?;

        let (file, line, column, span) = parse_location(location).ok_or_else(|| {
            TrackError::malformed(origin, format!("unparseable location line '{}'", location))
        })?;

        Ok(Self {
            file: format.relative_path(file),
            line,
            column,
            span,
            message: message.to_string(),
            raw: lines.iter().map(|l| l.to_string()).collect(),
        })
    }

    /// The verbatim block, one entry per line
    pub fn raw_lines(&self) -> &[String] {
        &self.raw
    }

    /// Block text as written to captures (no trailing newline)
    pub fn block_text(&self) -> String {
        if self.raw.is_empty() {
            // Deserialized from a report: the raw block was not kept.
            let span = &self.span;
            return format!(
                "{}\n{} {} {} {} {} {}\n{}",
                CaptureFormat::default().diagnostic_delimiter,
                self.file,
                self.line,
                self.column,
                span.start,
                span.pos,
                span.end,
                self.message
            );
        }

        self.raw.join("\n")
    }

    pub fn span_len(&self) -> u64 {
        self.span.len()
    }

    /// First whitespace-delimited token of the message, e.g. `[MissingOverride]`
    pub fn kind(&self) -> &str {
        kind_of(&self.message)
    }
}

fn kind_of(message: &str) -> &str {
    message.split_whitespace().next().unwrap_or("")
}

/// `<file> <line> <col> <start> <pos> <end>`, parsed from the right so that
/// paths containing spaces survive
fn parse_location(location: &str) -> Option<(&str, u32, u32, Span)> {
    let mut fields = location.rsplitn(6, ' ');

    let end: u64 = fields.next()?.parse().ok()?;
    let pos: u64 = fields.next()?.parse().ok()?;
    let start: u64 = fields.next()?.parse().ok()?;
    let column: u32 = fields.next()?.parse().ok()?;
    let line: u32 = fields.next()?.parse().ok()?;
    let file = fields.next()?.trim();

    if file.is_empty() || end < start {
        return None;
    }

    Some((file, line, column, Span::new(start, pos, end)))
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.line == other.line
            && self.column == other.column
            && self.message == other.message
            && self.span_len() == other.span_len()
    }
}

impl Eq for Diagnostic {}

impl Hash for Diagnostic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // kind is derived from message, so equal diagnostics share it
        self.file.hash(state);
        self.line.hash(state);
        self.column.hash(state);
        self.kind().hash(state);
        self.span_len().hash(state);
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then(self.line.cmp(&other.line))
            .then(self.column.cmp(&other.column))
            .then_with(|| self.message.cmp(&other.message))
            .then(self.span_len().cmp(&other.span_len()))
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({} {} {} {} {} {})",
            self.file, self.kind(), self.line, self.column, self.span.start, self.span.end
        )
    }
}
