//! Non-fatal diagnostics
//!
//! Recoverable input problems never reach the primary output stream. They
//! are logged through the `log` facade as they happen and collected in a
//! [`Diagnostics`] sink: every kind is counted, and the first
//! `retain_limit` entries are kept for inspection by the caller.

use crate::core::projector::UndefinedReason;
use std::fmt;

/// Default number of diagnostics kept per sink
pub const DEFAULT_RETAINED_DIAGNOSTICS: usize = 1000;

const KIND_COUNT: usize = 7;

/// Kind of a diagnostic, used for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticKind {
    MalformedLine,
    MissingTag,
    MappingCountMismatch,
    DivergentCigar,
    MissingSequenceName,
    StrandConflict,
    UndefinedTranscript,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; KIND_COUNT] = [
        DiagnosticKind::MalformedLine,
        DiagnosticKind::MissingTag,
        DiagnosticKind::MappingCountMismatch,
        DiagnosticKind::DivergentCigar,
        DiagnosticKind::MissingSequenceName,
        DiagnosticKind::StrandConflict,
        DiagnosticKind::UndefinedTranscript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::MalformedLine => "MalformedLine",
            DiagnosticKind::MissingTag => "MissingTag",
            DiagnosticKind::MappingCountMismatch => "MappingCountMismatch",
            DiagnosticKind::DivergentCigar => "DivergentCigar",
            DiagnosticKind::MissingSequenceName => "MissingSequenceName",
            DiagnosticKind::StrandConflict => "StrandConflict",
            DiagnosticKind::UndefinedTranscript => "UndefinedTranscript",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One recoverable problem found in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Line skipped because it could not be parsed
    MalformedLine { line: usize, message: String },
    /// Alignment without a usable tag; handled as a singleton group
    MissingTag { line: usize, tag: &'static str },
    /// Group member whose `NH:i:` disagrees with the group's first record
    MappingCountMismatch { line: usize, declared: usize, found: usize },
    /// Primary chosen by order although candidates have different CIGARs
    DivergentCigar { line: usize, read_name: String },
    /// `@SQ` header without an `SN:` field, dropped by the whitelist policy
    MissingSequenceName { line: usize },
    /// Feature row whose strand disagrees with its transcript, ignored
    StrandConflict { line: usize, transcript_id: String },
    /// Transcript excluded from projection output
    UndefinedTranscript { transcript_id: String, reason: UndefinedReason },
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::MalformedLine { .. } => DiagnosticKind::MalformedLine,
            Diagnostic::MissingTag { .. } => DiagnosticKind::MissingTag,
            Diagnostic::MappingCountMismatch { .. } => DiagnosticKind::MappingCountMismatch,
            Diagnostic::DivergentCigar { .. } => DiagnosticKind::DivergentCigar,
            Diagnostic::MissingSequenceName { .. } => DiagnosticKind::MissingSequenceName,
            Diagnostic::StrandConflict { .. } => DiagnosticKind::StrandConflict,
            Diagnostic::UndefinedTranscript { .. } => DiagnosticKind::UndefinedTranscript,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedLine { line, message } => {
                write!(f, "Line {}: malformed line skipped: {}", line, message)
            }
            Diagnostic::MissingTag { line, tag } => {
                write!(f, "Line {}: missing {} tag, treated as a single alignment", line, tag)
            }
            Diagnostic::MappingCountMismatch { line, declared, found } => write!(
                f,
                "Line {}: NH:i:{} differs from the group's declared count {}",
                line, found, declared
            ),
            Diagnostic::DivergentCigar { line, read_name } => write!(
                f,
                "Line {}: read '{}' has candidates with different CIGAR strings; primary chosen by order, alignment scores not compared",
                line, read_name
            ),
            Diagnostic::MissingSequenceName { line } => {
                write!(f, "Line {}: @SQ header without SN field dropped", line)
            }
            Diagnostic::StrandConflict { line, transcript_id } => write!(
                f,
                "Line {}: ambiguous strand for transcript '{}', row ignored",
                line, transcript_id
            ),
            Diagnostic::UndefinedTranscript { transcript_id, reason } => {
                write!(f, "Transcript '{}' undefined: {}", transcript_id, reason)
            }
        }
    }
}

/// Side channel collecting diagnostics of one stream
#[derive(Debug, Clone)]
pub struct Diagnostics {
    source: String,
    entries: Vec<Diagnostic>,
    counts: [usize; KIND_COUNT],
    retain_limit: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new("<stream>")
    }
}

impl Diagnostics {
    /// Create a sink labelled with the name of the input it describes
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_limit(source, DEFAULT_RETAINED_DIAGNOSTICS)
    }

    pub fn with_limit(source: impl Into<String>, retain_limit: usize) -> Self {
        Self {
            source: source.into(),
            entries: Vec::new(),
            counts: [0; KIND_COUNT],
            retain_limit,
        }
    }

    /// Log and record a diagnostic
    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}: {}", self.source, diagnostic);
        self.counts[diagnostic.kind().index()] += 1;
        if self.entries.len() < self.retain_limit {
            self.entries.push(diagnostic);
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Retained diagnostics, in report order
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.counts[kind.index()]
    }

    /// Total number of diagnostics reported, including ones not retained
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-zero counts per kind
    pub fn summary(&self) -> Vec<(DiagnosticKind, usize)> {
        DiagnosticKind::ALL
            .iter()
            .map(|&kind| (kind, self.count(kind)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }
}
