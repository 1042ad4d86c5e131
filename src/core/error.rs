//! Error types for FastTxTools
//!
//! Fatal conditions only. Recoverable problems (malformed lines, missing
//! tags, undefined transcripts) are reported as
//! [`Diagnostic`](crate::core::Diagnostic)s instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for FastTxTools operations
#[derive(Debug, Error)]
pub enum FastTxError {
    /// Alignment rewrite errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Annotation / whitelist loading errors
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the rewrite of the current alignment stream
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The stream ended before a group's declared mapping count was reached
    #[error("Truncated group at line {line}: read '{read_name}' declares {declared} alignments, stream ended after {found}")]
    TruncatedGroup {
        line: usize,
        read_name: String,
        declared: usize,
        found: usize,
    },

    /// The gene-ambiguity policy met a reference absent from the annotation
    #[error("Unknown transcript '{transcript_id}' at line {line}: not present in the annotation")]
    UnknownTranscript { line: usize, transcript_id: String },

    /// Input file could not be opened
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Worker pool could not be created
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while building the annotation lookup tables
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Row could not be parsed
    #[error("Malformed annotation line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    /// Row carries a transcript_id without the attribute it must be paired with
    #[error("Missing '{attribute}' attribute at line {line}")]
    MissingAttribute { line: usize, attribute: &'static str },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Line number at which the stream was abandoned, if known
    pub fn line(&self) -> Option<usize> {
        match self {
            PipelineError::TruncatedGroup { line, .. }
            | PipelineError::UnknownTranscript { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type alias for FastTxTools operations
pub type Result<T> = std::result::Result<T, FastTxError>;

/// Result type alias for rewrite operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Result type alias for annotation loading
pub type AnnotationResult<T> = std::result::Result<T, AnnotationError>;
