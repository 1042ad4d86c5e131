//! Core alignment-group and transcript-projection engine
//!
//! This module contains the group reader, the filter policies, the group
//! rewriter and the transcript coordinate projector, along with the lookup
//! tables, error types and diagnostics they share.

pub mod annotation;
pub mod diagnostics;
mod error;
pub mod group;
pub mod io;
pub mod pipeline;
pub mod policy;
pub mod projector;
pub mod rewrite;

pub use annotation::{GeneAnnotationIndex, TranscriptWhitelist};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, DEFAULT_RETAINED_DIAGNOSTICS};
pub use error::{
    AnnotationError, AnnotationResult, FastTxError, PipelineError, PipelineResult, Result,
};
pub use group::{AlignmentGroup, GroupReader, StreamItem};
pub use io::{
    create_writer, create_writer_or_stdout, detect_compression, CompressionFormat, LineIterator,
    SmartReader, DEFAULT_BUFFER_SIZE, LARGE_BUFFER_SIZE, MMAP_THRESHOLD,
};
pub use pipeline::{
    rewrite_file, rewrite_files, rewrite_stream, FilePair, FileReport, PipelineConfig,
    RewriteStats,
};
pub use policy::{
    AmbiguityMode, FilterPolicy, ForwardStrand, GeneAmbiguity, GroupFilter, WhitelistSelection,
};
pub use projector::{
    project_file, project_reader, write_projection, CodonPositions, ProjectedTranscript,
    ProjectionStats, Transcript, TranscriptProjector, UndefinedReason,
};
pub use rewrite::{mapping_quality, GroupRewriter, RewriteOutcome};
