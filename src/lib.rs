//! FastTxTools - Streaming multi-alignment filters and transcript coordinates
//!
//! Rewrites SAM text streams group by group: all alignments of a
//! multi-mapped read are filtered together, and the survivors get
//! consistent `NH:i:`/`HI:i:` tags, MAPQ and primary flag. Also projects
//! GTF start/stop codons onto transcript coordinates.
//!
//! # Features
//!
//! - Three filter policies: forward strand, single gene, transcript whitelist
//! - Byte-identical pass-through of groups that lose no alignment
//! - Parallel processing of file pairs with rayon
//! - Support for compressed inputs (gzip, bzip2)
//!
//! # Example
//!
//! ```ignore
//! use fast_txtools::{rewrite_files, FilePair, FilterPolicy, PipelineConfig, TranscriptWhitelist};
//!
//! let whitelist = TranscriptWhitelist::from_file("keep.txt")?;
//! let policy = FilterPolicy::transcript_whitelist(&whitelist);
//! let pairs = vec![FilePair::new("in.sam", "out.sam")];
//! let reports = rewrite_files(&pairs, &policy, &PipelineConfig::default())?;
//! ```

pub mod core;
pub mod formats;

// Re-export commonly used types
pub use crate::core::{
    mapping_quality, project_file, project_reader, rewrite_file, rewrite_files, rewrite_stream,
    AlignmentGroup, AmbiguityMode, AnnotationError, Diagnostic, DiagnosticKind, Diagnostics,
    FastTxError, FilePair, FileReport, FilterPolicy, GeneAnnotationIndex, GroupFilter,
    PipelineConfig, PipelineError, ProjectedTranscript, RewriteStats, TranscriptWhitelist,
    UndefinedReason,
};
pub use crate::formats::{gtf, sam};
