//! Line formats
//!
//! Parsers for SAM alignment text and GTF annotation rows.

pub mod gtf;
pub mod sam;

pub use gtf::{FeatureKind, GtfParseError, GtfRecordView, Strand};
pub use sam::{AlignmentRecord, SamParseError};
