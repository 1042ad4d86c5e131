//! Group rewriter
//!
//! Writes the members a policy retained. Untouched groups are copied
//! byte-for-byte; shrunken groups get fresh `NH:i:`/`HI:i:` tags, a MAPQ
//! derived from the number of surviving alignments and, if needed, a newly
//! promoted primary alignment. Fields other than FLAG, MAPQ, `NH:i:` and
//! `HI:i:` are never modified.

use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::group::AlignmentGroup;
use crate::formats::sam::{
    self, AlignmentRecord, ALIGNMENT_INDEX_TAG, FLAG_SECONDARY, MAPPING_COUNT_TAG, MAX_MAPQ,
};
use std::fmt::{self, Write as _};
use std::io::{self, Write};

/// What happened to one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Nothing filtered; records written verbatim
    Unchanged,
    /// Nothing retained; no output
    Dropped,
    /// Some members removed; survivors renumbered
    Rewritten { retained: usize },
}

/// MAPQ for a read with `alignments` equally likely placements
///
/// `round(-10 * log10(1 - 1/n))`, or 255 for a unique placement.
///
/// # Examples
/// ```
/// use fast_txtools::core::mapping_quality;
/// assert_eq!(mapping_quality(1), 255);
/// assert_eq!(mapping_quality(2), 3);
/// assert_eq!(mapping_quality(3), 2);
/// ```
pub fn mapping_quality(alignments: usize) -> u8 {
    if alignments <= 1 {
        return MAX_MAPQ;
    }
    let n = alignments as f64;
    (-10.0 * (1.0 - 1.0 / n).log10()).round() as u8
}

/// Rewrites filtered groups, reusing one line buffer
#[derive(Debug, Default)]
pub struct GroupRewriter {
    line: String,
}

impl GroupRewriter {
    pub fn new() -> Self {
        Self {
            line: String::with_capacity(1024),
        }
    }

    /// Write the retained members of `group`
    ///
    /// `retained` holds indices into `group.records()` in input order.
    pub fn rewrite<W: Write>(
        &mut self,
        group: &AlignmentGroup,
        retained: &[usize],
        out: &mut W,
        diagnostics: &mut Diagnostics,
    ) -> io::Result<RewriteOutcome> {
        let declared = group.declared();
        let kept = retained.len();
        debug_assert!(kept <= declared);

        if kept == 0 {
            return Ok(RewriteOutcome::Dropped);
        }

        let records = group.records();

        if kept == declared {
            for &i in retained {
                out.write_all(records[i].as_line().as_bytes())?;
                out.write_all(b"\n")?;
            }
            return Ok(RewriteOutcome::Unchanged);
        }

        let promoted = choose_primary(group, retained, diagnostics);
        let mapq = mapping_quality(kept);

        for (position, &i) in retained.iter().enumerate() {
            self.render(&records[i], promoted == Some(i), mapq, kept, position + 1)
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "failed to format record"))?;
            out.write_all(self.line.as_bytes())?;
            out.write_all(b"\n")?;
        }

        log::debug!(
            "Read '{}': {} of {} alignments kept",
            group.read_name().unwrap_or_default(),
            kept,
            declared
        );
        Ok(RewriteOutcome::Rewritten { retained: kept })
    }

    fn render(
        &mut self,
        record: &AlignmentRecord,
        promote: bool,
        mapq: u8,
        count: usize,
        index: usize,
    ) -> fmt::Result {
        self.line.clear();
        for (column, field) in record.fields().enumerate() {
            if column > 0 {
                self.line.push('\t');
            }
            match column {
                sam::FLAG if promote => {
                    write!(self.line, "{}", record.flag() & !FLAG_SECONDARY)?
                }
                sam::MAPQ => write!(self.line, "{}", mapq)?,
                c if AlignmentRecord::is_tag_column(c) && field.starts_with(MAPPING_COUNT_TAG) => {
                    write!(self.line, "{}{}", MAPPING_COUNT_TAG, count)?
                }
                c if AlignmentRecord::is_tag_column(c) && field.starts_with(ALIGNMENT_INDEX_TAG) => {
                    write!(self.line, "{}{}", ALIGNMENT_INDEX_TAG, index)?
                }
                _ => self.line.push_str(field),
            }
        }
        Ok(())
    }
}

/// Index of the record to promote to primary, if any
///
/// No promotion when a survivor is already primary. Otherwise the first
/// survivor is promoted; alignment scores are not compared, so when the
/// candidates' CIGAR strings differ the choice is reported.
fn choose_primary(
    group: &AlignmentGroup,
    retained: &[usize],
    diagnostics: &mut Diagnostics,
) -> Option<usize> {
    let records = group.records();
    if retained.iter().any(|&i| records[i].is_primary()) {
        return None;
    }

    let first = *retained.first()?;
    let cigar = records[first].cigar();
    if retained.iter().any(|&i| records[i].cigar() != cigar) {
        diagnostics.report(Diagnostic::DivergentCigar {
            line: group.line_of(first),
            read_name: records[first].read_name().to_string(),
        });
    }
    Some(first)
}
