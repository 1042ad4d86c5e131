//! Transcript coordinate projector
//!
//! Collects exon, start_codon and stop_codon rows of a GTF stream per
//! transcript and projects the codon positions onto the transcript's
//! spliced sequence (1-based, counted along the concatenated exons).
//!
//! Rows of one transcript are expected to be contiguous. A transcript is
//! finalized as soon as a row with another transcript_id arrives, or at the
//! end of the input.
//!
//! Reverse-strand transcripts are stored with negated coordinates: an
//! interval `[from, to]` becomes `[-to, -from]`, so ascending order always
//! follows the direction of transcription and one algorithm serves both
//! strands.

use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::{PipelineError, Result};
use crate::core::io::{create_writer_or_stdout, LineIterator, SmartReader};
use crate::formats::gtf::{self, FeatureKind, GtfRecordView, Strand};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Why a transcript has no projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedReason {
    /// An exon row with start > end
    UnorderedInterval,
    /// Two exon rows starting at the same position
    DuplicateExonStart,
    MissingStartCodon,
    MissingStopCodon,
    /// Start codon lies after the stop codon
    CodonOrder,
    NoExons,
    OverlappingExons,
    StartCodonOutsideExons,
    StopCodonOutsideExons,
    /// Rows of the transcript are not contiguous in the input
    Interleaved,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UndefinedReason::UnorderedInterval => "exon with unordered start-stop positions",
            UndefinedReason::DuplicateExonStart => "two exons start at the same position",
            UndefinedReason::MissingStartCodon => "no start_codon defined",
            UndefinedReason::MissingStopCodon => "no stop_codon defined",
            UndefinedReason::CodonOrder => "start and stop codons have the wrong order",
            UndefinedReason::NoExons => "no exon defined",
            UndefinedReason::OverlappingExons => "overlapping exons",
            UndefinedReason::StartCodonOutsideExons => "start_codon outside exons",
            UndefinedReason::StopCodonOutsideExons => "stop_codon outside exons",
            UndefinedReason::Interleaved => "rows are not contiguous in the input",
        };
        f.write_str(text)
    }
}

/// Codon positions in transcript coordinates (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodonPositions {
    pub start: u64,
    pub stop: u64,
}

/// Exons and codon boundaries of one transcript
#[derive(Debug, Clone)]
pub struct Transcript {
    id: String,
    strand: Strand,
    /// Oriented exon start -> oriented exon end
    exons: BTreeMap<i64, i64>,
    start_codon: Option<i64>,
    stop_codon: Option<i64>,
    error: Option<UndefinedReason>,
}

impl Transcript {
    pub fn new(id: impl Into<String>, strand: Strand) -> Self {
        Self {
            id: id.into(),
            strand,
            exons: BTreeMap::new(),
            start_codon: None,
            stop_codon: None,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// `[from, to]` in transcription order
    fn orient(&self, from: u64, to: u64) -> (i64, i64) {
        let (from, to) = (from as i64, to as i64);
        match self.strand {
            Strand::Plus => (from, to),
            Strand::Minus => (-to, -from),
        }
    }

    fn fail(&mut self, reason: UndefinedReason) {
        if self.error.is_none() {
            log::debug!("Transcript '{}': {}", self.id, reason);
            self.error = Some(reason);
        }
    }

    /// Add an exon `[from, to]` in genomic coordinates
    ///
    /// Only a repeated start is caught here; other overlaps are found when
    /// the transcript is resolved.
    pub fn add_exon(&mut self, from: u64, to: u64) {
        if from > to {
            self.fail(UndefinedReason::UnorderedInterval);
            return;
        }
        let (start, end) = self.orient(from, to);
        match self.exons.entry(start) {
            Entry::Occupied(_) => self.fail(UndefinedReason::DuplicateExonStart),
            Entry::Vacant(slot) => {
                slot.insert(end);
            }
        }
    }

    /// Record one start_codon fragment; the leading boundary is kept
    pub fn update_start_codon(&mut self, from: u64, to: u64) {
        let (lower, _) = self.orient(from, to);
        self.start_codon = Some(self.start_codon.map_or(lower, |c| c.min(lower)));
    }

    /// Record one stop_codon fragment; the leading boundary is kept
    pub fn update_stop_codon(&mut self, from: u64, to: u64) {
        let (lower, _) = self.orient(from, to);
        self.stop_codon = Some(self.stop_codon.map_or(lower, |c| c.min(lower)));
    }

    /// Validate the exon structure and project both codons
    pub fn resolve(&self) -> std::result::Result<CodonPositions, UndefinedReason> {
        if let Some(reason) = self.error {
            return Err(reason);
        }
        let start_codon = self.start_codon.ok_or(UndefinedReason::MissingStartCodon)?;
        let stop_codon = self.stop_codon.ok_or(UndefinedReason::MissingStopCodon)?;
        if start_codon > stop_codon {
            return Err(UndefinedReason::CodonOrder);
        }
        if self.exons.is_empty() {
            return Err(UndefinedReason::NoExons);
        }

        let mut previous_end: Option<i64> = None;
        for (&start, &end) in &self.exons {
            if previous_end.is_some_and(|previous| previous >= start) {
                return Err(UndefinedReason::OverlappingExons);
            }
            previous_end = Some(end);
        }

        let mut exons = self.exons.iter().map(|(&start, &end)| (start, end));
        let mut offset: i64 = 0;

        // Exons before the one holding the start codon
        let (first_start, first_end) = loop {
            let Some((start, end)) = exons.next() else {
                return Err(UndefinedReason::StartCodonOutsideExons);
            };
            if start_codon < start {
                return Err(UndefinedReason::StartCodonOutsideExons);
            }
            if start_codon <= end {
                break (start, end);
            }
            offset += end - start + 1;
        };
        let start_position = offset + start_codon - first_start + 1;

        // The stop codon search resumes at the start codon's exon
        let mut exon = Some((first_start, first_end));
        while let Some((start, end)) = exon {
            if stop_codon < start {
                return Err(UndefinedReason::StopCodonOutsideExons);
            }
            if stop_codon <= end {
                return Ok(CodonPositions {
                    start: start_position as u64,
                    stop: (offset + stop_codon - start + 1) as u64,
                });
            }
            offset += end - start + 1;
            exon = exons.next();
        }
        Err(UndefinedReason::StopCodonOutsideExons)
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedTranscript {
    pub transcript_id: String,
    pub start: u64,
    pub stop: u64,
}

/// Projection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    /// Non-comment input rows
    pub rows: usize,
    /// exon / start_codon / stop_codon rows used
    pub feature_rows: usize,
    pub transcripts: usize,
    pub resolved: usize,
    pub undefined: usize,
}

/// Streaming accumulator over GTF rows
#[derive(Debug, Default)]
pub struct TranscriptProjector {
    current: Option<Transcript>,
    results: BTreeMap<String, std::result::Result<CodonPositions, UndefinedReason>>,
    stats: ProjectionStats,
}

impl TranscriptProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw GTF line
    ///
    /// Blank and comment lines are ignored. Unparsable rows and relevant
    /// rows without a strand or transcript_id are reported and skipped.
    pub fn push_line(&mut self, line_number: usize, line: &str, diagnostics: &mut Diagnostics) {
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        self.stats.rows += 1;

        // Only exon and codon rows are parsed in full
        if gtf::column(line, gtf::FEATURE_COLUMN)
            .is_some_and(|feature| FeatureKind::from_feature(feature) == FeatureKind::Other)
        {
            return;
        }

        let view = match GtfRecordView::parse(line) {
            Ok(view) => view,
            Err(e) => {
                diagnostics.report(Diagnostic::MalformedLine {
                    line: line_number,
                    message: e.to_string(),
                });
                return;
            }
        };
        self.push(line_number, &view, diagnostics);
    }

    /// Feed one parsed GTF row
    pub fn push(&mut self, line_number: usize, view: &GtfRecordView<'_>, diagnostics: &mut Diagnostics) {
        let kind = view.kind();
        if kind == FeatureKind::Other {
            return;
        }

        let Some(strand) = view.strand else {
            diagnostics.report(Diagnostic::MalformedLine {
                line: line_number,
                message: format!("unsupported strand for {} row", view.feature),
            });
            return;
        };
        let transcript_id = match view.transcript_id() {
            Some(id) if !id.is_empty() => id,
            _ => {
                diagnostics.report(Diagnostic::MalformedLine {
                    line: line_number,
                    message: "missing transcript_id attribute".to_string(),
                });
                return;
            }
        };

        let same = self.current.as_ref().is_some_and(|t| t.id() == transcript_id);
        if !same {
            self.finalize(diagnostics);
            self.current = Some(Transcript::new(transcript_id, strand));
            self.stats.transcripts += 1;
        }
        let Some(transcript) = self.current.as_mut() else {
            return;
        };
        if transcript.strand() != strand {
            diagnostics.report(Diagnostic::StrandConflict {
                line: line_number,
                transcript_id: transcript_id.to_string(),
            });
            return;
        }

        self.stats.feature_rows += 1;
        match kind {
            FeatureKind::Exon => transcript.add_exon(view.start, view.end),
            FeatureKind::StartCodon => transcript.update_start_codon(view.start, view.end),
            FeatureKind::StopCodon => transcript.update_stop_codon(view.start, view.end),
            FeatureKind::Other => {}
        }
    }

    fn finalize(&mut self, diagnostics: &mut Diagnostics) {
        let Some(transcript) = self.current.take() else {
            return;
        };
        let outcome = transcript.resolve();

        match self.results.entry(transcript.id) {
            Entry::Vacant(slot) => {
                if let Err(reason) = outcome {
                    diagnostics.report(Diagnostic::UndefinedTranscript {
                        transcript_id: slot.key().clone(),
                        reason,
                    });
                }
                slot.insert(outcome);
            }
            Entry::Occupied(mut slot) => {
                // Only reported once, however many fragments follow
                if slot.get().is_ok() {
                    diagnostics.report(Diagnostic::UndefinedTranscript {
                        transcript_id: slot.key().clone(),
                        reason: UndefinedReason::Interleaved,
                    });
                }
                slot.insert(Err(UndefinedReason::Interleaved));
            }
        }
    }

    /// Finalize the last transcript and return resolved rows sorted by id
    pub fn finish(mut self, diagnostics: &mut Diagnostics) -> (Vec<ProjectedTranscript>, ProjectionStats) {
        self.finalize(diagnostics);

        let mut stats = self.stats;
        let mut rows = Vec::with_capacity(self.results.len());
        for (transcript_id, outcome) in self.results {
            match outcome {
                Ok(CodonPositions { start, stop }) => rows.push(ProjectedTranscript {
                    transcript_id,
                    start,
                    stop,
                }),
                Err(_) => stats.undefined += 1,
            }
        }
        stats.resolved = rows.len();
        (rows, stats)
    }
}

/// Project every transcript of a GTF stream
pub fn project_reader<R: BufRead>(
    reader: R,
    diagnostics: &mut Diagnostics,
) -> io::Result<(Vec<ProjectedTranscript>, ProjectionStats)> {
    let mut lines = LineIterator::new(reader);
    let mut projector = TranscriptProjector::new();

    while let Some(next) = lines.next_text() {
        let (line_number, text) = next?;
        match text {
            Ok(line) => projector.push_line(line_number, line, diagnostics),
            Err(e) => diagnostics.report(Diagnostic::MalformedLine {
                line: line_number,
                message: format!("line is not valid UTF-8: {}", e),
            }),
        }
    }

    Ok(projector.finish(diagnostics))
}

/// Write `transcript_id<TAB>start<TAB>stop` rows
pub fn write_projection<W: Write>(rows: &[ProjectedTranscript], out: &mut W) -> io::Result<()> {
    for row in rows {
        writeln!(out, "{}\t{}\t{}", row.transcript_id, row.start, row.stop)?;
    }
    Ok(())
}

/// Project a (possibly compressed) GTF file to `output`, or stdout
pub fn project_file(
    input: &Path,
    output: Option<&Path>,
    retained_diagnostics: usize,
) -> Result<(ProjectionStats, Diagnostics)> {
    if !input.exists() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()).into());
    }
    let mut diagnostics = Diagnostics::with_limit(input.display().to_string(), retained_diagnostics);

    let reader = SmartReader::open(input)?;
    let (rows, stats) = project_reader(reader, &mut diagnostics)?;

    let mut out = create_writer_or_stdout(output)?;
    write_projection(&rows, &mut out)?;
    out.flush()?;

    log::info!(
        "{}: {} transcripts, {} resolved, {} undefined",
        input.display(),
        stats.transcripts,
        stats.resolved,
        stats.undefined
    );
    Ok((stats, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::DiagnosticKind;

    fn row(feature: &str, start: u64, end: u64, strand: char, id: &str) -> String {
        format!(
            "chr1\ttest\t{}\t{}\t{}\t.\t{}\t.\tgene_id \"G\"; transcript_id \"{}\";",
            feature, start, end, strand, id
        )
    }

    fn project(rows: &[String]) -> (Vec<ProjectedTranscript>, ProjectionStats, Diagnostics) {
        let input = rows.join("\n");
        let mut diagnostics = Diagnostics::new("test");
        let (out, stats) = project_reader(input.as_bytes(), &mut diagnostics).unwrap();
        (out, stats, diagnostics)
    }

    fn positions(t: &Transcript) -> Option<(u64, u64)> {
        t.resolve().ok().map(|p| (p.start, p.stop))
    }

    #[test]
    fn test_single_exon() {
        let mut t = Transcript::new("T1", Strand::Plus);
        t.add_exon(100, 200);
        t.update_start_codon(100, 102);
        t.update_stop_codon(198, 200);
        assert_eq!(positions(&t), Some((1, 99)));
    }

    #[test]
    fn test_two_exons() {
        let mut t = Transcript::new("T1", Strand::Plus);
        t.add_exon(160, 200);
        t.add_exon(100, 150);
        t.update_start_codon(100, 102);
        t.update_stop_codon(190, 192);
        assert_eq!(positions(&t), Some((1, 82)));
    }

    #[test]
    fn test_reverse_strand() {
        let mut t = Transcript::new("T1", Strand::Minus);
        t.add_exon(100, 150);
        t.add_exon(160, 200);
        t.update_start_codon(198, 200);
        t.update_stop_codon(100, 102);
        assert_eq!(positions(&t), Some((1, 90)));
    }

    #[test]
    fn test_split_start_codon_keeps_leading_boundary() {
        let mut t = Transcript::new("T1", Strand::Plus);
        t.add_exon(100, 149);
        t.add_exon(160, 200);
        t.update_start_codon(160, 160);
        t.update_start_codon(148, 149);
        t.update_stop_codon(190, 192);
        assert_eq!(positions(&t), Some((49, 81)));
    }

    #[test]
    fn test_undefined_reasons() {
        let mut t = Transcript::new("T1", Strand::Plus);
        t.add_exon(100, 150);
        t.add_exon(140, 200);
        t.update_start_codon(100, 102);
        t.update_stop_codon(190, 192);
        assert_eq!(t.resolve(), Err(UndefinedReason::OverlappingExons));

        let mut t = Transcript::new("T2", Strand::Plus);
        t.add_exon(100, 150);
        t.add_exon(100, 120);
        assert_eq!(t.resolve(), Err(UndefinedReason::DuplicateExonStart));

        let mut t = Transcript::new("T3", Strand::Plus);
        t.add_exon(200, 100);
        assert_eq!(t.resolve(), Err(UndefinedReason::UnorderedInterval));

        let mut t = Transcript::new("T4", Strand::Plus);
        t.add_exon(100, 200);
        t.update_stop_codon(190, 192);
        assert_eq!(t.resolve(), Err(UndefinedReason::MissingStartCodon));

        let mut t = Transcript::new("T5", Strand::Plus);
        t.add_exon(100, 200);
        t.update_start_codon(150, 152);
        t.update_stop_codon(110, 112);
        assert_eq!(t.resolve(), Err(UndefinedReason::CodonOrder));

        let mut t = Transcript::new("T6", Strand::Plus);
        t.update_start_codon(150, 152);
        t.update_stop_codon(160, 162);
        assert_eq!(t.resolve(), Err(UndefinedReason::NoExons));
    }

    #[test]
    fn test_codons_outside_exons() {
        let mut t = Transcript::new("T1", Strand::Plus);
        t.add_exon(100, 150);
        t.add_exon(160, 200);
        t.update_start_codon(155, 157);
        t.update_stop_codon(190, 192);
        assert_eq!(t.resolve(), Err(UndefinedReason::StartCodonOutsideExons));

        let mut t = Transcript::new("T2", Strand::Plus);
        t.add_exon(100, 150);
        t.update_start_codon(100, 102);
        t.update_stop_codon(300, 302);
        assert_eq!(t.resolve(), Err(UndefinedReason::StopCodonOutsideExons));
    }

    #[test]
    fn test_projector_sorts_and_excludes_undefined() {
        let rows = vec![
            "#!genome-build test".to_string(),
            row("exon", 100, 200, '+', "TB"),
            row("start_codon", 100, 102, '+', "TB"),
            row("stop_codon", 198, 200, '+', "TB"),
            row("gene", 1, 1000, '+', "TB"),
            row("exon", 100, 150, '+', "TC"),
            row("exon", 140, 200, '+', "TC"),
            row("start_codon", 100, 102, '+', "TC"),
            row("stop_codon", 190, 192, '+', "TC"),
            row("exon", 100, 150, '+', "TA"),
            row("exon", 160, 200, '+', "TA"),
            row("start_codon", 100, 102, '+', "TA"),
            row("stop_codon", 190, 192, '+', "TA"),
        ];
        let (out, stats, diagnostics) = project(&rows);

        assert_eq!(
            out,
            vec![
                ProjectedTranscript { transcript_id: "TA".into(), start: 1, stop: 82 },
                ProjectedTranscript { transcript_id: "TB".into(), start: 1, stop: 99 },
            ]
        );
        assert_eq!(stats.transcripts, 3);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.undefined, 1);
        assert_eq!(diagnostics.count(DiagnosticKind::UndefinedTranscript), 1);
    }

    #[test]
    fn test_strand_conflict_row_ignored() {
        let rows = vec![
            row("exon", 100, 200, '+', "T1"),
            row("exon", 300, 400, '-', "T1"),
            row("start_codon", 100, 102, '+', "T1"),
            row("stop_codon", 198, 200, '+', "T1"),
        ];
        let (out, _, diagnostics) = project(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].stop), (1, 99));
        assert_eq!(diagnostics.count(DiagnosticKind::StrandConflict), 1);
    }

    #[test]
    fn test_interleaved_transcript_is_undefined() {
        let rows = vec![
            row("exon", 100, 200, '+', "T1"),
            row("start_codon", 100, 102, '+', "T1"),
            row("stop_codon", 198, 200, '+', "T1"),
            row("exon", 100, 200, '+', "T2"),
            row("start_codon", 100, 102, '+', "T2"),
            row("stop_codon", 198, 200, '+', "T2"),
            row("exon", 300, 400, '+', "T1"),
        ];
        let (out, stats, diagnostics) = project(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].transcript_id, "T2");
        assert_eq!(stats.undefined, 1);
        assert_eq!(diagnostics.count(DiagnosticKind::UndefinedTranscript), 1);
    }

    #[test]
    fn test_bad_rows_are_reported() {
        let rows = vec![
            "chr1\ttest\texon\t100".to_string(),
            "chr1\ttest\texon\t100\t200\t.\t.\t.\ttranscript_id \"T1\";".to_string(),
            "chr1\ttest\texon\t100\t200\t.\t+\t.\tgene_id \"G\";".to_string(),
        ];
        let (out, _, diagnostics) = project(&rows);
        assert!(out.is_empty());
        assert_eq!(diagnostics.count(DiagnosticKind::MalformedLine), 3);
    }

    #[test]
    fn test_unused_feature_rows_are_not_validated() {
        let rows = vec![
            "chr1\ttest\tgene\t100\t200\t.\t?\t.\tgene_id \"G\";".to_string(),
            "chr1\ttest\tCDS\tx\ty".to_string(),
            "chr1\ttest\texon\t100\t200\t.\t+\t.\tgene_id \"G\"; transcript_id \"T1\";".to_string(),
            "chr1\ttest\tstart_codon\t100\t102\t.\t+\t.\tgene_id \"G\"; transcript_id \"T1\";".to_string(),
            "chr1\ttest\tstop_codon\t198\t200\t.\t+\t.\tgene_id \"G\"; transcript_id \"T1\";".to_string(),
        ];
        let (out, _, diagnostics) = project(&rows);
        assert_eq!(out.len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_write_projection() {
        let rows = vec![ProjectedTranscript { transcript_id: "T1".into(), start: 1, stop: 82 }];
        let mut out = Vec::new();
        write_projection(&rows, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "T1\t1\t82\n");
    }
}
