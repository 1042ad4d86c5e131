//! Group filter policies
//!
//! A policy decides which members of an alignment group survive. It only
//! selects; renumbering the survivors is the rewriter's job, so every
//! policy shares the same rewrite path. New policies implement
//! [`GroupFilter`] and plug into the pipeline without touching the reader
//! or the rewriter.

use crate::core::annotation::{GeneAnnotationIndex, TranscriptWhitelist};
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::group::AlignmentGroup;
use crate::formats::sam;

/// Selection of group members
pub trait GroupFilter {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fill `retained` with the indices of the members to keep, in order
    fn retain(&self, group: &AlignmentGroup, retained: &mut Vec<usize>) -> PipelineResult<()>;

    /// Whether a header line is written to the output
    fn keep_header(&self, _header: &str, _line: usize, _diagnostics: &mut Diagnostics) -> bool {
        true
    }
}

/// Keeps alignments on the forward strand
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardStrand;

impl GroupFilter for ForwardStrand {
    fn name(&self) -> &'static str {
        "forward-strand"
    }

    fn retain(&self, group: &AlignmentGroup, retained: &mut Vec<usize>) -> PipelineResult<()> {
        retained.clear();
        retained.extend(
            group
                .records()
                .iter()
                .enumerate()
                .filter(|(_, record)| !record.is_reverse())
                .map(|(i, _)| i),
        );
        Ok(())
    }
}

/// What the gene-ambiguity policy does with a group spanning several genes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityMode {
    /// Drop the whole group
    #[default]
    AllOrNothing,
    /// Keep the members that share the first member's gene
    AnchorGene,
}

/// Removes reads whose alignments hit transcripts of different genes
#[derive(Debug, Clone, Copy)]
pub struct GeneAmbiguity<'a> {
    index: &'a GeneAnnotationIndex,
    mode: AmbiguityMode,
}

impl<'a> GeneAmbiguity<'a> {
    pub fn new(index: &'a GeneAnnotationIndex, mode: AmbiguityMode) -> Self {
        Self { index, mode }
    }

    fn gene_at(&self, group: &AlignmentGroup, i: usize) -> PipelineResult<&'a str> {
        let transcript_id = group.records()[i].reference_name();
        self.index
            .gene_of(transcript_id)
            .ok_or_else(|| PipelineError::UnknownTranscript {
                line: group.line_of(i),
                transcript_id: transcript_id.to_string(),
            })
    }
}

impl GroupFilter for GeneAmbiguity<'_> {
    fn name(&self) -> &'static str {
        "gene-ambiguity"
    }

    fn retain(&self, group: &AlignmentGroup, retained: &mut Vec<usize>) -> PipelineResult<()> {
        retained.clear();

        // A read with a single declared alignment cannot be ambiguous
        if group.declared() <= 1 {
            retained.extend(0..group.len());
            return Ok(());
        }
        if group.is_empty() {
            return Ok(());
        }

        // Every member is resolved, even after a mismatch, so that an
        // unknown transcript anywhere in the group is always fatal
        let anchor = self.gene_at(group, 0)?;
        let mut all_same = true;
        for i in 0..group.len() {
            if self.gene_at(group, i)? == anchor {
                retained.push(i);
            } else {
                all_same = false;
            }
        }

        if !all_same && self.mode == AmbiguityMode::AllOrNothing {
            retained.clear();
        }
        Ok(())
    }
}

/// Keeps alignments to whitelisted transcripts and their `@SQ` headers
#[derive(Debug, Clone, Copy)]
pub struct WhitelistSelection<'a> {
    whitelist: &'a TranscriptWhitelist,
}

impl<'a> WhitelistSelection<'a> {
    pub fn new(whitelist: &'a TranscriptWhitelist) -> Self {
        Self { whitelist }
    }
}

impl GroupFilter for WhitelistSelection<'_> {
    fn name(&self) -> &'static str {
        "transcript-whitelist"
    }

    fn retain(&self, group: &AlignmentGroup, retained: &mut Vec<usize>) -> PipelineResult<()> {
        retained.clear();
        retained.extend(
            group
                .records()
                .iter()
                .enumerate()
                .filter(|(_, record)| self.whitelist.contains(record.reference_name()))
                .map(|(i, _)| i),
        );
        Ok(())
    }

    fn keep_header(&self, header: &str, line: usize, diagnostics: &mut Diagnostics) -> bool {
        if !sam::is_sequence_header(header) {
            return true;
        }
        match sam::sequence_name(header) {
            Some(name) => self.whitelist.contains(name),
            None => {
                diagnostics.report(Diagnostic::MissingSequenceName { line });
                false
            }
        }
    }
}

/// The closed set of policies offered by the command line
#[derive(Debug, Clone, Copy)]
pub enum FilterPolicy<'a> {
    ForwardStrand(ForwardStrand),
    GeneAmbiguity(GeneAmbiguity<'a>),
    TranscriptWhitelist(WhitelistSelection<'a>),
}

impl<'a> FilterPolicy<'a> {
    pub fn forward_strand() -> Self {
        FilterPolicy::ForwardStrand(ForwardStrand)
    }

    pub fn gene_ambiguity(index: &'a GeneAnnotationIndex, mode: AmbiguityMode) -> Self {
        FilterPolicy::GeneAmbiguity(GeneAmbiguity::new(index, mode))
    }

    pub fn transcript_whitelist(whitelist: &'a TranscriptWhitelist) -> Self {
        FilterPolicy::TranscriptWhitelist(WhitelistSelection::new(whitelist))
    }
}

impl GroupFilter for FilterPolicy<'_> {
    fn name(&self) -> &'static str {
        match self {
            FilterPolicy::ForwardStrand(p) => p.name(),
            FilterPolicy::GeneAmbiguity(p) => p.name(),
            FilterPolicy::TranscriptWhitelist(p) => p.name(),
        }
    }

    fn retain(&self, group: &AlignmentGroup, retained: &mut Vec<usize>) -> PipelineResult<()> {
        match self {
            FilterPolicy::ForwardStrand(p) => p.retain(group, retained),
            FilterPolicy::GeneAmbiguity(p) => p.retain(group, retained),
            FilterPolicy::TranscriptWhitelist(p) => p.retain(group, retained),
        }
    }

    fn keep_header(&self, header: &str, line: usize, diagnostics: &mut Diagnostics) -> bool {
        match self {
            FilterPolicy::ForwardStrand(p) => p.keep_header(header, line, diagnostics),
            FilterPolicy::GeneAmbiguity(p) => p.keep_header(header, line, diagnostics),
            FilterPolicy::TranscriptWhitelist(p) => p.keep_header(header, line, diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::DiagnosticKind;
    use crate::formats::sam::AlignmentRecord;

    fn group(lines: &[&str]) -> AlignmentGroup {
        AlignmentGroup::from_records(
            lines
                .iter()
                .map(|l| AlignmentRecord::parse(*l).unwrap())
                .collect(),
        )
    }

    fn retained_by(filter: &impl GroupFilter, group: &AlignmentGroup) -> Vec<usize> {
        let mut retained = Vec::new();
        filter.retain(group, &mut retained).unwrap();
        retained
    }

    fn three_hits() -> AlignmentGroup {
        group(&[
            "r\t0\tT1\t1\t1\t4M\tNH:i:3\tHI:i:1",
            "r\t272\tT2\t1\t1\t4M\tNH:i:3\tHI:i:2",
            "r\t256\tT3\t1\t1\t4M\tNH:i:3\tHI:i:3",
        ])
    }

    #[test]
    fn test_forward_strand() {
        assert_eq!(retained_by(&ForwardStrand, &three_hits()), vec![0, 2]);
    }

    #[test]
    fn test_gene_ambiguity_all_or_nothing() {
        let index: GeneAnnotationIndex =
            [("T1", "G1"), ("T2", "G1"), ("T3", "G2")].into_iter().collect();
        let policy = GeneAmbiguity::new(&index, AmbiguityMode::AllOrNothing);
        assert!(retained_by(&policy, &three_hits()).is_empty());

        let same: GeneAnnotationIndex =
            [("T1", "G1"), ("T2", "G1"), ("T3", "G1")].into_iter().collect();
        let policy = GeneAmbiguity::new(&same, AmbiguityMode::AllOrNothing);
        assert_eq!(retained_by(&policy, &three_hits()), vec![0, 1, 2]);
    }

    #[test]
    fn test_gene_ambiguity_anchor_gene() {
        let index: GeneAnnotationIndex =
            [("T1", "G1"), ("T2", "G2"), ("T3", "G1")].into_iter().collect();
        let policy = GeneAmbiguity::new(&index, AmbiguityMode::AnchorGene);
        assert_eq!(retained_by(&policy, &three_hits()), vec![0, 2]);
    }

    #[test]
    fn test_gene_ambiguity_unknown_transcript() {
        let index: GeneAnnotationIndex = [("T1", "G1"), ("T3", "G1")].into_iter().collect();
        let policy = GeneAmbiguity::new(&index, AmbiguityMode::AllOrNothing);
        let mut retained = Vec::new();
        let result = policy.retain(&three_hits(), &mut retained);
        assert!(matches!(
            result,
            Err(PipelineError::UnknownTranscript { line: 2, ref transcript_id }) if transcript_id == "T2"
        ));
    }

    #[test]
    fn test_gene_ambiguity_singleton_skips_lookup() {
        let index = GeneAnnotationIndex::default();
        let policy = GeneAmbiguity::new(&index, AmbiguityMode::AllOrNothing);
        let single = group(&["r\t0\t*\t0\t0\t*\tNH:i:1"]);
        assert_eq!(retained_by(&policy, &single), vec![0]);
    }

    #[test]
    fn test_whitelist_records_and_headers() {
        let whitelist: TranscriptWhitelist = ["T1", "T3"].into_iter().collect();
        let policy = WhitelistSelection::new(&whitelist);
        assert_eq!(retained_by(&policy, &three_hits()), vec![0, 2]);

        let mut diagnostics = Diagnostics::new("test");
        assert!(policy.keep_header("@HD\tVN:1.6", 1, &mut diagnostics));
        assert!(policy.keep_header("@SQ\tSN:T1\tLN:10", 2, &mut diagnostics));
        assert!(!policy.keep_header("@SQ\tSN:T2\tLN:10", 3, &mut diagnostics));
        assert!(!policy.keep_header("@SQ\tLN:10", 4, &mut diagnostics));
        assert_eq!(diagnostics.count(DiagnosticKind::MissingSequenceName), 1);
    }

    #[test]
    fn test_policy_enum_dispatch() {
        let whitelist: TranscriptWhitelist = ["T2"].into_iter().collect();
        let policy = FilterPolicy::transcript_whitelist(&whitelist);
        assert_eq!(policy.name(), "transcript-whitelist");
        assert_eq!(retained_by(&policy, &three_hits()), vec![1]);

        let policy = FilterPolicy::forward_strand();
        let mut diagnostics = Diagnostics::new("test");
        assert!(policy.keep_header("@SQ\tSN:T9\tLN:10", 1, &mut diagnostics));
    }
}
