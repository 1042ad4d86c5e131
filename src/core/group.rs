//! Multi-alignment group reader
//!
//! Aligners emit all alignments of one read on consecutive lines, each
//! carrying the read's `NH:i:` count. The reader takes the count from the
//! first record of a read and consumes exactly that many lines, so group
//! membership is positional and never depends on QNAME.

use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::io::LineIterator;
use crate::formats::sam::{self, AlignmentRecord};
use std::io::BufRead;
use std::str::Utf8Error;

const MAX_PREALLOCATED: usize = 256;

/// Alignment records of one read, in input order
///
/// `declared` is the read's `NH:i:` value at read time. It can exceed
/// `len()` when a member line could not be parsed: the slot was consumed
/// but its record is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentGroup {
    declared: usize,
    records: Vec<AlignmentRecord>,
    line_numbers: Vec<usize>,
}

impl AlignmentGroup {
    pub fn with_capacity(declared: usize) -> Self {
        // NH comes from the input; don't trust it for allocation
        let capacity = declared.min(MAX_PREALLOCATED);
        Self {
            declared,
            records: Vec::with_capacity(capacity),
            line_numbers: Vec::with_capacity(capacity),
        }
    }

    /// Group whose declared size equals the number of records given
    ///
    /// Line numbers are assigned consecutively from 1.
    pub fn from_records(records: Vec<AlignmentRecord>) -> Self {
        let declared = records.len();
        Self::with_declared(declared, records)
    }

    /// Group with an explicit declared size
    pub fn with_declared(declared: usize, records: Vec<AlignmentRecord>) -> Self {
        let line_numbers = (1..=records.len()).collect();
        Self {
            declared,
            records,
            line_numbers,
        }
    }

    pub fn push(&mut self, record: AlignmentRecord, line_number: usize) {
        self.records.push(record);
        self.line_numbers.push(line_number);
    }

    /// Number of alignments the read declared
    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn records(&self) -> &[AlignmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record of the group, against which gene membership is compared
    pub fn anchor(&self) -> Option<&AlignmentRecord> {
        self.records.first()
    }

    pub fn read_name(&self) -> Option<&str> {
        self.anchor().map(AlignmentRecord::read_name)
    }

    /// Input line number of the record at `index`
    pub fn line_of(&self, index: usize) -> usize {
        self.line_numbers[index]
    }

    /// Whether every declared slot produced a record
    pub fn is_complete(&self) -> bool {
        self.records.len() == self.declared
    }
}

/// Item yielded by [`GroupReader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Header line, passed on verbatim
    Header { line: usize, text: String },
    /// All alignments of one read
    Group(AlignmentGroup),
}

/// Streams a SAM text input as headers and whole alignment groups
pub struct GroupReader<R: BufRead> {
    lines: LineIterator<R>,
}

impl<R: BufRead> GroupReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineIterator::new(reader),
        }
    }

    /// 1-based number of the last line consumed
    pub fn line_number(&self) -> usize {
        self.lines.line_number()
    }

    /// Read the next header line or alignment group
    ///
    /// Empty and unparsable lines are reported and skipped. A record without
    /// `NH:i:` is reported and yielded as a group of one. Running out of
    /// input inside a group is fatal.
    pub fn next_item(
        &mut self,
        diagnostics: &mut Diagnostics,
    ) -> PipelineResult<Option<StreamItem>> {
        loop {
            let (line_number, text) = match self.lines.next_text() {
                Some(next) => next?,
                None => return Ok(None),
            };
            let line = match text {
                Ok(line) => line,
                Err(e) => {
                    diagnostics.report(not_utf8(line_number, e));
                    continue;
                }
            };

            if sam::is_header(line) {
                return Ok(Some(StreamItem::Header {
                    line: line_number,
                    text: line.to_string(),
                }));
            }

            let record = match AlignmentRecord::parse(line) {
                Ok(record) => record,
                Err(e) => {
                    diagnostics.report(Diagnostic::MalformedLine {
                        line: line_number,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let declared = match record.mapping_count() {
                // NH:i:0 is how unmapped reads are tagged
                Some(0) => 1,
                Some(count) => count,
                None => {
                    diagnostics.report(Diagnostic::MissingTag {
                        line: line_number,
                        tag: "NH",
                    });
                    1
                }
            };

            let mut group = AlignmentGroup::with_capacity(declared);
            group.push(record, line_number);
            self.fill_group(&mut group, diagnostics)?;
            return Ok(Some(StreamItem::Group(group)));
        }
    }

    fn fill_group(
        &mut self,
        group: &mut AlignmentGroup,
        diagnostics: &mut Diagnostics,
    ) -> PipelineResult<()> {
        let declared = group.declared();

        for consumed in 1..declared {
            let (line_number, text) = match self.lines.next_text() {
                Some(next) => next?,
                None => {
                    return Err(PipelineError::TruncatedGroup {
                        line: self.lines.line_number(),
                        read_name: group.read_name().unwrap_or_default().to_string(),
                        declared,
                        found: consumed,
                    })
                }
            };

            let line = match text {
                Ok(line) => line,
                Err(e) => {
                    diagnostics.report(not_utf8(line_number, e));
                    continue;
                }
            };

            match AlignmentRecord::parse(line) {
                Ok(member) => {
                    match member.mapping_count() {
                        Some(found) if found != declared => {
                            diagnostics.report(Diagnostic::MappingCountMismatch {
                                line: line_number,
                                declared,
                                found,
                            })
                        }
                        Some(_) => {}
                        None => diagnostics.report(Diagnostic::MissingTag {
                            line: line_number,
                            tag: "NH",
                        }),
                    }
                    group.push(member, line_number);
                }
                Err(e) => diagnostics.report(Diagnostic::MalformedLine {
                    line: line_number,
                    message: e.to_string(),
                }),
            }
        }

        Ok(())
    }
}

fn not_utf8(line: usize, error: Utf8Error) -> Diagnostic {
    Diagnostic::MalformedLine {
        line,
        message: format!("line is not valid UTF-8: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::DiagnosticKind;

    fn read_all(input: &str) -> (PipelineResult<Vec<StreamItem>>, Diagnostics) {
        let mut reader = GroupReader::new(input.as_bytes());
        let mut diagnostics = Diagnostics::new("test");
        let mut items = Vec::new();
        loop {
            match reader.next_item(&mut diagnostics) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => return (Ok(items), diagnostics),
                Err(e) => return (Err(e), diagnostics),
            }
        }
    }

    fn groups(items: &[StreamItem]) -> Vec<&AlignmentGroup> {
        items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Group(group) => Some(group),
                StreamItem::Header { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_groups_by_declared_count() {
        let input = "\
@HD\tVN:1.6
r1\t0\tT1\t1\t1\t4M\tNH:i:2\tHI:i:1
r1\t256\tT2\t1\t1\t4M\tNH:i:2\tHI:i:2
r2\t0\tT1\t9\t255\t4M\tNH:i:1\tHI:i:1
";
        let (items, diagnostics) = read_all(input);
        let items = items.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0],
            StreamItem::Header { line: 1, text: "@HD\tVN:1.6".to_string() }
        );
        let groups = groups(&items);
        assert_eq!(groups[0].declared(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].line_of(1), 3);
        assert_eq!(groups[1].declared(), 1);
        assert_eq!(groups[1].read_name(), Some("r2"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_membership_is_positional() {
        // Different read names still form one group when the count says so
        let input = "\
a\t0\tT1\t1\t1\t4M\tNH:i:2
b\t0\tT2\t1\t1\t4M\tNH:i:2
";
        let (items, _) = read_all(input);
        let items = items.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(groups(&items)[0].len(), 2);
    }

    #[test]
    fn test_truncated_group_is_fatal() {
        let input = "\
r1\t0\tT1\t1\t1\t4M\tNH:i:3
r1\t256\tT2\t1\t1\t4M\tNH:i:3
";
        let (items, _) = read_all(input);
        match items {
            Err(PipelineError::TruncatedGroup { line, read_name, declared, found }) => {
                assert_eq!(line, 2);
                assert_eq!(read_name, "r1");
                assert_eq!(declared, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected truncated group, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_tag_is_singleton() {
        let input = "\
r1\t0\tT1\t1\t255\t4M
r2\t0\tT1\t1\t255\t4M\tNH:i:1
";
        let (items, diagnostics) = read_all(input);
        let items = items.unwrap();
        assert_eq!(groups(&items).len(), 2);
        assert_eq!(groups(&items)[0].declared(), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::MissingTag), 1);
    }

    #[test]
    fn test_unmapped_zero_count_is_singleton() {
        let (items, diagnostics) = read_all("r1\t4\t*\t0\t0\t*\tNH:i:0\n");
        let items = items.unwrap();
        assert_eq!(groups(&items)[0].declared(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let input = "\
\n\
short\tline
r1\t0\tT1\t1\t255\t4M\tNH:i:1
";
        let (items, diagnostics) = read_all(input);
        let items = items.unwrap();
        assert_eq!(groups(&items).len(), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::MalformedLine), 2);
    }

    #[test]
    fn test_malformed_member_consumes_slot() {
        let input = "\
r1\t0\tT1\t1\t1\t4M\tNH:i:3
garbage
r1\t256\tT2\t1\t1\t4M\tNH:i:3
r2\t0\tT1\t1\t255\t4M\tNH:i:1
";
        let (items, diagnostics) = read_all(input);
        let items = items.unwrap();
        let groups = groups(&items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].declared(), 3);
        assert_eq!(groups[0].len(), 2);
        assert!(!groups[0].is_complete());
        assert_eq!(groups[1].read_name(), Some("r2"));
        assert_eq!(diagnostics.count(DiagnosticKind::MalformedLine), 1);
    }

    #[test]
    fn test_mapping_count_mismatch_reported() {
        let input = "\
r1\t0\tT1\t1\t1\t4M\tNH:i:2
r1\t256\tT2\t1\t1\t4M\tNH:i:5
";
        let (items, diagnostics) = read_all(input);
        assert_eq!(groups(&items.unwrap())[0].len(), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::MappingCountMismatch), 1);
    }

    #[test]
    fn test_member_without_count_reported() {
        let input = "\
r1\t0\tT1\t1\t1\t4M\tNH:i:2
r1\t256\tT2\t1\t1\t4M
";
        let (items, diagnostics) = read_all(input);
        assert_eq!(groups(&items.unwrap())[0].len(), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::MissingTag), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::MappingCountMismatch), 0);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let input: &[u8] = b"\
r1\t0\tT1\t1\t255\t4M\tNH:i:1
r\xff2\t0\tT1\t1\t255\t4M\tNH:i:1
r3\t0\tT1\t1\t255\t4M\tNH:i:1
r4\t0\tT1\t1\t1\t4M\tNH:i:2
r\xff4\t256\tT2\t1\t1\t4M\tNH:i:2
";
        let mut reader = GroupReader::new(input);
        let mut diagnostics = Diagnostics::new("test");
        let mut items = Vec::new();
        while let Some(item) = reader.next_item(&mut diagnostics).unwrap() {
            items.push(item);
        }

        let groups = groups(&items);
        let names: Vec<_> = groups.iter().map(|g| g.read_name()).collect();
        assert_eq!(names, vec![Some("r1"), Some("r3"), Some("r4")]);
        // The undecodable member still takes its slot
        assert_eq!(groups[2].declared(), 2);
        assert_eq!(groups[2].len(), 1);
        assert_eq!(reader.line_number(), 5);
        assert_eq!(diagnostics.count(DiagnosticKind::MalformedLine), 2);
    }
}
