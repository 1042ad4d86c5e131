//! GTF annotation row view
//!
//! GTF rows carry nine tab-separated fields:
//! seqname, source, feature, start, end, score, strand, frame, attributes.
//! Coordinates are 1-based, closed interval [start, end].

use memchr::memchr_iter;

/// Number of fields in a GTF row
pub const GTF_FIELDS: usize = 9;

/// GTF parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GtfParseError {
    EmptyLine,
    TooFewFields { expected: usize, found: usize },
    InvalidNumber(&'static str, String),
    InvalidStrand(String),
}

impl std::fmt::Display for GtfParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GtfParseError::EmptyLine => write!(f, "Empty line"),
            GtfParseError::TooFewFields { expected, found } => {
                write!(f, "Too few fields: expected {}, found {}", expected, found)
            }
            GtfParseError::InvalidNumber(field, value) => {
                write!(f, "Invalid number in field {}: {}", field, value)
            }
            GtfParseError::InvalidStrand(s) => write!(f, "Invalid strand: {}", s),
        }
    }
}

impl std::error::Error for GtfParseError {}

/// Strand of an annotated feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    /// Parse strand from char
    ///
    /// # Examples
    /// ```
    /// use fast_txtools::formats::gtf::Strand;
    /// assert_eq!(Strand::from_char('+'), Some(Strand::Plus));
    /// assert_eq!(Strand::from_char('-'), Some(Strand::Minus));
    /// assert_eq!(Strand::from_char('.'), None);
    /// ```
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }
}

/// Feature types the projector cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Exon,
    StartCodon,
    StopCodon,
    Other,
}

impl FeatureKind {
    pub fn from_feature(feature: &str) -> Self {
        match feature {
            "exon" => FeatureKind::Exon,
            "start_codon" => FeatureKind::StartCodon,
            "stop_codon" => FeatureKind::StopCodon,
            _ => FeatureKind::Other,
        }
    }
}

/// Borrowed view over one GTF row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtfRecordView<'a> {
    pub seqname: &'a str,
    pub source: &'a str,
    pub feature: &'a str,
    /// Start position (1-based)
    pub start: u64,
    /// End position (1-based, inclusive)
    pub end: u64,
    pub score: &'a str,
    /// `None` for unstranded (`.`) features
    pub strand: Option<Strand>,
    pub frame: &'a str,
    pub attributes: &'a str,
}

impl<'a> GtfRecordView<'a> {
    /// Parse a GTF row
    pub fn parse(line: &'a str) -> Result<Self, GtfParseError> {
        if line.is_empty() {
            return Err(GtfParseError::EmptyLine);
        }

        let mut field_bounds = Vec::with_capacity(GTF_FIELDS);
        let mut start_pos = 0;
        for tab in memchr_iter(b'\t', line.as_bytes()) {
            field_bounds.push((start_pos, tab));
            start_pos = tab + 1;
        }
        field_bounds.push((start_pos, line.len()));

        if field_bounds.len() < GTF_FIELDS {
            return Err(GtfParseError::TooFewFields {
                expected: GTF_FIELDS,
                found: field_bounds.len(),
            });
        }

        let field = move |idx: usize| -> &'a str {
            let (start, end) = field_bounds[idx];
            &line[start..end]
        };

        let start_str = field(3);
        let start: u64 = start_str
            .parse()
            .map_err(|_| GtfParseError::InvalidNumber("start", start_str.to_string()))?;

        let end_str = field(4);
        let end: u64 = end_str
            .parse()
            .map_err(|_| GtfParseError::InvalidNumber("end", end_str.to_string()))?;

        let strand_str = field(6);
        let strand = match strand_str {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." => None,
            _ => return Err(GtfParseError::InvalidStrand(strand_str.to_string())),
        };

        Ok(Self {
            seqname: field(0),
            source: field(1),
            feature: field(2),
            start,
            end,
            score: field(5),
            strand,
            frame: field(7),
            attributes: field(8),
        })
    }

    pub fn kind(&self) -> FeatureKind {
        FeatureKind::from_feature(self.feature)
    }

    /// Value of a GTF attribute, e.g. `transcript_id "ENST1";` -> `ENST1`
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        attribute(self.attributes, key)
    }

    pub fn transcript_id(&self) -> Option<&'a str> {
        self.attribute("transcript_id")
    }

    pub fn gene_id(&self) -> Option<&'a str> {
        self.attribute("gene_id")
    }
}

/// Index of the feature column
pub const FEATURE_COLUMN: usize = 2;
/// Index of the attribute column
pub const ATTRIBUTE_COLUMN: usize = 8;

/// Raw text of one tab-separated column, without validating the others
pub fn column(line: &str, idx: usize) -> Option<&str> {
    let mut start = 0;
    let mut n = 0;
    for tab in memchr_iter(b'\t', line.as_bytes()) {
        if n == idx {
            return Some(&line[start..tab]);
        }
        n += 1;
        start = tab + 1;
    }
    (n == idx).then(|| &line[start..])
}

/// Look up `key` in a GTF attribute column
///
/// Attributes are `key "value";` pairs separated by semicolons. Unquoted
/// values are accepted as well. Returns `None` if the key is absent or its
/// value is not terminated by a closing quote.
pub fn attribute<'a>(attributes: &'a str, key: &str) -> Option<&'a str> {
    for pair in attributes.split(';') {
        let pair = pair.trim();
        let Some((name, value)) = pair.split_once(char::is_whitespace) else {
            continue;
        };
        if name != key {
            continue;
        }
        let value = value.trim();
        return match value.strip_prefix('"') {
            Some(quoted) => quoted.strip_suffix('"'),
            None => Some(value),
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXON: &str = "chr1\thavana\texon\t11869\t12227\t.\t+\t.\tgene_id \"ENSG00000223972\"; transcript_id \"ENST00000456328\"; exon_number \"1\";";

    #[test]
    fn test_gtf_record_view_basic() {
        let view = GtfRecordView::parse(EXON).unwrap();

        assert_eq!(view.seqname, "chr1");
        assert_eq!(view.source, "havana");
        assert_eq!(view.feature, "exon");
        assert_eq!(view.kind(), FeatureKind::Exon);
        assert_eq!(view.start, 11869);
        assert_eq!(view.end, 12227);
        assert_eq!(view.strand, Some(Strand::Plus));
        assert_eq!(view.transcript_id(), Some("ENST00000456328"));
        assert_eq!(view.gene_id(), Some("ENSG00000223972"));
        assert_eq!(view.attribute("exon_number"), Some("1"));
        assert_eq!(view.attribute("gene_name"), None);
    }

    #[test]
    fn test_attribute_key_must_match_exactly() {
        let attrs = "original_transcript_id \"X\"; transcript_id \"Y\";";
        assert_eq!(attribute(attrs, "transcript_id"), Some("Y"));
    }

    #[test]
    fn test_attribute_unterminated_quote() {
        assert_eq!(attribute("transcript_id \"ENST1", "transcript_id"), None);
    }

    #[test]
    fn test_feature_kinds() {
        assert_eq!(FeatureKind::from_feature("start_codon"), FeatureKind::StartCodon);
        assert_eq!(FeatureKind::from_feature("stop_codon"), FeatureKind::StopCodon);
        assert_eq!(FeatureKind::from_feature("CDS"), FeatureKind::Other);
    }

    #[test]
    fn test_unstranded_and_invalid_strand() {
        let line = "chr1\t.\tgene\t1\t10\t.\t.\t.\tgene_id \"G\";";
        assert_eq!(GtfRecordView::parse(line).unwrap().strand, None);

        let line = "chr1\t.\tgene\t1\t10\t.\tX\t.\tgene_id \"G\";";
        assert!(matches!(
            GtfRecordView::parse(line),
            Err(GtfParseError::InvalidStrand(_))
        ));
    }

    #[test]
    fn test_too_few_fields_and_bad_numbers() {
        assert!(matches!(
            GtfRecordView::parse("chr1\t.\texon\t1\t10"),
            Err(GtfParseError::TooFewFields { expected: 9, found: 5 })
        ));
        assert!(matches!(
            GtfRecordView::parse("chr1\t.\texon\tone\t10\t.\t+\t.\t."),
            Err(GtfParseError::InvalidNumber("start", _))
        ));
        assert_eq!(GtfRecordView::parse(""), Err(GtfParseError::EmptyLine));
    }

    #[test]
    fn test_column_ignores_other_fields() {
        let line = "chr1\tX\tgene\t1\tten\t.\t?\t.\tgene_id \"G0\";";
        assert!(GtfRecordView::parse(line).is_err());
        assert_eq!(column(line, FEATURE_COLUMN), Some("gene"));
        assert_eq!(column(line, ATTRIBUTE_COLUMN), Some("gene_id \"G0\";"));
        assert_eq!(column(line, 0), Some("chr1"));
        assert_eq!(column(line, 9), None);
        assert_eq!(column("chr1\tX", 2), None);
    }
}
