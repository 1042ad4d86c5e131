//! SAM text record model
//!
//! Typed view over one tab-separated alignment line. The original line is
//! kept verbatim so that records which survive filtering untouched can be
//! written back byte-for-byte; fields are located once with `memchr` and
//! exposed lazily as string slices.
//!
//! Only the first six mandatory columns are required
//! (QNAME, FLAG, RNAME, POS, MAPQ, CIGAR). Optional `TAG:TYPE:VALUE`
//! fields are looked up by prefix, never by fixed column.

use memchr::memchr_iter;

/// Minimum number of tab-separated fields for an alignment line
pub const MIN_FIELDS: usize = 6;

/// FLAG bit: SEQ is reverse complemented
pub const FLAG_REVERSE: u16 = 0x10;

/// FLAG bit: secondary alignment
pub const FLAG_SECONDARY: u16 = 0x100;

/// MAPQ value used for uniquely mapped reads
pub const MAX_MAPQ: u8 = 255;

/// Mapping count tag prefix
pub const MAPPING_COUNT_TAG: &str = "NH:i:";

/// Alignment index tag prefix
pub const ALIGNMENT_INDEX_TAG: &str = "HI:i:";

/// Column indices of the mandatory fields
pub const QNAME: usize = 0;
pub const FLAG: usize = 1;
pub const RNAME: usize = 2;
pub const POS: usize = 3;
pub const MAPQ: usize = 4;
pub const CIGAR: usize = 5;

/// SAM parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamParseError {
    EmptyLine,
    HeaderLine,
    TooFewFields { expected: usize, found: usize },
    InvalidNumber(&'static str, String),
}

impl std::fmt::Display for SamParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamParseError::EmptyLine => write!(f, "Empty line"),
            SamParseError::HeaderLine => write!(f, "Header line where an alignment was expected"),
            SamParseError::TooFewFields { expected, found } => {
                write!(f, "Too few fields: expected at least {}, found {}", expected, found)
            }
            SamParseError::InvalidNumber(field, value) => {
                write!(f, "Invalid number in field {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for SamParseError {}

/// Whether a line belongs to the SAM header section
#[inline]
pub fn is_header(line: &str) -> bool {
    line.starts_with('@')
}

/// Whether a header line is a reference sequence dictionary entry (`@SQ`)
#[inline]
pub fn is_sequence_header(line: &str) -> bool {
    line.starts_with("@SQ\t")
}

/// Value of the `SN:` field of a header line, if present
pub fn sequence_name(line: &str) -> Option<&str> {
    line.split('\t')
        .skip(1)
        .find_map(|field| field.strip_prefix("SN:"))
}

/// One parsed alignment line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    line: String,
    field_bounds: Vec<(usize, usize)>,
    flag: u16,
    mapping_count: Option<usize>,
}

impl AlignmentRecord {
    /// Parse an alignment line
    ///
    /// Fails on empty lines, header lines, lines with fewer than
    /// [`MIN_FIELDS`] columns, a non-numeric FLAG or a non-numeric `NH:i:`.
    pub fn parse(line: impl Into<String>) -> Result<Self, SamParseError> {
        let line = line.into();
        if line.is_empty() {
            return Err(SamParseError::EmptyLine);
        }
        if is_header(&line) {
            return Err(SamParseError::HeaderLine);
        }

        let mut field_bounds = Vec::with_capacity(16);
        let mut start = 0;
        for tab in memchr_iter(b'\t', line.as_bytes()) {
            field_bounds.push((start, tab));
            start = tab + 1;
        }
        field_bounds.push((start, line.len()));

        if field_bounds.len() < MIN_FIELDS {
            return Err(SamParseError::TooFewFields {
                expected: MIN_FIELDS,
                found: field_bounds.len(),
            });
        }

        let (flag_start, flag_end) = field_bounds[FLAG];
        let flag_str = &line[flag_start..flag_end];
        let flag: u16 = flag_str
            .parse()
            .map_err(|_| SamParseError::InvalidNumber("FLAG", flag_str.to_string()))?;

        let mut record = Self {
            line,
            field_bounds,
            flag,
            mapping_count: None,
        };

        record.mapping_count = match record.tag(MAPPING_COUNT_TAG) {
            Some(value) => Some(
                value
                    .parse()
                    .map_err(|_| SamParseError::InvalidNumber("NH", value.to_string()))?,
            ),
            None => None,
        };

        Ok(record)
    }

    /// The original line, without trailing newline
    pub fn as_line(&self) -> &str {
        &self.line
    }

    /// Number of tab-separated fields
    pub fn field_count(&self) -> usize {
        self.field_bounds.len()
    }

    /// Field by column index
    pub fn field(&self, index: usize) -> Option<&str> {
        self.field_bounds
            .get(index)
            .map(|&(start, end)| &self.line[start..end])
    }

    /// All fields in column order
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.field_bounds
            .iter()
            .map(move |&(start, end)| &self.line[start..end])
    }

    fn mandatory(&self, index: usize) -> &str {
        let (start, end) = self.field_bounds[index];
        &self.line[start..end]
    }

    pub fn read_name(&self) -> &str {
        self.mandatory(QNAME)
    }

    pub fn flag(&self) -> u16 {
        self.flag
    }

    pub fn is_reverse(&self) -> bool {
        self.flag & FLAG_REVERSE != 0
    }

    pub fn is_secondary(&self) -> bool {
        self.flag & FLAG_SECONDARY != 0
    }

    /// Primary here means "not marked secondary"
    pub fn is_primary(&self) -> bool {
        !self.is_secondary()
    }

    /// Reference (transcript) name, column RNAME
    pub fn reference_name(&self) -> &str {
        self.mandatory(RNAME)
    }

    /// 1-based leftmost position; `None` if the column is not numeric
    pub fn position(&self) -> Option<u64> {
        self.mandatory(POS).parse().ok()
    }

    pub fn mapping_quality(&self) -> Option<u8> {
        self.mandatory(MAPQ).parse().ok()
    }

    pub fn cigar(&self) -> &str {
        self.mandatory(CIGAR)
    }

    /// Value of the last optional field starting with `prefix`
    ///
    /// `prefix` includes the type, e.g. `"NH:i:"`.
    pub fn tag(&self, prefix: &str) -> Option<&str> {
        self.field_bounds[MIN_FIELDS..]
            .iter()
            .rev()
            .map(|&(start, end)| &self.line[start..end])
            .find_map(|field| field.strip_prefix(prefix))
    }

    /// Declared number of alignments for this read (`NH:i:`)
    pub fn mapping_count(&self) -> Option<usize> {
        self.mapping_count
    }

    /// 1-based index of this alignment among the read's alignments (`HI:i:`)
    pub fn alignment_index(&self) -> Option<usize> {
        self.tag(ALIGNMENT_INDEX_TAG).and_then(|v| v.parse().ok())
    }

    /// Whether column `index` is an optional tag field
    pub fn is_tag_column(index: usize) -> bool {
        index >= MIN_FIELDS
    }
}
