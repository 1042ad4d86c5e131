//! Read-only lookup tables used by the filter policies
//!
//! Both tables are built once before any alignment stream is processed and
//! then shared by reference across all file pairs.

use crate::core::error::{AnnotationError, AnnotationResult};
use crate::core::io::{LineIterator, SmartReader};
use crate::formats::gtf;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

/// transcript_id -> gene_id mapping taken from a GTF file
#[derive(Debug, Clone, Default)]
pub struct GeneAnnotationIndex {
    transcript_gene: HashMap<String, String>,
}

impl GeneAnnotationIndex {
    /// Build the index from GTF rows
    ///
    /// Only the attribute column is read, so coordinates and strand are not
    /// validated. Comment lines (`#`) and blank lines are skipped, as are
    /// rows without a `transcript_id` attribute. A row with fewer than nine
    /// columns, or with a `transcript_id` but no `gene_id`, is an error.
    pub fn from_reader<R: BufRead>(reader: R) -> AnnotationResult<Self> {
        let mut lines = LineIterator::new(reader);
        let mut transcript_gene = HashMap::new();

        while let Some(next) = lines.next_text() {
            let (line_number, text) = next?;
            let line = text.map_err(|e| AnnotationError::MalformedLine {
                line: line_number,
                message: format!("line is not valid UTF-8: {}", e),
            })?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(attributes) = gtf::column(line, gtf::ATTRIBUTE_COLUMN) else {
                return Err(AnnotationError::MalformedLine {
                    line: line_number,
                    message: format!("expected {} tab-separated fields", gtf::GTF_FIELDS),
                });
            };

            let Some(transcript_id) = gtf::attribute(attributes, "transcript_id") else {
                continue;
            };
            let gene_id =
                gtf::attribute(attributes, "gene_id").ok_or(AnnotationError::MissingAttribute {
                    line: line_number,
                    attribute: "gene_id",
                })?;

            transcript_gene.insert(transcript_id.to_string(), gene_id.to_string());
        }

        log::info!("Loaded gene annotation for {} transcripts", transcript_gene.len());
        Ok(Self { transcript_gene })
    }

    /// Build the index from a (possibly compressed) GTF file
    pub fn from_gtf_file<P: AsRef<Path>>(path: P) -> AnnotationResult<Self> {
        Self::from_reader(SmartReader::open(path)?)
    }

    pub fn gene_of(&self, transcript_id: &str) -> Option<&str> {
        self.transcript_gene.get(transcript_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transcript_gene.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript_gene.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GeneAnnotationIndex {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            transcript_gene: iter
                .into_iter()
                .map(|(t, g)| (t.into(), g.into()))
                .collect(),
        }
    }
}

/// Set of transcript identifiers to keep
#[derive(Debug, Clone, Default)]
pub struct TranscriptWhitelist {
    ids: HashSet<String>,
}

impl TranscriptWhitelist {
    /// One identifier per line; surrounding whitespace and blank lines ignored
    pub fn from_reader<R: BufRead>(reader: R) -> AnnotationResult<Self> {
        let mut lines = LineIterator::new(reader);
        let mut ids = HashSet::new();

        while let Some(line) = lines.next_line() {
            let id = line?.trim();
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }

        log::info!("Loaded {} whitelisted transcripts", ids.len());
        Ok(Self { ids })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> AnnotationResult<Self> {
        Self::from_reader(SmartReader::open(path)?)
    }

    pub fn contains(&self, transcript_id: &str) -> bool {
        self.ids.contains(transcript_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TranscriptWhitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
