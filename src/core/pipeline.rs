//! Alignment rewrite pipeline
//!
//! Reader, policy and rewriter wired together over one stream, plus the
//! per-file and multi-file drivers used by the command line. File pairs are
//! independent: each has its own reader, writer and diagnostics, and only
//! the read-only lookup tables behind the policy are shared.

use crate::core::diagnostics::{Diagnostics, DEFAULT_RETAINED_DIAGNOSTICS};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::group::{GroupReader, StreamItem};
use crate::core::io::{create_writer, SmartReader};
use crate::core::policy::GroupFilter;
use crate::core::rewrite::{GroupRewriter, RewriteOutcome};
use rayon::prelude::*;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Run-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// File pairs processed concurrently (1 = sequential)
    pub threads: usize,
    /// Diagnostics kept per file; all are counted regardless
    pub retained_diagnostics: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            retained_diagnostics: DEFAULT_RETAINED_DIAGNOSTICS,
        }
    }
}

/// Rewrite statistics of one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub headers: usize,
    pub headers_dropped: usize,
    pub groups: usize,
    pub records_in: usize,
    pub records_out: usize,
    pub groups_unchanged: usize,
    pub groups_rewritten: usize,
    pub groups_dropped: usize,
}

impl RewriteStats {
    fn record(&mut self, outcome: RewriteOutcome, records_in: usize) {
        self.groups += 1;
        self.records_in += records_in;
        match outcome {
            RewriteOutcome::Unchanged => {
                self.groups_unchanged += 1;
                self.records_out += records_in;
            }
            RewriteOutcome::Rewritten { retained } => {
                self.groups_rewritten += 1;
                self.records_out += retained;
            }
            RewriteOutcome::Dropped => self.groups_dropped += 1,
        }
    }
}

/// Filter and rewrite one alignment stream
///
/// Output written before a fatal error stays in `writer`; callers must
/// treat it as unusable.
pub fn rewrite_stream<R, W, F>(
    reader: R,
    writer: &mut W,
    filter: &F,
    diagnostics: &mut Diagnostics,
) -> PipelineResult<RewriteStats>
where
    R: BufRead,
    W: Write,
    F: GroupFilter + ?Sized,
{
    let mut groups = GroupReader::new(reader);
    let mut rewriter = GroupRewriter::new();
    let mut retained = Vec::new();
    let mut stats = RewriteStats::default();

    while let Some(item) = groups.next_item(diagnostics)? {
        match item {
            StreamItem::Header { line, text } => {
                stats.headers += 1;
                if filter.keep_header(&text, line, diagnostics) {
                    writer.write_all(text.as_bytes())?;
                    writer.write_all(b"\n")?;
                } else {
                    stats.headers_dropped += 1;
                }
            }
            StreamItem::Group(group) => {
                filter.retain(&group, &mut retained)?;
                let outcome = rewriter.rewrite(&group, &retained, writer, diagnostics)?;
                stats.record(outcome, group.len());
            }
        }
    }

    Ok(stats)
}

/// One input stream and where its rewrite goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl FilePair {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Pair up `IN OUT IN OUT ...`; `None` for an odd count
    pub fn from_paths(paths: &[PathBuf]) -> Option<Vec<FilePair>> {
        if paths.len() % 2 != 0 {
            return None;
        }
        Some(
            paths
                .chunks_exact(2)
                .map(|pair| FilePair::new(&pair[0], &pair[1]))
                .collect(),
        )
    }
}

impl fmt::Display for FilePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input.display(), self.output.display())
    }
}

/// Result of one file pair
#[derive(Debug)]
pub struct FileReport {
    pub pair: FilePair,
    pub stats: RewriteStats,
    pub diagnostics: Diagnostics,
}

/// Rewrite one file pair
pub fn rewrite_file<F>(
    pair: &FilePair,
    filter: &F,
    config: &PipelineConfig,
) -> PipelineResult<FileReport>
where
    F: GroupFilter + ?Sized,
{
    if !pair.input.exists() {
        return Err(PipelineError::InputNotFound(pair.input.clone()));
    }
    log::info!("{}: {}", filter.name(), pair);

    let mut diagnostics =
        Diagnostics::with_limit(pair.input.display().to_string(), config.retained_diagnostics);
    let reader = SmartReader::open(&pair.input)?;
    let mut writer = create_writer(&pair.output)?;

    let result = rewrite_stream(reader, &mut writer, filter, &mut diagnostics);
    // Partial output is flushed even when the stream failed
    let flushed = writer.flush();
    let stats = result?;
    flushed?;

    log::info!(
        "{}: {} groups, {} unchanged, {} rewritten, {} dropped",
        pair.input.display(),
        stats.groups,
        stats.groups_unchanged,
        stats.groups_rewritten,
        stats.groups_dropped
    );
    Ok(FileReport {
        pair: pair.clone(),
        stats,
        diagnostics,
    })
}

/// Rewrite many file pairs, in parallel when `config.threads > 1`
///
/// Results are returned in the order of `pairs`. A failing pair does not
/// stop the others.
pub fn rewrite_files<F>(
    pairs: &[FilePair],
    filter: &F,
    config: &PipelineConfig,
) -> PipelineResult<Vec<PipelineResult<FileReport>>>
where
    F: GroupFilter + Sync,
{
    if config.threads <= 1 || pairs.len() <= 1 {
        return Ok(pairs
            .iter()
            .map(|pair| rewrite_file(pair, filter, config))
            .collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    Ok(pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| rewrite_file(pair, filter, config))
            .collect()
    }))
}
