//! FastTxTools CLI entry point
//!
//! Multi-alignment SAM filters and transcript start/stop codon projection.

use clap::{Parser, Subcommand, ValueEnum};
use fast_txtools::core::{
    project_file, rewrite_files, AmbiguityMode, Diagnostics, FilePair, FilterPolicy,
    FileReport, GeneAnnotationIndex, PipelineConfig, PipelineResult, TranscriptWhitelist,
    DEFAULT_RETAINED_DIAGNOSTICS,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

/// Handling of reads spanning several genes (CLI enum)
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum AmbiguityModeArg {
    /// Drop every alignment of the read
    #[default]
    #[value(name = "all-or-nothing")]
    AllOrNothing,
    /// Keep the alignments sharing the first alignment's gene
    #[value(name = "anchor-gene")]
    AnchorGene,
}

impl From<AmbiguityModeArg> for AmbiguityMode {
    fn from(arg: AmbiguityModeArg) -> Self {
        match arg {
            AmbiguityModeArg::AllOrNothing => AmbiguityMode::AllOrNothing,
            AmbiguityModeArg::AnchorGene => AmbiguityMode::AnchorGene,
        }
    }
}

#[derive(Parser)]
#[command(name = "fast-txtools")]
#[command(about = "Multi-alignment SAM filters and transcript codon coordinates")]
#[command(version)]
#[command(author = "FastTxTools Contributors")]
struct Cli {
    /// Number of file pairs processed in parallel
    #[arg(short = 't', long, global = true, default_value = "1")]
    threads: usize,

    /// Diagnostics kept per input (all are counted)
    #[arg(long = "max-diagnostics", global = true, default_value_t = DEFAULT_RETAINED_DIAGNOSTICS)]
    max_diagnostics: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove reverse-strand alignments and renumber the rest
    FilterReverse {
        /// Input and output SAM files: IN OUT [IN OUT ...]
        #[arg(required = true, num_args = 2.., value_name = "IN OUT")]
        files: Vec<PathBuf>,
    },
    /// Remove reads whose alignments hit transcripts of different genes
    FilterAmbiguous {
        /// GTF annotation mapping transcript_id to gene_id
        #[arg(short = 'a', long)]
        annotation: PathBuf,
        /// What to do with a read spanning several genes
        #[arg(long, default_value = "all-or-nothing")]
        mode: AmbiguityModeArg,
        /// Input and output SAM files: IN OUT [IN OUT ...]
        #[arg(required = true, num_args = 2.., value_name = "IN OUT")]
        files: Vec<PathBuf>,
    },
    /// Keep alignments (and @SQ headers) of whitelisted transcripts
    SelectTranscripts {
        /// File with one transcript_id per line
        #[arg(short = 'w', long)]
        transcripts: PathBuf,
        /// Input and output SAM files: IN OUT [IN OUT ...]
        #[arg(required = true, num_args = 2.., value_name = "IN OUT")]
        files: Vec<PathBuf>,
    },
    /// Start and stop codon positions in transcript coordinates
    Startstop {
        /// GTF annotation file
        input: PathBuf,
        /// Output file (optional, stdout if not specified)
        output: Option<PathBuf>,
    },
}

fn file_pairs(files: &[PathBuf]) -> anyhow::Result<Vec<FilePair>> {
    FilePair::from_paths(files)
        .ok_or_else(|| anyhow::anyhow!("Expected input/output file pairs, got {} paths", files.len()))
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for (kind, count) in diagnostics.summary() {
        eprintln!("  {:<22} {}", format!("{}:", kind.as_str()), count);
    }
}

/// Print per-file statistics; returns the number of failed pairs
fn report(pairs: &[FilePair], results: Vec<PipelineResult<FileReport>>) -> usize {
    let mut failed = 0;
    for (pair, result) in pairs.iter().zip(results) {
        match result {
            Ok(report) => {
                let stats = &report.stats;
                eprintln!("\n=== {} ===", report.pair);
                eprintln!("Headers:         {} ({} dropped)", stats.headers, stats.headers_dropped);
                eprintln!("Groups:          {}", stats.groups);
                eprintln!("  - Unchanged:   {}", stats.groups_unchanged);
                eprintln!("  - Rewritten:   {}", stats.groups_rewritten);
                eprintln!("  - Dropped:     {}", stats.groups_dropped);
                eprintln!("Records in:      {}", stats.records_in);
                eprintln!("Records out:     {}", stats.records_out);
                print_diagnostics(&report.diagnostics);
            }
            Err(e) => {
                failed += 1;
                eprintln!("\n=== {} ===", pair);
                eprintln!("Error: {}", e);
            }
        }
    }
    failed
}

fn run_filter(
    files: &[PathBuf],
    policy: &FilterPolicy<'_>,
    config: &PipelineConfig,
) -> anyhow::Result<usize> {
    let pairs = file_pairs(files)?;
    let results = rewrite_files(&pairs, policy, config)?;
    Ok(report(&pairs, results))
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();
    let start = Instant::now();
    let config = PipelineConfig {
        threads: cli.threads.max(1),
        retained_diagnostics: cli.max_diagnostics,
    };

    let failed = match cli.command {
        Commands::FilterReverse { files } => {
            run_filter(&files, &FilterPolicy::forward_strand(), &config)?
        }

        Commands::FilterAmbiguous { annotation, mode, files } => {
            eprintln!("Loading annotation: {:?}", annotation);
            let index = GeneAnnotationIndex::from_gtf_file(&annotation)
                .map_err(|e| anyhow::anyhow!("Failed to load annotation: {}", e))?;
            eprintln!("Annotation loaded: {} transcripts", index.len());
            run_filter(&files, &FilterPolicy::gene_ambiguity(&index, mode.into()), &config)?
        }

        Commands::SelectTranscripts { transcripts, files } => {
            eprintln!("Loading transcript list: {:?}", transcripts);
            let whitelist = TranscriptWhitelist::from_file(&transcripts)
                .map_err(|e| anyhow::anyhow!("Failed to load transcript list: {}", e))?;
            eprintln!("Transcript list loaded: {} identifiers", whitelist.len());
            run_filter(&files, &FilterPolicy::transcript_whitelist(&whitelist), &config)?
        }

        Commands::Startstop { input, output } => {
            eprintln!("Projecting codons: {:?}", input);
            let (stats, diagnostics) =
                project_file(&input, output.as_deref(), config.retained_diagnostics)?;

            eprintln!("\n=== Projection Statistics ===");
            eprintln!("Rows:            {}", stats.rows);
            eprintln!("Feature rows:    {}", stats.feature_rows);
            eprintln!("Transcripts:     {}", stats.transcripts);
            eprintln!("Resolved:        {}", stats.resolved);
            eprintln!("Undefined:       {}", stats.undefined);
            print_diagnostics(&diagnostics);
            0
        }
    };

    eprintln!("\nTime elapsed:    {:.2}s", start.elapsed().as_secs_f64());

    if failed > 0 {
        eprintln!("{} file(s) failed; their output is incomplete", failed);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
