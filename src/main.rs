use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chunk_aggregator::processor::constants::DEFAULT_INPUT_PATH;
use chunk_aggregator::{ChunkedAggregator, PipelineConfig, format_report};
use clap::Parser;
use jemallocator::Jemalloc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(about = "Per-key min/mean/max over a key;value measurements file")]
struct Args {
    /// Input file of `key;value` lines
    #[arg(default_value = DEFAULT_INPUT_PATH)]
    input: PathBuf,
    /// Bytes read per chunk (overrides CHUNK_AGG_CHUNK_SIZE)
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Chunks parsed concurrently (overrides CHUNK_AGG_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Print row, chunk and error counts to stderr
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config =
        PipelineConfig::from_env().context("reading configuration from environment")?;
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }

    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?;
    let aggregator = ChunkedAggregator::new(config)?;
    let result = aggregator
        .run(&file)
        .with_context(|| format!("aggregate {}", args.input.display()))?;

    println!("{}", format_report(&result));

    if args.stats {
        let summary = result.summary();
        eprintln!(
            "chunks={} bytes={} rows={} skipped={} malformed={} keys={} peak={} elapsed={:?}",
            summary.chunks,
            summary.bytes_processed,
            summary.rows_processed,
            summary.lines_skipped,
            summary.malformed,
            result.aggregates().len(),
            result.peak_in_flight(),
            result.elapsed()
        );
    }

    Ok(())
}
