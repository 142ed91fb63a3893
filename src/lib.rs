//! # chunk_aggregator
//!
//! `chunk_aggregator` computes per-key minimum, mean and maximum over large
//! `key;value` text files, where each value is a fixed-point decimal with one
//! fractional digit (`Hamburg;12.3`). It supports:
//!
//! - Record-aligned chunking: every chunk ends right after a line terminator
//! - A bounded worker pool built on Rayon, at most N chunks in memory at once
//! - A custom fixed-point parser with integer arithmetic, no `str::parse`
//! - Exact accumulation in tenths, so results do not depend on chunk size or
//!   merge order
//! - Malformed values reported per record instead of aborting the run
//!
//! # Example
//!
//! ```rust,no_run
//! use chunk_aggregator::{aggregate_file, PipelineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default().with_chunk_size(8 * 1024 * 1024);
//!     let result = aggregate_file("measurements.txt", config)?;
//!
//!     for (station, stats) in result.summaries() {
//!         println!("{} => {:.1}/{:.1}/{:.1}", station, stats.min, stats.mean, stats.max);
//!     }
//!     println!("{} rows", result.summary().rows_processed);
//!
//!     Ok(())
//! }
//! ```

pub mod processor;

pub use processor::report::format_report;
pub use processor::{
    Aggregate, AggregateMap, AggregationResult, ChunkedAggregator, ParseError, ParseSummary,
    PipelineConfig, ProcessorError, StationSummary, aggregate_file,
};
