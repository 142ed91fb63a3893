use thiserror::Error;

use crate::processor::constants::MAX_RETAINED_ERRORS;

pub mod aggregate;
pub mod chunk_processor;
pub mod chunk_reader;
pub mod config;
pub mod constants;
pub mod parser;
pub mod pipeline;
pub mod records;
pub mod report;

pub use aggregate::{Aggregate, AggregateMap, SharedAggregates, StationSummary};
pub use config::PipelineConfig;
pub use pipeline::{AggregationResult, ChunkedAggregator, aggregate_file};

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed value {value:?}: {reason}")]
    MalformedValue { value: String, reason: &'static str },

    #[error("Line at offset {offset} is longer than the chunk size ({chunk_size} bytes)")]
    LineTooLong { offset: u64, chunk_size: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ProcessorError {
    pub(crate) fn malformed(bytes: &[u8], reason: &'static str) -> Self {
        ProcessorError::MalformedValue {
            value: String::from_utf8_lossy(bytes).into_owned(),
            reason,
        }
    }

    /// Errors that stop the whole run, as opposed to per-record ones.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProcessorError::MalformedValue { .. })
    }
}

/// Totals over every chunk of a run
#[derive(Debug, Default, Clone)]
pub struct ParseSummary {
    pub chunks: usize,
    pub bytes_processed: u64,
    pub rows_processed: u64,
    pub lines_skipped: u64,
    /// Records left out because their value did not parse
    pub malformed: u64,
    /// Up to `MAX_RETAINED_ERRORS` of those records, ordered by offset
    pub errors: Vec<ParseError>,
}

impl ParseSummary {
    pub(crate) fn absorb(&mut self, chunk: chunk_processor::ChunkSummary) {
        self.chunks += 1;
        self.bytes_processed += chunk.bytes as u64;
        self.rows_processed += chunk.rows;
        self.lines_skipped += chunk.skipped;
        self.malformed += chunk.malformed;

        let room = MAX_RETAINED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(chunk.errors.into_iter().take(room));
    }

    /// Orders retained errors by offset once every chunk is absorbed.
    pub(crate) fn finish(&mut self) {
        self.errors.sort_unstable_by_key(|e| e.offset);
    }
}

/// A record whose value could not be parsed. The record is left out of the
/// aggregates and processing continues.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Absolute byte offset of the value in the input file
    pub offset: u64,
    pub key: String,
    pub value: String,
    pub error: String,
}
