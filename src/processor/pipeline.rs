use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info};

use crate::processor::aggregate::{Aggregate, AggregateMap, SharedAggregates, StationSummary};
use crate::processor::chunk_processor::{ChunkSummary, process_chunk};
use crate::processor::chunk_reader::{Chunk, PositionalRead, read_chunk};
use crate::processor::{ParseSummary, PipelineConfig, ProcessorError};

/// Slot in the worker pool; handed back when dropped.
struct Permit<'a> {
    release: Sender<()>,
    in_flight: &'a AtomicUsize,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = self.release.send(());
    }
}

/// Parses `chunk` into `shared` unless the run has been aborted.
fn process_unless_aborted(
    chunk: &Chunk,
    shared: &SharedAggregates,
    abort: &AtomicBool,
) -> Option<ChunkSummary> {
    if abort.load(Ordering::Relaxed) {
        return None;
    }
    Some(process_chunk(chunk.data(), chunk.offset(), shared))
}

/// Reads a file chunk by chunk and aggregates the chunks in parallel.
///
/// At most `concurrency` chunks are buffered or being parsed at any moment:
/// the dispatch loop takes a permit before each read and the task that
/// parses the chunk gives it back when done.
///
/// # Example
/// ```no_run
/// # use chunk_aggregator::{ChunkedAggregator, PipelineConfig};
/// let aggregator = ChunkedAggregator::new(PipelineConfig::default())?;
/// let file = std::fs::File::open("measurements.txt")?;
/// let result = aggregator.run(&file)?;
/// for (station, stats) in result.summaries() {
///     println!("{station}: {:.1}/{:.1}/{:.1}", stats.min, stats.mean, stats.max);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ChunkedAggregator {
    config: PipelineConfig,
    pool: ThreadPool,
}

impl ChunkedAggregator {
    pub fn new(config: PipelineConfig) -> Result<Self, ProcessorError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|i| format!("chunk-worker-{i}"))
            .build()?;
        Ok(ChunkedAggregator { config, pool })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the whole pipeline over `source`.
    ///
    /// Returns only once every dispatched chunk has been merged. A read
    /// failure stops dispatching, lets in-flight tasks drain, and discards
    /// everything aggregated so far.
    pub fn run<R>(&self, source: &R) -> Result<AggregationResult, ProcessorError>
    where
        R: PositionalRead + ?Sized,
    {
        let started = Instant::now();
        let shared = SharedAggregates::new();
        let abort = AtomicBool::new(false);
        let in_flight = AtomicUsize::new(0);
        let peak_in_flight = AtomicUsize::new(0);

        let slots = self.config.concurrency;
        let (release, acquire) = channel::bounded::<()>(slots);
        for _ in 0..slots {
            let _ = release.send(());
        }
        let (summary_tx, summary_rx) = channel::unbounded::<ChunkSummary>();

        let dispatched: Result<(), ProcessorError> = self.pool.in_place_scope(|scope| {
            let mut offset = 0u64;
            loop {
                acquire
                    .recv()
                    .map_err(|_| io::Error::other("worker pool permits closed"))?;
                let held = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak_in_flight.fetch_max(held, Ordering::SeqCst);
                let permit = Permit {
                    release: release.clone(),
                    in_flight: &in_flight,
                };

                let chunk = match read_chunk(source, self.config.chunk_size, offset) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        error!(offset, error = %e, "read failed, aborting run");
                        return Err(e);
                    }
                };
                if chunk.is_eof() {
                    return Ok(());
                }

                offset += chunk.effective_len() as u64;
                debug!(
                    chunk_offset = chunk.offset(),
                    bytes_read = chunk.bytes_read(),
                    effective_len = chunk.effective_len(),
                    "dispatching chunk"
                );

                let shared = &shared;
                let abort = &abort;
                let summary_tx = summary_tx.clone();
                scope.spawn(move |_| {
                    let summary = process_unless_aborted(&chunk, shared, abort);
                    // buffer goes before the permit
                    drop(chunk);
                    drop(permit);
                    if let Some(summary) = summary {
                        let _ = summary_tx.send(summary);
                    }
                });
            }
        });
        drop(summary_tx);
        dispatched?;

        let mut summary = ParseSummary::default();
        for chunk in summary_rx.iter() {
            summary.absorb(chunk);
        }
        summary.finish();
        let peak_in_flight = peak_in_flight.into_inner();

        let aggregates = shared.into_inner();
        let elapsed = started.elapsed();
        info!(
            chunks = summary.chunks,
            bytes = summary.bytes_processed,
            rows = summary.rows_processed,
            skipped = summary.lines_skipped,
            malformed = summary.malformed,
            keys = aggregates.len(),
            peak_in_flight,
            wall_ms = elapsed.as_millis() as u64,
            "aggregation finished"
        );

        Ok(AggregationResult {
            aggregates,
            summary,
            elapsed,
            peak_in_flight,
        })
    }
}

/// Opens `path` and runs one pipeline over it.
pub fn aggregate_file(
    path: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<AggregationResult, ProcessorError> {
    let file = File::open(path.as_ref())?;
    ChunkedAggregator::new(config)?.run(&file)
}

/// Final, immutable output of a run
#[derive(Debug, Clone)]
pub struct AggregationResult {
    aggregates: AggregateMap,
    summary: ParseSummary,
    elapsed: Duration,
    peak_in_flight: usize,
}

impl AggregationResult {
    pub fn aggregates(&self) -> &AggregateMap {
        &self.aggregates
    }

    pub fn into_aggregates(self) -> AggregateMap {
        self.aggregates
    }

    pub fn get(&self, key: &str) -> Option<&Aggregate> {
        self.aggregates.get(key)
    }

    /// `{min, mean, max, count}` per key, ordered by key
    pub fn summaries(&self) -> BTreeMap<&str, StationSummary> {
        self.aggregates
            .iter()
            .map(|(k, v)| (k.as_str(), v.summary()))
            .collect()
    }

    pub fn summary(&self) -> &ParseSummary {
        &self.summary
    }

    /// Sum of every key's count
    pub fn total_count(&self) -> u64 {
        self.aggregates.values().map(Aggregate::count).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Most chunks buffered or parsing at the same time; never above `concurrency`
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::constants::MAX_RETAINED_ERRORS;

    fn run_with(input: &[u8], chunk_size: usize, concurrency: usize) -> AggregationResult {
        let config = PipelineConfig::new()
            .with_chunk_size(chunk_size)
            .with_concurrency(concurrency);
        ChunkedAggregator::new(config).unwrap().run(input).unwrap()
    }

    #[test]
    fn test_end_to_end_example() {
        let input = b"Hamburg;12.3\nHamburg;-5.0\nPalermo;8.1\n";
        let result = run_with(input, 16, 2);

        let summaries = result.summaries();
        assert_eq!(
            summaries["Hamburg"],
            StationSummary {
                min: -5.0,
                mean: 3.65,
                max: 12.3,
                count: 2,
            }
        );
        assert_eq!(
            summaries["Palermo"],
            StationSummary {
                min: 8.1,
                mean: 8.1,
                max: 8.1,
                count: 1,
            }
        );
        assert_eq!(result.summary().chunks, 3);
        assert_eq!(result.summary().rows_processed, 3);
    }

    #[test]
    fn test_single_chunk_when_chunk_exceeds_input() {
        let input = b"a;1.0\nb;2.0\na;3.0\n";
        let result = run_with(input, 1 << 20, 4);
        assert_eq!(result.summary().chunks, 1);
        assert_eq!(result.aggregates(), run_with(input, 7, 4).aggregates());
    }

    #[test]
    fn test_empty_input() {
        let result = run_with(b"", 64, 2);
        assert!(result.aggregates().is_empty());
        assert_eq!(result.summary().chunks, 0);
        assert_eq!(result.total_count(), 0);
    }

    #[test]
    fn test_single_worker() {
        let input = b"x;1.0\ny;2.0\nx;3.0\ny;4.0\n";
        let result = run_with(input, 6, 1);
        assert_eq!(result.summary().chunks, 4);
        assert_eq!(result.get("x").unwrap().sum(), 4.0);
        assert_eq!(result.get("y").unwrap().mean(), 3.0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = ChunkedAggregator::new(PipelineConfig::new().with_concurrency(0)).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfig(_)));
    }

    #[test]
    fn test_line_too_long_aborts() {
        let config = PipelineConfig::new().with_chunk_size(4).with_concurrency(2);
        let err = ChunkedAggregator::new(config)
            .unwrap()
            .run(&b"Hamburg;12.3\n"[..])
            .unwrap_err();
        assert!(matches!(err, ProcessorError::LineTooLong { .. }));
    }

    /// Serves `good_reads` reads, then fails.
    struct FailAfter {
        data: Vec<u8>,
        good_reads: usize,
        reads: AtomicUsize,
    }

    impl PositionalRead for FailAfter {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= self.good_reads {
                return Err(io::Error::other("device gone"));
            }
            self.data.read_at(buf, offset)
        }
    }

    #[test]
    fn test_read_failure_discards_partial_result() {
        let source = FailAfter {
            data: b"a;1.0\nb;2.0\nc;3.0\nd;4.0\n".to_vec(),
            good_reads: 2,
            reads: AtomicUsize::new(0),
        };
        let config = PipelineConfig::new().with_chunk_size(6).with_concurrency(2);
        let err = ChunkedAggregator::new(config)
            .unwrap()
            .run(&source)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Io(_)));
        // nothing is read after the failing read
        assert_eq!(source.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_aborted_run_skips_merge() {
        let shared = SharedAggregates::new();
        let chunk = read_chunk(&b"a;1.0\nb;2.0\n"[..], 64, 0).unwrap();

        let abort = AtomicBool::new(true);
        assert!(process_unless_aborted(&chunk, &shared, &abort).is_none());
        assert!(shared.is_empty());

        abort.store(false, Ordering::Relaxed);
        let summary = process_unless_aborted(&chunk, &shared, &abort).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(shared.len(), 2);
    }

    /// Counts every positional read.
    struct CountingReads {
        data: Vec<u8>,
        reads: AtomicUsize,
    }

    impl PositionalRead for CountingReads {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.data.read_at(buf, offset)
        }
    }

    #[test]
    fn test_in_flight_chunks_bounded_by_concurrency() {
        let data: Vec<u8> = (0..20_000)
            .flat_map(|i| format!("station-{};{}.{}\n", i % 97, i % 90, i % 10).into_bytes())
            .collect();

        for concurrency in [1, 3] {
            let source = CountingReads {
                data: data.clone(),
                reads: AtomicUsize::new(0),
            };
            let config = PipelineConfig::new()
                .with_chunk_size(4096)
                .with_concurrency(concurrency);
            let result = ChunkedAggregator::new(config).unwrap().run(&source).unwrap();

            assert!(result.summary().chunks > concurrency * 10);
            assert!(source.reads.load(Ordering::SeqCst) > result.summary().chunks);
            assert!(result.peak_in_flight() >= 1);
            assert!(
                result.peak_in_flight() <= concurrency,
                "peak {} with concurrency {concurrency}",
                result.peak_in_flight()
            );
            assert_eq!(result.total_count(), 20_000);
        }
    }

    #[test]
    fn test_malformed_count_exact_while_errors_capped() {
        let mut input = b"k;1,2\n".repeat(20_000);
        input.extend_from_slice(b"k;1.5\n");
        let result = run_with(&input, 4096, 4);

        let summary = result.summary();
        assert_eq!(summary.malformed, 20_000);
        assert_eq!(summary.errors.len(), MAX_RETAINED_ERRORS);
        assert!(summary.errors.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(summary.rows_processed, 1);
        assert_eq!(result.get("k").unwrap().count(), 1);
    }

    #[test]
    fn test_invalid_utf8_keys_are_not_merged() {
        let result = run_with(b"\xff;1.0\n\xfe;2.0\n\xff;3.0\n", 64, 2);
        assert_eq!(result.aggregates().len(), 2);
        assert_eq!(result.get("\\xFF").unwrap().count(), 2);
        assert_eq!(result.get("\\xFE").unwrap().sum(), 2.0);
    }

    #[test]
    fn test_aggregator_is_reusable() {
        let aggregator =
            ChunkedAggregator::new(PipelineConfig::new().with_chunk_size(8).with_concurrency(3))
                .unwrap();
        let first = aggregator.run(&b"k;1.0\nk;2.0\n"[..]).unwrap();
        let second = aggregator.run(&b"k;1.0\nk;2.0\n"[..]).unwrap();
        assert_eq!(first.aggregates(), second.aggregates());
        assert_eq!(first.total_count(), 2);
    }
}
