use std::collections::HashMap;

use tracing::{debug, warn};

use crate::processor::ParseError;
use crate::processor::aggregate::{Aggregate, SharedAggregates, key_to_string};
use crate::processor::constants::MAX_RETAINED_ERRORS;
use crate::processor::parser::parse_tenths;
use crate::processor::records::Records;

/// Per-chunk aggregates keyed by slices of the chunk buffer
pub type LocalAggregates<'a> = HashMap<&'a [u8], Aggregate>;

/// What one chunk contributed to the run
#[derive(Debug, Default, Clone)]
pub struct ChunkSummary {
    pub bytes: usize,
    pub rows: u64,
    pub skipped: u64,
    /// Every malformed value in the chunk
    pub malformed: u64,
    /// The first `MAX_RETAINED_ERRORS` of them
    pub errors: Vec<ParseError>,
}

/// Parses every record in `chunk` into a local map.
///
/// `chunk_offset` is the absolute file offset of `chunk[0]`, used to locate
/// malformed values in the returned summary.
pub fn aggregate_chunk(chunk: &[u8], chunk_offset: u64) -> (LocalAggregates<'_>, ChunkSummary) {
    let mut local: LocalAggregates<'_> = HashMap::new();
    let mut summary = ChunkSummary {
        bytes: chunk.len(),
        ..ChunkSummary::default()
    };

    let mut records = Records::new(chunk);
    while let Some((key, value)) = records.next() {
        let tenths = match parse_tenths(value) {
            Ok(tenths) => tenths,
            Err(e) => {
                summary.malformed += 1;
                if summary.errors.len() < MAX_RETAINED_ERRORS {
                    let offset = chunk_offset + records.offset_of(value) as u64;
                    debug!(offset, error = %e, "skipping record with malformed value");
                    summary.errors.push(ParseError {
                        offset,
                        key: key_to_string(key).into_owned(),
                        value: String::from_utf8_lossy(value).into_owned(),
                        error: e.to_string(),
                    });
                }
                continue;
            }
        };

        match local.get_mut(key) {
            Some(aggregate) => aggregate.observe(tenths),
            None => {
                local.insert(key, Aggregate::new(tenths));
            }
        }
        summary.rows += 1;
    }
    summary.skipped = records.skipped();

    if summary.malformed > 0 {
        warn!(
            chunk_offset,
            malformed = summary.malformed,
            first_offset = summary.errors.first().map(|e| e.offset),
            "skipped records with malformed values"
        );
    }

    (local, summary)
}

/// Aggregates one chunk locally, then merges the result into `shared` in a
/// single locked step.
pub fn process_chunk(chunk: &[u8], chunk_offset: u64, shared: &SharedAggregates) -> ChunkSummary {
    let (local, summary) = aggregate_chunk(chunk, chunk_offset);
    let keys = local.len();
    shared.merge(local);
    debug!(
        chunk_offset,
        bytes = summary.bytes,
        rows = summary.rows,
        keys,
        "chunk merged"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_aggregation() {
        let buf = b"Hamburg;12.3\nHamburg;-5.0\nPalermo;8.1\n";
        let (local, summary) = aggregate_chunk(buf, 0);

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.bytes, buf.len());
        assert!(summary.errors.is_empty());
        assert_eq!(summary.malformed, 0);

        let hamburg = local[&b"Hamburg"[..]];
        assert_eq!(hamburg.min(), -5.0);
        assert_eq!(hamburg.max(), 12.3);
        assert_eq!(hamburg.count(), 2);
        assert_eq!(local[&b"Palermo"[..]].mean(), 8.1);
    }

    #[test]
    fn test_malformed_values_are_reported_and_skipped() {
        let buf = b"a;1.0\nb;oops\nc;3.0\n";
        let (local, summary) = aggregate_chunk(buf, 100);

        assert_eq!(summary.rows, 2);
        assert_eq!(local.len(), 2);
        assert!(!local.contains_key(&b"b"[..]));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.malformed, 1);

        let err = &summary.errors[0];
        assert_eq!(err.offset, 108);
        assert_eq!(err.key, "b");
        assert_eq!(err.value, "oops");
    }

    #[test]
    fn test_retained_errors_are_capped() {
        let bad_lines = MAX_RETAINED_ERRORS + 50;
        let mut buf = b"k;1,2\n".repeat(bad_lines);
        buf.extend_from_slice(b"k;1.2\n");
        let (local, summary) = aggregate_chunk(&buf, 0);

        assert_eq!(summary.malformed, bad_lines as u64);
        assert_eq!(summary.errors.len(), MAX_RETAINED_ERRORS);
        assert_eq!(summary.rows, 1);
        assert_eq!(local[&b"k"[..]].count(), 1);

        // Retained errors are the earliest ones, values start 2 bytes into each line
        let last = summary.errors.last().unwrap();
        assert_eq!(last.offset, ((MAX_RETAINED_ERRORS - 1) * 6 + 2) as u64);
    }

    #[test]
    fn test_trailing_empty_line() {
        let (local, summary) = aggregate_chunk(b"a;1.0\na;2.0\n\n", 0);
        assert_eq!(local.len(), 1);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_process_chunk_merges_into_shared() {
        let shared = SharedAggregates::new();
        process_chunk(b"a;1.0\nb;2.0\n", 0, &shared);
        let summary = process_chunk(b"a;-3.0\n", 12, &shared);
        assert_eq!(summary.rows, 1);

        let map = shared.into_inner();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"].count(), 2);
        assert_eq!(map["a"].min(), -3.0);
        assert_eq!(map["a"].max(), 1.0);
        assert_eq!(map["a"].sum(), -2.0);
    }
}
