use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::processor::parser::tenths_to_f64;

/// Running `{min, max, sum, count}` for one key.
///
/// Values are held as integer tenths so sums are exact and merging is
/// associative and commutative; the accessors convert back to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aggregate {
    min: i64,
    max: i64,
    sum: i64,
    count: u64,
}

impl Aggregate {
    /// Aggregate of a single observation
    pub fn new(tenths: i64) -> Self {
        Aggregate {
            min: tenths,
            max: tenths,
            sum: tenths,
            count: 1,
        }
    }

    #[inline]
    pub fn observe(&mut self, tenths: i64) {
        self.min = self.min.min(tenths);
        self.max = self.max.max(tenths);
        self.sum += tenths;
        self.count += 1;
    }

    /// Folds `other` into `self`.
    pub fn merge(&mut self, other: &Aggregate) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn min(&self) -> f64 {
        tenths_to_f64(self.min)
    }

    pub fn max(&self) -> f64 {
        tenths_to_f64(self.max)
    }

    pub fn sum(&self) -> f64 {
        tenths_to_f64(self.sum)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.sum as f64 / (self.count as f64 * 10.0)
    }

    pub fn min_tenths(&self) -> i64 {
        self.min
    }

    pub fn max_tenths(&self) -> i64 {
        self.max
    }

    pub fn sum_tenths(&self) -> i64 {
        self.sum
    }

    pub fn summary(&self) -> StationSummary {
        StationSummary {
            min: self.min(),
            mean: self.mean(),
            max: self.max(),
            count: self.count,
        }
    }
}

/// Full-precision statistics handed to output code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

/// Run-wide aggregates by key.
///
/// Keys that are not valid UTF-8 keep every invalid byte as a `\xNN` escape
/// (see [`key_to_string`]), so distinct byte keys stay distinct.
pub type AggregateMap = HashMap<String, Aggregate>;

/// Borrows `key` when it is UTF-8, otherwise escapes each invalid byte as `\xNN`.
pub fn key_to_string(key: &[u8]) -> Cow<'_, str> {
    if let Ok(key) = std::str::from_utf8(key) {
        return Cow::Borrowed(key);
    }
    let mut out = String::with_capacity(key.len() * 2);
    for chunk in key.utf8_chunks() {
        out.push_str(chunk.valid());
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{byte:02X}"));
        }
    }
    Cow::Owned(out)
}

/// Merges one local aggregate into `target` under `key`.
pub fn merge_entry(target: &mut AggregateMap, key: &[u8], local: &Aggregate) {
    let key = key_to_string(key);
    match target.get_mut(key.as_ref()) {
        Some(existing) => existing.merge(local),
        None => {
            target.insert(Cow::into_owned(key), *local);
        }
    }
}

/// The run-wide aggregate map, shared by every chunk task.
///
/// The lock is taken once per [`SharedAggregates::merge`] call and never
/// while a chunk is being parsed.
#[derive(Debug, Default)]
pub struct SharedAggregates {
    inner: Mutex<AggregateMap>,
}

impl SharedAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a chunk-local map into the shared one.
    pub fn merge<'a, I>(&self, local: I)
    where
        I: IntoIterator<Item = (&'a [u8], Aggregate)>,
    {
        let mut global = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, aggregate) in local {
            merge_entry(&mut global, key, &aggregate);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the shared map once every task is done with it.
    pub fn into_inner(self) -> AggregateMap {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
