//! Environment variable names and default values for pipeline tuning.

// Environment variable names
pub const ENV_CHUNK_SIZE: &str = "CHUNK_AGG_CHUNK_SIZE";
pub const ENV_CONCURRENCY: &str = "CHUNK_AGG_CONCURRENCY";

// Defaults
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024; // 16 MiB
pub const DEFAULT_INPUT_PATH: &str = "measurements.txt";

/// Malformed values kept as `ParseError`s per chunk and per run; the rest are only counted
pub const MAX_RETAINED_ERRORS: usize = 100;

/// Record layout
pub const LINE_TERMINATOR: u8 = b'\n';
pub const FIELD_SEPARATOR: u8 = b';';
