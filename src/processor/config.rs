use crate::processor::ProcessorError;
use crate::processor::constants::{DEFAULT_CHUNK_SIZE, ENV_CHUNK_SIZE, ENV_CONCURRENCY};

/// Tuning knobs for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bytes requested per read; must be at least the longest line
    pub chunk_size: usize,
    /// Maximum number of chunks buffered or parsing at once
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: num_cpus::get().max(1),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CHUNK_AGG_CHUNK_SIZE` / `CHUNK_AGG_CONCURRENCY`.
    pub fn from_env() -> Result<Self, ProcessorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProcessorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CHUNK_SIZE) {
            config.chunk_size = parse_usize(ENV_CHUNK_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CONCURRENCY) {
            config.concurrency = parse_usize(ENV_CONCURRENCY, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.chunk_size == 0 {
            return Err(ProcessorError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ProcessorError::InvalidConfig(
                "concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(name: &str, raw: &str) -> Result<usize, ProcessorError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| ProcessorError::InvalidConfig(format!("{name}={raw:?}: {e}")))
}
