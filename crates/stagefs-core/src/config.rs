use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::types::{CompressionAlgo, Result};

/// Longest accepted path in bytes (a 1 KiB buffer minus its terminator).
pub const DEFAULT_MAX_PATH_LEN: usize = 1023;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Upper bound on the uncompressed size a frame may declare.
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_POOL_BUFFER_CAPACITY: usize = 64 * 1024;
pub const DEFAULT_POOL_MAX_BUFFERS: usize = 32;

/// Runtime configuration for a [`FileSystem`](crate::FileSystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Capacity of each stage's submission lane; callers block when full.
    pub queue_capacity: usize,
    pub max_path_len: usize,
    pub max_decompressed_size: usize,
    /// Codec used for compressed writes. Reads follow the frame's codec id.
    pub compression: CompressionAlgo,
    pub pool_buffer_capacity: usize,
    pub pool_max_buffers: usize,
    /// Bytes the default pool may hand out at once; `None` is unbounded.
    pub pool_byte_budget: Option<usize>,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            compression: CompressionAlgo::default(),
            pool_buffer_capacity: DEFAULT_POOL_BUFFER_CAPACITY,
            pool_max_buffers: DEFAULT_POOL_MAX_BUFFERS,
            pool_byte_budget: None,
        }
    }
}

impl FsConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }

    pub fn with_max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }

    pub fn with_compression(mut self, algo: CompressionAlgo) -> Self {
        self.compression = algo;
        self
    }

    pub fn with_pool(mut self, buffer_capacity: usize, max_buffers: usize) -> Self {
        self.pool_buffer_capacity = buffer_capacity;
        self.pool_max_buffers = max_buffers;
        self
    }

    pub fn with_pool_byte_budget(mut self, budget: Option<usize>) -> Self {
        self.pool_byte_budget = budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(config_error("queue_capacity must be at least 1"));
        }
        if self.max_path_len == 0 {
            return Err(config_error("max_path_len must be at least 1"));
        }
        if self.max_decompressed_size > u32::MAX as usize {
            return Err(config_error(
                "max_decompressed_size cannot exceed the 32-bit frame size field",
            ));
        }
        if self.pool_byte_budget == Some(0) {
            return Err(config_error("pool_byte_budget must be non-zero when set"));
        }
        Ok(())
    }
}

fn config_error(message: &'static str) -> FsError {
    FsError::Other(anyhow::anyhow!(message)).with_context("invalid filesystem config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FsConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = FsConfig::default()
            .with_queue_capacity(0)
            .validate()
            .expect_err("zero capacity");
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: FsConfig =
            serde_json::from_str(r#"{ "queue_capacity": 4, "compression": "deflate" }"#)
                .expect("parse");
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.compression, CompressionAlgo::Deflate);
        assert_eq!(config.max_path_len, DEFAULT_MAX_PATH_LEN);
    }
}
