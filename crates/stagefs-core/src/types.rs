use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FsError;

pub type Result<T> = std::result::Result<T, FsError>;

/// Kind of I/O a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobOp {
    Read,
    Write,
}

impl JobOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for JobOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a job can be processed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Storage,
    Codec,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Codec => "codec",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Storage => 0,
            Self::Codec => 1,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgo {
    /// LZ4 block format, fast
    #[default]
    Lz4,
    /// Deflate (raw, via flate2), smaller output
    Deflate,
}

impl CompressionAlgo {
    /// Encodes the algorithm into the frame codec id.
    pub fn to_flags(self) -> u8 {
        match self {
            Self::Lz4 => 0x01,
            Self::Deflate => 0x02,
        }
    }

    /// Decodes a frame codec id.
    pub fn from_flags(flags: u8) -> Result<Self> {
        match flags {
            0x01 => Ok(Self::Lz4),
            0x02 => Ok(Self::Deflate),
            _ => Err(FsError::InvalidFrame("unknown codec id")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Deflate => "deflate",
        }
    }
}

/// Converts a duration to whole microseconds, clamped to `u64::MAX`.
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}
