use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::compression::Codec;
use crate::error::FsError;
use crate::types::{CompressionAlgo, Result};

/// Raw deflate codec backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: u32,
}

impl DeflateCodec {
    /// Creates a codec with an explicit level, clamped to `0..=9`.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Codec for DeflateCodec {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::Deflate
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        // Stored-block worst case plus stream overhead.
        input_len + (input_len >> 12) + (input_len >> 14) + (input_len >> 25) + 64
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        let mut encoder = DeflateEncoder::new(output, Compression::new(self.level));
        encoder
            .write_all(input)
            .and_then(|()| encoder.try_finish())
            .map_err(|err| FsError::CompressionError(format!("deflate encode failed: {err}")))
    }

    fn decompress(&self, input: &[u8], output: &mut Vec<u8>, capacity: usize) -> Result<()> {
        let start = output.len();
        let limit = (capacity as u64).saturating_add(1);
        DeflateDecoder::new(input)
            .take(limit)
            .read_to_end(output)
            .map_err(|err| FsError::DecompressionError(format!("deflate decode failed: {err}")))?;

        let produced = output.len() - start;
        if produced > capacity {
            output.truncate(start);
            return Err(FsError::CapacityExceeded {
                declared: produced,
                capacity,
            });
        }
        Ok(())
    }
}
