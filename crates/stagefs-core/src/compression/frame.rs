//! Container around a codec body.
//!
//! Layout (all integers little-endian):
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 4    | magic `SFZ1`               |
//! | 4      | 1    | codec id                   |
//! | 5      | 4    | uncompressed length (u32)  |
//! | 9      | 4    | CRC32 of uncompressed data |
//! | 13     | ..   | codec body                 |

use crate::compression::Codec;
use crate::error::FsError;
use crate::types::{CompressionAlgo, Result};

pub const FRAME_MAGIC: &[u8; 4] = b"SFZ1";
pub const FRAME_HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub algo: CompressionAlgo,
    pub original_len: u32,
    pub crc32: u32,
}

impl FrameHeader {
    pub fn new(algo: CompressionAlgo, data: &[u8]) -> Result<Self> {
        let original_len = u32::try_from(data.len()).map_err(|_| {
            FsError::CompressionError("input exceeds 32-bit frame size field".to_string())
        })?;
        Ok(Self {
            algo,
            original_len,
            crc32: crc32fast::hash(data),
        })
    }

    pub fn encode(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(FRAME_MAGIC);
        output.push(self.algo.to_flags());
        output.extend_from_slice(&self.original_len.to_le_bytes());
        output.extend_from_slice(&self.crc32.to_le_bytes());
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(FsError::InvalidFrame("truncated frame header"));
        }
        if &data[..4] != FRAME_MAGIC {
            return Err(FsError::InvalidFrame("bad frame magic"));
        }

        let algo = CompressionAlgo::from_flags(data[4])?;
        let original_len = u32::from_le_bytes([data[5], data[6], data[7], data[8]]);
        let crc32 = u32::from_le_bytes([data[9], data[10], data[11], data[12]]);
        Ok(Self {
            algo,
            original_len,
            crc32,
        })
    }

    /// Declared uncompressed length, rejected when above `capacity`.
    pub fn checked_len(&self, capacity: usize) -> Result<usize> {
        let declared = self.original_len as usize;
        if declared > capacity {
            return Err(FsError::CapacityExceeded { declared, capacity });
        }
        Ok(declared)
    }
}

/// Appends a complete frame for `data` to `output`.
pub fn encode_into(codec: &dyn Codec, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
    FrameHeader::new(codec.algo(), data)?.encode(output);
    codec.compress(data, output)
}

/// Decodes the body of `frame` into `output` and verifies length and checksum.
///
/// `output` is restored to its previous length on any failure.
pub fn decode_into(
    header: &FrameHeader,
    codec: &dyn Codec,
    frame: &[u8],
    output: &mut Vec<u8>,
) -> Result<()> {
    let start = output.len();
    let expected = header.original_len as usize;

    let result = codec
        .decompress(&frame[FRAME_HEADER_LEN..], output, expected)
        .and_then(|()| {
            let produced = output.len() - start;
            if produced != expected {
                return Err(FsError::DecompressionError(format!(
                    "decoded {produced} bytes, frame declares {expected}"
                )));
            }
            let actual = crc32fast::hash(&output[start..]);
            if actual != header.crc32 {
                return Err(FsError::ChecksumMismatch {
                    expected: header.crc32,
                    actual,
                });
            }
            Ok(())
        });

    if result.is_err() {
        output.truncate(start);
    }
    result
}
