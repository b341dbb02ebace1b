use std::sync::Arc;

use crate::types::{CompressionAlgo, Result};

pub mod deflate;
pub mod frame;
pub mod lz4;

pub use deflate::DeflateCodec;
pub use frame::{FRAME_HEADER_LEN, FRAME_MAGIC, FrameHeader};
pub use lz4::Lz4Codec;

/// Byte transform used by the codec stage.
///
/// Implementations append to `output` and never touch bytes already in it.
/// `decompress` must fail rather than append more than `capacity` bytes.
pub trait Codec: Send + Sync {
    fn algo(&self) -> CompressionAlgo;

    /// Upper bound on the body size `compress` produces for `input_len` bytes.
    fn max_compressed_size(&self, input_len: usize) -> usize;

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()>;

    fn decompress(&self, input: &[u8], output: &mut Vec<u8>, capacity: usize) -> Result<()>;
}

/// Returns the built-in codec for `algo`.
pub fn codec_for(algo: CompressionAlgo) -> Arc<dyn Codec> {
    match algo {
        CompressionAlgo::Lz4 => Arc::new(Lz4Codec),
        CompressionAlgo::Deflate => Arc::new(DeflateCodec::default()),
    }
}

/// Compresses `data` into a self-describing frame.
pub fn apply_compression(data: &[u8], codec: &dyn Codec) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(FRAME_HEADER_LEN + codec.max_compressed_size(data.len()));
    frame::encode_into(codec, data, &mut output)?;
    Ok(output)
}

/// Decompresses a frame produced by [`apply_compression`], refusing frames
/// that declare more than `max_size` bytes.
pub fn reverse_compression(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let header = FrameHeader::decode(data)?;
    let declared = header.checked_len(max_size)?;
    let mut output = Vec::with_capacity(declared);
    let codec = codec_for(header.algo);
    frame::decode_into(&header, codec.as_ref(), data, &mut output)?;
    Ok(output)
}
