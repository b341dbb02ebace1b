use core::fmt;

use crate::compression::Codec;
use crate::error::FsError;
use crate::types::{CompressionAlgo, Result};

const MIN_MATCH: usize = 4;
const LAST_LITERALS: usize = 5;
const MFLIMIT: usize = 12;
const HASH_LOG: u32 = 12;
const HASH_SIZE: usize = 1 << HASH_LOG;
const HASH_SEED: u32 = 2_654_435_761;
const MAX_OFFSET: usize = u16::MAX as usize;
const SKIP_STRENGTH: usize = 6;

/// LZ4 block codec.
///
/// Produces raw LZ4 blocks (no frame, no size prefix). The frame layer
/// records the uncompressed length so decoding is always bounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::Lz4
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        max_compressed_size(input_len)
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        output.reserve(max_compressed_size(input.len()));
        compress_block(input, output);
        Ok(())
    }

    fn decompress(&self, input: &[u8], output: &mut Vec<u8>, capacity: usize) -> Result<()> {
        decompress_block(input, output, capacity).map_err(|err| match err {
            DecodeError::CapacityExceeded { required, capacity } => FsError::CapacityExceeded {
                declared: required,
                capacity,
            },
            other => FsError::DecompressionError(format!("lz4 decode failed: {other}")),
        })
    }
}

/// Worst-case size of an LZ4 block for `input_len` bytes of input.
#[inline]
pub fn max_compressed_size(input_len: usize) -> usize {
    input_len + (input_len / 255) + 16
}

fn compress_block(input: &[u8], output: &mut Vec<u8>) {
    if input.len() < MFLIMIT + 1 {
        emit_last_literals(output, input, 0);
        return;
    }

    let mut table = [0u32; HASH_SIZE];
    let mut anchor = 0usize;
    let mut search_pos = 1usize;
    let mflimit = input.len() - MFLIMIT;
    let match_limit = input.len() - LAST_LITERALS;

    'main: while search_pos <= mflimit {
        let mut current = search_pos;
        let mut search_match_nb = 1usize << SKIP_STRENGTH;

        loop {
            if current > mflimit {
                break 'main;
            }

            let sequence = load_u32(input, current);
            let hash = hash_sequence(sequence);
            let entry = table[hash];
            table[hash] = (current as u32) + 1;

            if entry != 0 {
                let mut candidate = (entry - 1) as usize;
                let offset = current - candidate;

                if offset <= MAX_OFFSET && load_u32(input, candidate) == sequence {
                    while current > anchor
                        && candidate > 0
                        && input[current - 1] == input[candidate - 1]
                    {
                        current -= 1;
                        candidate -= 1;
                    }

                    let match_end = current
                        + MIN_MATCH
                        + count_match_bytes(
                            input,
                            current + MIN_MATCH,
                            candidate + MIN_MATCH,
                            match_limit,
                        );
                    emit_sequence(
                        output,
                        &input[anchor..current],
                        offset,
                        match_end - current,
                    );

                    anchor = match_end;
                    if anchor > mflimit {
                        break 'main;
                    }

                    let insert_pos = anchor - 2;
                    table[hash_sequence(load_u32(input, insert_pos))] = (insert_pos as u32) + 1;

                    search_pos = anchor;
                    continue 'main;
                }
            }

            current += search_match_nb >> SKIP_STRENGTH;
            search_match_nb += 1;
        }
    }

    emit_last_literals(output, input, anchor);
}

#[inline]
fn load_u32(input: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([input[pos], input[pos + 1], input[pos + 2], input[pos + 3]])
}

#[inline]
fn hash_sequence(sequence: u32) -> usize {
    (sequence.wrapping_mul(HASH_SEED) >> (32 - HASH_LOG)) as usize
}

#[inline]
fn count_match_bytes(input: &[u8], mut left: usize, mut right: usize, end: usize) -> usize {
    let start = left;
    while left < end && input[left] == input[right] {
        left += 1;
        right += 1;
    }
    left - start
}

fn emit_sequence(output: &mut Vec<u8>, literals: &[u8], offset: usize, match_len: usize) {
    debug_assert!(match_len >= MIN_MATCH);
    debug_assert!(offset > 0 && offset <= MAX_OFFSET);

    let literal_token = literals.len().min(15) as u8;
    let match_token = (match_len - MIN_MATCH).min(15) as u8;
    output.push((literal_token << 4) | match_token);

    if literals.len() >= 15 {
        write_len(output, literals.len() - 15);
    }
    output.extend_from_slice(literals);
    output.extend_from_slice(&(offset as u16).to_le_bytes());

    let match_extra = match_len - MIN_MATCH;
    if match_extra >= 15 {
        write_len(output, match_extra - 15);
    }
}

fn emit_last_literals(output: &mut Vec<u8>, input: &[u8], literal_start: usize) {
    let literal_len = input.len() - literal_start;
    output.push((literal_len.min(15) as u8) << 4);

    if literal_len >= 15 {
        write_len(output, literal_len - 15);
    }
    output.extend_from_slice(&input[literal_start..]);
}

#[inline]
fn write_len(output: &mut Vec<u8>, mut len: usize) {
    while len >= 255 {
        output.push(255);
        len -= 255;
    }
    output.push(len as u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeError {
    ExpectedAnotherByte,
    LiteralOutOfBounds,
    OffsetOutOfBounds,
    LengthOverflow,
    CapacityExceeded { required: usize, capacity: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedAnotherByte => f.write_str("expected another byte, found none"),
            Self::LiteralOutOfBounds => f.write_str("literal is out of bounds of the input"),
            Self::OffsetOutOfBounds => {
                f.write_str("the offset to copy is not contained in the decompressed buffer")
            }
            Self::LengthOverflow => f.write_str("decoded length overflows platform usize"),
            Self::CapacityExceeded { required, capacity } => {
                write!(f, "output needs {required} bytes, capacity is {capacity}")
            }
        }
    }
}

/// Decodes one block, appending to `output`. Never appends more than
/// `capacity` bytes; the block is rejected instead of truncated.
fn decompress_block(
    input: &[u8],
    output: &mut Vec<u8>,
    capacity: usize,
) -> core::result::Result<(), DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::ExpectedAnotherByte);
    }

    let base = output.len();
    let mut input_pos = 0usize;

    loop {
        let token = input[input_pos];
        input_pos += 1;

        let mut literal_len = (token >> 4) as usize;
        if literal_len == 15 {
            literal_len = literal_len
                .checked_add(read_length(input, &mut input_pos)?)
                .ok_or(DecodeError::LengthOverflow)?;
        }

        let literal_end = input_pos
            .checked_add(literal_len)
            .filter(|end| *end <= input.len())
            .ok_or(DecodeError::LiteralOutOfBounds)?;
        ensure_capacity(output.len() - base, literal_len, capacity)?;
        output.extend_from_slice(&input[input_pos..literal_end]);
        input_pos = literal_end;

        if input_pos == input.len() {
            return Ok(());
        }

        if input_pos + 2 > input.len() {
            return Err(DecodeError::ExpectedAnotherByte);
        }
        let offset = u16::from_le_bytes([input[input_pos], input[input_pos + 1]]) as usize;
        input_pos += 2;

        if offset == 0 || offset > output.len() - base {
            return Err(DecodeError::OffsetOutOfBounds);
        }

        let mut match_len = (token & 0x0F) as usize + MIN_MATCH;
        if (token & 0x0F) == 0x0F {
            match_len = match_len
                .checked_add(read_length(input, &mut input_pos)?)
                .ok_or(DecodeError::LengthOverflow)?;
        }
        ensure_capacity(output.len() - base, match_len, capacity)?;
        copy_match(output, offset, match_len);

        if input_pos >= input.len() {
            // A block always ends with a literal-only sequence.
            return Err(DecodeError::ExpectedAnotherByte);
        }
    }
}

#[inline]
fn ensure_capacity(
    written: usize,
    additional: usize,
    capacity: usize,
) -> core::result::Result<(), DecodeError> {
    let required = written
        .checked_add(additional)
        .ok_or(DecodeError::LengthOverflow)?;
    if required > capacity {
        return Err(DecodeError::CapacityExceeded { required, capacity });
    }
    Ok(())
}

#[inline]
fn read_length(input: &[u8], input_pos: &mut usize) -> core::result::Result<usize, DecodeError> {
    let mut len = 0usize;
    loop {
        let byte = *input
            .get(*input_pos)
            .ok_or(DecodeError::ExpectedAnotherByte)?;
        *input_pos += 1;

        len = len
            .checked_add(byte as usize)
            .ok_or(DecodeError::LengthOverflow)?;
        if byte != 255 {
            return Ok(len);
        }
    }
}

fn copy_match(output: &mut Vec<u8>, offset: usize, len: usize) {
    let start = output.len() - offset;

    if offset == 1 {
        // RLE fast path, common for long runs.
        let value = output[start];
        output.resize(output.len() + len, value);
        return;
    }

    if offset >= len {
        output.extend_from_within(start..start + len);
        return;
    }

    let mut copied = 0usize;
    while copied < len {
        let chunk = (len - copied).min(offset);
        let from = start + copied;
        output.extend_from_within(from..from + chunk);
        copied += chunk;
    }
}
