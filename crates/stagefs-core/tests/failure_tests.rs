mod support;

use std::io::ErrorKind;
use std::sync::Arc;

use stagefs_core::error::{CODE_ABANDONED, CODE_CODEC, CODE_INVALID_PATH, CODE_OUT_OF_MEMORY};
use stagefs_core::{
    Codec, CompressionAlgo, FileSystem, FsConfig, FsError, LocalStorage, Lz4Codec, ReadOptions,
    WriteOptions,
};
use support::{Harness, TestResult};

fn compressed() -> ReadOptions {
    ReadOptions::new().compressed(true)
}

#[test]
fn missing_file_fails_without_data_and_both_queues_keep_serving() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness.write_raw("present.txt", b"here")?;

    let missing = harness.fs.submit_read("absent.txt", ReadOptions::new())?;
    let present = harness.fs.submit_read("present.txt", ReadOptions::new())?;
    let packed = harness.fs.submit_write(
        "packed.sfz",
        b"through the codec queue".to_vec(),
        WriteOptions::new().compressed(true),
    )?;

    assert_ne!(missing.result(), 0);
    assert!(missing.buffer().is_empty());
    assert_eq!(missing.size(), 0);
    match missing.error() {
        Some(FsError::Io(err)) => assert_eq!(err.kind(), ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
    #[cfg(unix)]
    assert_eq!(missing.result(), 2);

    assert_eq!(present.result(), 0);
    assert_eq!(present.data(), b"here");

    assert_eq!(packed.result(), 0);
    let unpacked = harness.fs.read("packed.sfz", compressed())?;
    assert_eq!(unpacked.data(), b"through the codec queue");
    Ok(())
}

#[test]
fn into_result_names_the_failed_request() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    let err = harness
        .fs
        .read("nowhere.bin", ReadOptions::new())
        .expect_err("missing file");

    let message = err.to_string();
    assert!(message.starts_with("read nowhere.bin: "), "{message}");
    assert!(matches!(err, FsError::Context { .. }));
    Ok(())
}

#[test]
fn plain_file_read_as_compressed_is_rejected() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness.write_raw("plain.txt", b"definitely not a frame")?;

    let item = harness.fs.submit_read("plain.txt", compressed())?;
    assert_eq!(item.result(), CODE_CODEC);
    assert!(matches!(item.error(), Some(FsError::InvalidFrame(_))));
    assert!(item.buffer().is_empty());
    Ok(())
}

#[test]
fn corrupt_frame_body_never_yields_partial_data() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness.fs.write(
        "good.sfz",
        b"some text that compresses ".repeat(100),
        WriteOptions::new().compressed(true),
    )?;

    let mut frame = harness.read_raw("good.sfz")?;
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;
    frame.truncate(frame.len() - 3);
    harness.write_raw("bad.sfz", &frame)?;

    let item = harness
        .fs
        .submit_read("bad.sfz", compressed().null_terminated(true))?;
    assert_eq!(item.result(), CODE_CODEC);
    assert!(item.buffer().is_empty());
    assert_eq!(item.size(), 0);
    Ok(())
}

#[test]
fn checksum_mismatch_is_a_codec_failure() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness
        .fs
        .write("sum.sfz", vec![9u8; 4096], WriteOptions::new().compressed(true))?;

    let mut frame = harness.read_raw("sum.sfz")?;
    frame[9] ^= 0x01;
    harness.write_raw("sum.sfz", &frame)?;

    let item = harness.fs.submit_read("sum.sfz", compressed())?;
    assert_eq!(item.result(), CODE_CODEC);
    assert!(matches!(
        item.error(),
        Some(FsError::ChecksumMismatch { .. })
    ));
    Ok(())
}

#[test]
fn declared_size_above_limit_is_rejected() -> TestResult {
    let harness = Harness::new(FsConfig::default().with_max_decompressed_size(1024))?;
    harness
        .fs
        .write("big.sfz", vec![0u8; 4096], WriteOptions::new().compressed(true))?;

    let item = harness.fs.submit_read("big.sfz", compressed())?;
    assert_eq!(item.result(), CODE_CODEC);
    assert!(matches!(
        item.error(),
        Some(FsError::CapacityExceeded {
            declared: 4096,
            capacity: 1024
        })
    ));
    Ok(())
}

#[test]
fn exhausted_pool_budget_fails_only_that_job() -> TestResult {
    let harness = Harness::new(FsConfig::default().with_pool_byte_budget(Some(1024)))?;
    harness.write_raw("large.bin", &[1u8; 4096])?;
    harness.write_raw("small.bin", &[2u8; 100])?;

    let large = harness.fs.submit_read("large.bin", ReadOptions::new())?;
    assert_eq!(large.result(), CODE_OUT_OF_MEMORY);
    assert!(matches!(large.error(), Some(FsError::OutOfMemory { .. })));
    assert!(large.buffer().is_empty());

    let small = harness.fs.read("small.bin", ReadOptions::new())?;
    assert_eq!(small.size(), 100);
    assert_eq!(harness.fs.pool().metrics().rejected, 1);
    Ok(())
}

#[test]
fn codec_panic_fails_the_job_and_worker_keeps_serving() -> TestResult {
    let harness = Harness::with_panicking_codec(FsConfig::default())?;

    let exploded = harness.fs.submit_write(
        "boom.sfz",
        b"payload".to_vec(),
        WriteOptions::new().compressed(true),
    )?;
    assert_eq!(exploded.result(), CODE_ABANDONED);
    match exploded.error() {
        Some(FsError::WorkerPanicked(details)) => assert!(details.contains("codec exploded")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.read_raw("boom.sfz").is_err());

    harness
        .fs
        .write("calm.bin", b"still here".to_vec(), WriteOptions::new())?;
    let again = harness.fs.submit_write(
        "boom2.sfz",
        b"payload".to_vec(),
        WriteOptions::new().compressed(true),
    )?;
    assert_eq!(again.result(), CODE_ABANDONED);

    harness.fs.shutdown()?;
    Ok(())
}

#[test]
fn invalid_paths_are_rejected_before_queueing() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    let too_long = "x".repeat(1024);

    for path in ["", too_long.as_str(), "nul\0inside"] {
        let err = harness
            .fs
            .submit_write(path, b"data".to_vec(), WriteOptions::new())
            .expect_err("invalid path");
        assert_eq!(err.code(), CODE_INVALID_PATH);
    }

    let at_limit = "y".repeat(1023);
    let item = harness.fs.submit_read(&at_limit, ReadOptions::new())?;
    // Accepted by the facade; the backend may still refuse the name.
    let _ = item.result();

    assert!(harness.log.stages_for("").is_empty());
    assert_eq!(harness.fs.runtime_snapshot().submitted, 1);
    Ok(())
}

/// LZ4 that reports a bound far below what it actually produces.
struct UnderstatedBound;

impl Codec for UnderstatedBound {
    fn algo(&self) -> CompressionAlgo {
        CompressionAlgo::Lz4
    }

    fn max_compressed_size(&self, _input_len: usize) -> usize {
        1
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> stagefs_core::Result<()> {
        Lz4Codec.compress(input, output)
    }

    fn decompress(
        &self,
        input: &[u8],
        output: &mut Vec<u8>,
        capacity: usize,
    ) -> stagefs_core::Result<()> {
        Lz4Codec.decompress(input, output, capacity)
    }
}

#[test]
fn compressed_output_beyond_reserved_bound_is_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let fs = FileSystem::builder(FsConfig::default())
        .backend(Arc::new(LocalStorage::rooted(dir.path())))
        .codec(Arc::new(UnderstatedBound))
        .spawn()?;

    let payload = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>();
    let item = fs.submit_write("overrun.sfz", payload, WriteOptions::new().compressed(true))?;
    assert_eq!(item.result(), CODE_CODEC);
    assert!(matches!(item.error(), Some(FsError::CompressionError(_))));
    assert!(!dir.path().join("overrun.sfz").exists());

    drop(item);
    fs.shutdown()?;
    assert_eq!(fs.pool().metrics().outstanding_bytes, 0);
    Ok(())
}
