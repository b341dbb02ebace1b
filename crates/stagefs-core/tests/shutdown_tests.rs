mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stagefs_core::{FileSystem, FsConfig, FsError, ReadOptions, WriteOptions};
use support::{Gate, Harness, TestResult};

#[test]
fn shutdown_waits_for_admitted_jobs() -> TestResult {
    let gate = Gate::closed();
    let harness = Arc::new(Harness::gated(FsConfig::default(), gate.clone())?);

    let items = (0..4)
        .map(|i| {
            harness.fs.submit_write(
                &format!("pending-{i}"),
                vec![i as u8; 32],
                WriteOptions::new().compressed(i % 2 == 1),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let stopper = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || harness.fs.shutdown())
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!stopper.is_finished());
    assert!(items.iter().all(|item| !item.is_done()));

    gate.open();
    stopper
        .join()
        .map_err(|_| std::io::Error::other("shutdown thread panicked"))??;

    for item in &items {
        assert_eq!(item.try_result(), Some(0));
    }
    for i in 0..4 {
        assert!(harness.dir.path().join(format!("pending-{i}")).exists());
    }
    Ok(())
}

#[test]
fn submissions_after_shutdown_are_refused() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness.fs.shutdown()?;

    let err = harness
        .fs
        .submit_read("late.txt", ReadOptions::new())
        .expect_err("closed filesystem");
    assert!(matches!(err, FsError::ShuttingDown));
    assert!(!harness.fs.is_running());

    harness.fs.shutdown()?;
    Ok(())
}

#[test]
fn dropping_the_filesystem_completes_outstanding_items() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dropped.bin");
    let path = path.to_str().ok_or("non-utf8 temp path")?;

    let fs = FileSystem::new(FsConfig::default())?;
    let item = fs.submit_write(path, vec![5u8; 1024], WriteOptions::new().compressed(true))?;
    drop(fs);

    assert!(item.is_done());
    assert_eq!(item.result(), 0);
    assert!(std::fs::metadata(path)?.len() > 0);
    Ok(())
}

#[test]
fn dropped_work_item_does_not_stall_shutdown() -> TestResult {
    let harness = Harness::new(FsConfig::default())?;
    harness.write_raw("ignored.bin", &[1u8; 4096])?;

    for _ in 0..8 {
        drop(harness.fs.submit_read("ignored.bin", ReadOptions::new())?);
    }
    harness.fs.shutdown()?;

    let snapshot = harness.fs.runtime_snapshot();
    assert_eq!(snapshot.completed, 8);
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(harness.fs.pool().metrics().outstanding_bytes, 0);
    Ok(())
}

#[test]
fn wait_timeout_does_not_cancel_the_job() -> TestResult {
    let gate = Gate::closed();
    let harness = Harness::gated(FsConfig::default(), gate.clone())?;

    let item = harness
        .fs
        .submit_write("slow.bin", b"eventually".to_vec(), WriteOptions::new())?;
    assert!(item.wait_timeout(Duration::from_millis(20)).is_none());

    gate.open();
    let completion = item.wait();
    assert!(completion.is_success());
    assert_eq!(harness.read_raw("slow.bin")?, b"eventually");
    Ok(())
}
