#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use stagefs_core::compression::Codec;
use stagefs_core::{
    CompressionAlgo, FileSystem, FsConfig, JobOp, LocalStorage, ReadHandle, Stage, StageTelemetry,
    StorageBackend, WriteHandle,
};
use tempfile::TempDir;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Something a collaborator observed, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(Stage, JobOp, String),
    Finished(Stage, JobOp, String),
    Failed(Stage, JobOp, String, i32),
    HandOff(Stage, Stage, String),
    OpenRead(String),
    /// Bytes handed to the backend when the write handle was closed.
    Stored(String, Vec<u8>),
    Compress(usize),
    Decompress(usize),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Stages that started work on `path`, in order.
    pub fn stages_for(&self, path: &str) -> Vec<Stage> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                Event::Started(stage, _, p) if p == path => Some(*stage),
                _ => None,
            })
            .collect()
    }

    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().iter().rev().find_map(|event| match event {
            Event::Stored(p, bytes) if p == path => Some(bytes.clone()),
            _ => None,
        })
    }

    pub fn position(&self, wanted: &Event) -> Option<usize> {
        self.lock().iter().position(|event| event == wanted)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.0.lock().expect("event log poisoned")
    }
}

pub struct RecordingTelemetry {
    log: EventLog,
}

impl RecordingTelemetry {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl StageTelemetry for RecordingTelemetry {
    fn on_queue_depth(&self, _stage: Stage, _depth: usize) {}

    fn on_job_started(&self, stage: Stage, op: JobOp, path: &str) {
        self.log.push(Event::Started(stage, op, path.to_string()));
    }

    fn on_job_finished(&self, stage: Stage, op: JobOp, path: &str, _elapsed: Duration) {
        self.log.push(Event::Finished(stage, op, path.to_string()));
    }

    fn on_job_failed(&self, stage: Stage, op: JobOp, path: &str, _elapsed: Duration, code: i32) {
        self.log
            .push(Event::Failed(stage, op, path.to_string(), code));
    }

    fn on_handoff(&self, from: Stage, to: Stage, _op: JobOp, path: &str) {
        self.log.push(Event::HandOff(from, to, path.to_string()));
    }
}

/// Open/closed latch used to hold the storage worker inside a job.
#[derive(Debug, Clone)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn closed() -> Self {
        Self(Arc::new((Mutex::new(false), Condvar::new())))
    }

    pub fn open(&self) {
        let (open, changed) = &*self.0;
        *open.lock().expect("gate poisoned") = true;
        changed.notify_all();
    }

    fn pass(&self) {
        let (open, changed) = &*self.0;
        let mut guard = open.lock().expect("gate poisoned");
        while !*guard {
            guard = changed.wait(guard).expect("gate poisoned");
        }
    }
}

/// Local storage that records every physical access.
pub struct RecordingStorage {
    inner: LocalStorage,
    log: EventLog,
    write_gate: Option<Gate>,
}

impl RecordingStorage {
    pub fn new(root: &TempDir, log: EventLog) -> Self {
        Self {
            inner: LocalStorage::rooted(root.path()),
            log,
            write_gate: None,
        }
    }

    /// Every `open_write` waits for `gate` to open first.
    pub fn gated(mut self, gate: Gate) -> Self {
        self.write_gate = Some(gate);
        self
    }
}

impl StorageBackend for RecordingStorage {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn ReadHandle>> {
        self.log.push(Event::OpenRead(path.to_string()));
        self.inner.open_read(path)
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn WriteHandle>> {
        if let Some(gate) = &self.write_gate {
            gate.pass();
        }
        Ok(Box::new(RecordingWriter {
            inner: self.inner.open_write(path)?,
            path: path.to_string(),
            written: Vec::new(),
            log: self.log.clone(),
        }))
    }
}

struct RecordingWriter {
    inner: Box<dyn WriteHandle>,
    path: String,
    written: Vec<u8>,
    log: EventLog,
}

impl Write for RecordingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WriteHandle for RecordingWriter {
    fn close(self: Box<Self>) -> io::Result<()> {
        let Self {
            inner,
            path,
            written,
            log,
        } = *self;
        inner.close()?;
        log.push(Event::Stored(path, written));
        Ok(())
    }
}

/// Codec wrapper that records calls and can be told to panic.
pub struct RecordingCodec {
    inner: Arc<dyn Codec>,
    log: EventLog,
    panic_on_compress: bool,
}

impl RecordingCodec {
    pub fn new(algo: CompressionAlgo, log: EventLog) -> Self {
        Self {
            inner: stagefs_core::compression::codec_for(algo),
            log,
            panic_on_compress: false,
        }
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_compress = true;
        self
    }
}

impl Codec for RecordingCodec {
    fn algo(&self) -> CompressionAlgo {
        self.inner.algo()
    }

    fn max_compressed_size(&self, input_len: usize) -> usize {
        self.inner.max_compressed_size(input_len)
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> stagefs_core::Result<()> {
        if self.panic_on_compress {
            panic!("codec exploded on {} bytes", input.len());
        }
        self.log.push(Event::Compress(input.len()));
        self.inner.compress(input, output)
    }

    fn decompress(
        &self,
        input: &[u8],
        output: &mut Vec<u8>,
        capacity: usize,
    ) -> stagefs_core::Result<()> {
        self.log.push(Event::Decompress(input.len()));
        self.inner.decompress(input, output, capacity)
    }
}

/// Filesystem rooted in a fresh temp dir with recording collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub log: EventLog,
    pub fs: FileSystem,
}

impl Harness {
    pub fn new(config: FsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Self::build(config, None, false)
    }

    pub fn gated(config: FsConfig, gate: Gate) -> Result<Self, Box<dyn std::error::Error>> {
        Self::build(config, Some(gate), false)
    }

    pub fn with_panicking_codec(config: FsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Self::build(config, None, true)
    }

    fn build(
        config: FsConfig,
        gate: Option<Gate>,
        panicking_codec: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let log = EventLog::default();

        let mut storage = RecordingStorage::new(&dir, log.clone());
        if let Some(gate) = gate {
            storage = storage.gated(gate);
        }
        let mut codec = RecordingCodec::new(config.compression, log.clone());
        if panicking_codec {
            codec = codec.panicking();
        }

        let fs = FileSystem::builder(config)
            .backend(Arc::new(storage))
            .codec(Arc::new(codec))
            .telemetry(Arc::new(RecordingTelemetry::new(log.clone())))
            .spawn()?;
        Ok(Self { dir, log, fs })
    }

    pub fn write_raw(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(self.dir.path().join(name), bytes)
    }

    pub fn read_raw(&self, name: &str) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        std::fs::File::open(self.dir.path().join(name))?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Deterministic bytes that do not compress well.
pub fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678_9ABC_DEF0u64;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((state >> 56) as u8);
    }
    out
}
