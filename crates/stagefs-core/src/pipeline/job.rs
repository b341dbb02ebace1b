use std::cell::OnceCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

use crate::buffer::{BufferPool, PooledBuffer};
use crate::error::FsError;
use crate::pipeline::state::PipelineState;
use crate::types::{JobOp, Result};

/// Bytes carried by a job as it moves between stages.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Caller-supplied write data.
    Shared(Bytes),
    /// Buffer drawn from a [`BufferPool`] by one of the stages.
    Pooled(PooledBuffer),
}

impl Payload {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Shared(bytes) => bytes,
            Self::Pooled(buffer) => buffer.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts into an owned vector, detaching pooled buffers from their pool.
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Shared(bytes) => bytes.to_vec(),
            Self::Pooled(buffer) => buffer.into_vec(),
        }
    }
}

/// Terminal record of a job. Frozen once produced.
///
/// Callers must check [`Completion::result`] (or [`Completion::error`])
/// before trusting the buffer: failed jobs carry an empty buffer and a size
/// of zero.
#[derive(Debug)]
pub struct Completion {
    op: JobOp,
    path: Arc<str>,
    payload: Payload,
    size: usize,
    error: Option<FsError>,
}

impl Completion {
    fn abandoned(op: JobOp, path: Arc<str>) -> Self {
        Self {
            op,
            path,
            payload: Payload::Empty,
            size: 0,
            error: Some(FsError::Abandoned),
        }
    }

    pub fn op(&self) -> JobOp {
        self.op
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Status code: 0 on success, the failure's nonzero code otherwise.
    pub fn result(&self) -> i32 {
        self.error.as_ref().map_or(0, FsError::code)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&FsError> {
        self.error.as_ref()
    }

    /// Whole buffer, including the terminator byte of a null-terminated read.
    pub fn buffer(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Effective byte count; excludes any terminator.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The first [`size`](Self::size) bytes of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.payload.as_slice()[..self.size]
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Converts a failed completion into its error, annotated with op and path.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(err) => Err(err.with_context(format!("{} {}", self.op, self.path))),
            None => Ok(self),
        }
    }
}

/// Caller-side handle to a submitted job.
///
/// A `WorkItem` can be moved to another thread but not shared; the first
/// observation of completion caches the frozen [`Completion`], after which
/// every accessor is a plain read. Accessors other than [`is_done`],
/// [`try_result`] and [`wait_timeout`] block until the job is terminal.
///
/// Dropping an unfinished item is allowed: the job still runs to completion
/// and its buffer goes back to the pool.
///
/// [`is_done`]: Self::is_done
/// [`try_result`]: Self::try_result
/// [`wait_timeout`]: Self::wait_timeout
#[derive(Debug)]
pub struct WorkItem {
    op: JobOp,
    path: Arc<str>,
    receiver: Receiver<Completion>,
    completion: OnceCell<Completion>,
}

impl WorkItem {
    pub fn op(&self) -> JobOp {
        self.op
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-blocking completion check.
    pub fn is_done(&self) -> bool {
        self.poll().is_some()
    }

    /// Blocks until the job is terminal. Does not spin.
    pub fn wait(&self) -> &Completion {
        self.completion.get_or_init(|| {
            self.receiver
                .recv()
                .unwrap_or_else(|_| Completion::abandoned(self.op, Arc::clone(&self.path)))
        })
    }

    /// Waits at most `timeout`. The job keeps running when this returns `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<&Completion> {
        if let Some(completion) = self.completion.get() {
            return Some(completion);
        }
        let completion = match self.receiver.recv_timeout(timeout) {
            Ok(completion) => completion,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                Completion::abandoned(self.op, Arc::clone(&self.path))
            }
        };
        Some(self.completion.get_or_init(|| completion))
    }

    /// Status code if the job is terminal, `None` while it is still running.
    pub fn try_result(&self) -> Option<i32> {
        self.poll().map(Completion::result)
    }

    /// Waits, then returns the status code (0 on success).
    pub fn result(&self) -> i32 {
        self.wait().result()
    }

    pub fn error(&self) -> Option<&FsError> {
        self.wait().error()
    }

    pub fn buffer(&self) -> &[u8] {
        self.wait().buffer()
    }

    pub fn size(&self) -> usize {
        self.wait().size()
    }

    pub fn data(&self) -> &[u8] {
        self.wait().data()
    }

    /// Waits and hands the terminal record, buffer included, to the caller.
    pub fn release(self) -> Completion {
        let _ = self.wait();
        match self.completion.into_inner() {
            Some(completion) => completion,
            None => Completion::abandoned(self.op, self.path),
        }
    }

    /// Waits and converts a failure into `Err`.
    pub fn into_result(self) -> Result<Completion> {
        self.release().into_result()
    }

    fn poll(&self) -> Option<&Completion> {
        if let Some(completion) = self.completion.get() {
            return Some(completion);
        }
        let completion = match self.receiver.try_recv() {
            Ok(completion) => completion,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Completion::abandoned(self.op, Arc::clone(&self.path))
            }
        };
        Some(self.completion.get_or_init(|| completion))
    }
}

/// Pipeline-side state of one request. Moved, never shared, between stages.
///
/// A job that is dropped before [`Job::complete`] completes itself with
/// [`FsError::Abandoned`], so a waiter can never block forever.
pub(crate) struct Job {
    pub(crate) op: JobOp,
    pub(crate) path: Arc<str>,
    pub(crate) payload: Payload,
    pub(crate) size: usize,
    pub(crate) null_terminate: bool,
    pub(crate) use_compression: bool,
    pub(crate) pool: Arc<BufferPool>,
    submitted_at: Instant,
    done: Option<Sender<Completion>>,
    state: Arc<PipelineState>,
}

pub(crate) struct JobSpec {
    pub(crate) op: JobOp,
    pub(crate) path: Arc<str>,
    pub(crate) payload: Payload,
    pub(crate) null_terminate: bool,
    pub(crate) use_compression: bool,
    pub(crate) pool: Arc<BufferPool>,
}

impl Job {
    /// Creates the job and its caller handle. The caller must already have
    /// registered the job with `state`.
    pub(crate) fn new(spec: JobSpec, state: Arc<PipelineState>) -> (Self, WorkItem) {
        let (tx, rx) = bounded(1);
        let item = WorkItem {
            op: spec.op,
            path: Arc::clone(&spec.path),
            receiver: rx,
            completion: OnceCell::new(),
        };
        let job = Self {
            op: spec.op,
            path: spec.path,
            size: spec.payload.len(),
            payload: spec.payload,
            null_terminate: spec.null_terminate,
            use_compression: spec.use_compression,
            pool: spec.pool,
            submitted_at: Instant::now(),
            done: Some(tx),
            state,
        };
        (job, item)
    }

    pub(crate) fn complete(mut self, result: Result<()>) {
        self.finish(result);
    }

    fn finish(&mut self, result: Result<()>) {
        let Some(done) = self.done.take() else {
            return;
        };

        let (payload, size, error) = match result {
            Ok(()) => (std::mem::take(&mut self.payload), self.size, None),
            Err(err) => {
                self.payload = Payload::Empty;
                (Payload::Empty, 0, Some(err))
            }
        };
        let success = error.is_none();
        let completion = Completion {
            op: self.op,
            path: Arc::clone(&self.path),
            payload,
            size,
            error,
        };

        // Counters settle before the waiter can observe the completion.
        self.state
            .job_finished(success, self.submitted_at.elapsed());
        // The receiver may be gone; the completion is then simply dropped.
        let _ = done.send(completion);
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.done.is_some() {
            self.finish(Err(FsError::Abandoned));
        }
    }
}
