use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use crate::error::FsError;
use crate::telemetry::{self, tags};
use crate::types::Result;

/// A thread-safe pool of reusable byte buffers.
///
/// This is the allocator the pipeline draws every job buffer from. Buffers
/// return to the pool when their [`PooledBuffer`] is dropped. An optional
/// byte budget caps the bytes handed out at any one time; requests that would
/// exceed it are refused with [`FsError::OutOfMemory`] instead of blocking.
///
/// # Example
/// ```
/// use stagefs_core::BufferPool;
///
/// let pool = BufferPool::new(4096, 16);
/// let mut buffer = pool.try_acquire(128).unwrap();
/// buffer.extend_from_slice(b"hello");
/// drop(buffer); // returns to pool automatically
/// ```
#[derive(Debug)]
pub struct BufferPool {
    recycler: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    default_capacity: usize,
    max_buffers: usize,
    byte_budget: Option<usize>,
    metrics: Arc<PoolMetricsInner>,
}

impl BufferPool {
    /// Creates an unbudgeted pool.
    ///
    /// # Arguments
    /// * `default_capacity` - Minimum capacity for newly created buffers
    /// * `max_buffers` - Maximum number of idle buffers kept for reuse
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        Self::with_budget(default_capacity, max_buffers, None)
    }

    /// Creates a pool that refuses to hand out more than `byte_budget` bytes
    /// at once when a budget is given.
    pub fn with_budget(
        default_capacity: usize,
        max_buffers: usize,
        byte_budget: Option<usize>,
    ) -> Self {
        let (tx, rx) = bounded(max_buffers);
        Self {
            recycler: tx,
            receiver: rx,
            default_capacity,
            max_buffers,
            byte_budget,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Acquires an empty buffer able to hold at least `len` bytes.
    ///
    /// Fails without side effects when the byte budget would be exceeded.
    pub fn try_acquire(&self, len: usize) -> Result<PooledBuffer> {
        self.reserve(len)?;

        let buffer = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                let recycled_capacity = buffer.capacity();
                buffer.clear();
                if buffer.capacity() < len {
                    buffer.reserve_exact(len);
                }
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("result", "recycled")],
                );
                tracing::trace!(
                    target: tags::TARGET_BUFFER,
                    len,
                    recycled_capacity,
                    "buffer recycled"
                );
                buffer
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("result", "created")],
                );
                Vec::with_capacity(len.max(self.default_capacity))
            }
        };

        Ok(PooledBuffer::new(
            buffer,
            len,
            self.recycler.clone(),
            Arc::clone(&self.metrics),
        ))
    }

    fn reserve(&self, len: usize) -> Result<()> {
        let outstanding = &self.metrics.outstanding_bytes;
        let Some(budget) = self.byte_budget else {
            outstanding.fetch_add(len, Ordering::AcqRel);
            telemetry::add_gauge(tags::METRIC_BUFFER_OUTSTANDING_BYTES, len as u64, &[]);
            return Ok(());
        };

        let mut current = outstanding.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(len);
            if next > budget {
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_REJECTED_COUNT,
                    1,
                    &[("subsystem", "buffer"), ("result", "rejected")],
                );
                return Err(FsError::OutOfMemory {
                    requested: len,
                    outstanding: current,
                    budget,
                });
            }
            match outstanding.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    telemetry::add_gauge(tags::METRIC_BUFFER_OUTSTANDING_BYTES, len as u64, &[]);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns a snapshot of the current pool metrics.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            outstanding_bytes: self.metrics.outstanding_bytes.load(Ordering::Acquire),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    pub fn byte_budget(&self) -> Option<usize> {
        self.byte_budget
    }
}

/// A snapshot of buffer pool metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    /// Number of buffers created by the pool
    pub created: usize,
    /// Number of buffers successfully recycled
    pub recycled: usize,
    /// Number of buffers dropped (pool full)
    pub dropped: usize,
    /// Number of requests refused by the byte budget
    pub rejected: usize,
    /// Bytes currently handed out and not yet returned
    pub outstanding_bytes: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
    rejected: AtomicUsize,
    outstanding_bytes: AtomicUsize,
}

/// A buffer allocated from a [`BufferPool`].
///
/// Dropping it releases its reservation and returns the allocation to the
/// pool. Derefs to the underlying `Vec<u8>`.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    reserved: usize,
    recycler: Sender<Vec<u8>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledBuffer {
    fn new(
        buffer: Vec<u8>,
        reserved: usize,
        recycler: Sender<Vec<u8>>,
        metrics: Arc<PoolMetricsInner>,
    ) -> Self {
        Self {
            buffer,
            reserved,
            recycler,
            metrics,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Detaches the allocation from the pool; it is freed normally when the
    /// returned `Vec` is dropped.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn release_reservation(&mut self) {
        let reserved = std::mem::take(&mut self.reserved);
        if reserved > 0 {
            self.metrics
                .outstanding_bytes
                .fetch_sub(reserved, Ordering::AcqRel);
            telemetry::sub_gauge_saturating(
                tags::METRIC_BUFFER_OUTSTANDING_BYTES,
                reserved as u64,
                &[],
            );
        }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.release_reservation();

        let buffer = std::mem::take(&mut self.buffer);
        if buffer.capacity() == 0 {
            return;
        }
        if self.recycler.try_send(buffer).is_err() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT,
                1,
                &[("subsystem", "buffer"), ("result", "dropped")],
            );
        }
    }
}
