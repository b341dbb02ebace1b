use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use bytes::Bytes;

use crate::buffer::BufferPool;
use crate::compression::{self, Codec};
use crate::config::FsConfig;
use crate::error::FsError;
use crate::pipeline::job::{Job, JobSpec};
use crate::pipeline::queue::StageQueue;
use crate::pipeline::state::PipelineState;
use crate::pipeline::{self, Completion, Payload, PipelineContext, PipelineSnapshot, WorkItem};
use crate::storage::{LocalStorage, StorageBackend};
use crate::telemetry::{DefaultStageTelemetry, StageTelemetry, tags};
use crate::types::{JobOp, Result, Stage};

/// Options for [`FileSystem::submit_read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Pool the result buffer is drawn from. Defaults to the filesystem pool.
    pub pool: Option<Arc<BufferPool>>,
    /// Append one zero byte after the data. It is not counted in the size.
    pub null_terminate: bool,
    /// The stored bytes are a compressed frame.
    pub use_compression: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn null_terminated(mut self, enabled: bool) -> Self {
        self.null_terminate = enabled;
        self
    }

    pub fn compressed(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }
}

/// Options for [`FileSystem::submit_write`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Compress through the codec stage before storing.
    pub use_compression: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compressed(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }
}

/// Builder for a [`FileSystem`] with custom collaborators.
pub struct FileSystemBuilder {
    config: FsConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    codec: Option<Arc<dyn Codec>>,
    telemetry: Option<Arc<dyn StageTelemetry>>,
    pool: Option<Arc<BufferPool>>,
}

impl FileSystemBuilder {
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Codec for compressed writes. Overrides `FsConfig::compression`.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn StageTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Pool used for codec output and for reads without their own pool.
    pub fn buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Creates both queues and starts both workers.
    pub fn spawn(self) -> Result<FileSystem> {
        self.config.validate()?;
        let config = self.config;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(LocalStorage::new()) as Arc<dyn StorageBackend>);
        let codec = self
            .codec
            .unwrap_or_else(|| compression::codec_for(config.compression));
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(DefaultStageTelemetry) as Arc<dyn StageTelemetry>);
        let pool = self.pool.unwrap_or_else(|| {
            Arc::new(BufferPool::with_budget(
                config.pool_buffer_capacity,
                config.pool_max_buffers,
                config.pool_byte_budget,
            ))
        });

        let context = Arc::new(PipelineContext {
            storage_queue: StageQueue::new(config.queue_capacity),
            codec_queue: StageQueue::new(config.queue_capacity),
            backend,
            codec,
            pool,
            telemetry,
            // Room for a full lane in front of each stage.
            state: Arc::new(PipelineState::new(config.queue_capacity.saturating_mul(2))),
            max_decompressed_size: config.max_decompressed_size,
        });

        let storage = pipeline::spawn_stage(Arc::clone(&context), Stage::Storage)?;
        let codec = match pipeline::spawn_stage(Arc::clone(&context), Stage::Codec) {
            Ok(handle) => handle,
            Err(err) => {
                context.storage_queue.push_shutdown();
                let _ = pipeline::join_stage(Stage::Storage, storage);
                return Err(err);
            }
        };

        tracing::info!(
            target: tags::TARGET_FS,
            queue_capacity = config.queue_capacity,
            codec = context.codec.algo().as_str(),
            "filesystem started"
        );

        Ok(FileSystem {
            config,
            context,
            workers: Mutex::new(vec![(Stage::Storage, storage), (Stage::Codec, codec)]),
        })
    }
}

/// Asynchronous file access through a storage worker and a codec worker.
///
/// Requests return a [`WorkItem`] once admitted; the caller synchronizes on
/// it later. Submission blocks while `2 * queue_capacity` jobs are in flight
/// or the target queue is full. Reads always start on the storage stage; compressed writes start on
/// the codec stage. Dropping the filesystem shuts it down, waiting for every
/// admitted job to finish first.
pub struct FileSystem {
    config: FsConfig,
    context: Arc<PipelineContext>,
    workers: Mutex<Vec<(Stage, JoinHandle<()>)>>,
}

impl FileSystem {
    /// Starts a filesystem over the local disk with default collaborators.
    pub fn new(config: FsConfig) -> Result<Self> {
        Self::builder(config).spawn()
    }

    pub fn builder(config: FsConfig) -> FileSystemBuilder {
        FileSystemBuilder {
            config,
            backend: None,
            codec: None,
            telemetry: None,
            pool: None,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Pool used when a read does not bring its own.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.context.pool
    }

    /// Queues a read of `path`. Blocks only under backpressure.
    pub fn submit_read(&self, path: &str, options: ReadOptions) -> Result<WorkItem> {
        self.validate_path(path)?;
        let pool = options
            .pool
            .unwrap_or_else(|| Arc::clone(&self.context.pool));

        self.submit(
            Stage::Storage,
            JobSpec {
                op: JobOp::Read,
                path: Arc::from(path),
                payload: Payload::Empty,
                null_terminate: options.null_terminate,
                use_compression: options.use_compression,
                pool,
            },
        )
    }

    /// Queues a write of `data` to `path`, replacing any existing contents.
    pub fn submit_write(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        options: WriteOptions,
    ) -> Result<WorkItem> {
        self.validate_path(path)?;
        let stage = if options.use_compression {
            Stage::Codec
        } else {
            Stage::Storage
        };

        self.submit(
            stage,
            JobSpec {
                op: JobOp::Write,
                path: Arc::from(path),
                payload: Payload::Shared(data.into()),
                null_terminate: false,
                use_compression: options.use_compression,
                pool: Arc::clone(&self.context.pool),
            },
        )
    }

    /// Reads `path` and waits for the result.
    pub fn read(&self, path: &str, options: ReadOptions) -> Result<Completion> {
        self.submit_read(path, options)?.into_result()
    }

    /// Writes `data` to `path` and waits for the result.
    pub fn write(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        options: WriteOptions,
    ) -> Result<Completion> {
        self.submit_write(path, data, options)?.into_result()
    }

    pub fn runtime_snapshot(&self) -> PipelineSnapshot {
        self.context
            .state
            .snapshot(self.context.queue_depths())
    }

    pub fn is_running(&self) -> bool {
        self.context.state.is_accepting()
    }

    /// Stops accepting work, waits for every admitted job, then stops and
    /// joins both workers.
    ///
    /// Idempotent. Returns [`FsError::WorkerPanicked`] if a worker thread
    /// died abnormally.
    pub fn shutdown(&self) -> Result<()> {
        let mut workers = self.lock_workers();
        if workers.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            target: tags::TARGET_FS,
            in_flight = self.context.state.in_flight(),
            "draining before shutdown"
        );
        self.context.state.close_and_drain();
        self.context.storage_queue.push_shutdown();
        self.context.codec_queue.push_shutdown();

        let mut first_error = None;
        for (stage, handle) in workers.drain(..) {
            if let Err(err) = pipeline::join_stage(stage, handle) {
                tracing::error!(target: tags::TARGET_FS, %stage, error = %err, "worker join failed");
                first_error.get_or_insert(err);
            }
        }

        let snapshot = self.runtime_snapshot();
        tracing::debug!(
            target: tags::TARGET_FS,
            submitted = snapshot.submitted,
            failed = snapshot.failed,
            "filesystem stopped"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit(&self, stage: Stage, spec: JobSpec) -> Result<WorkItem> {
        self.context.state.begin_job()?;
        let (job, item) = Job::new(spec, Arc::clone(&self.context.state));
        self.context.queue(stage).submit(job)?;
        Ok(item)
    }

    fn validate_path(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(FsError::InvalidPath("path is empty".to_string()));
        }
        if path.len() > self.config.max_path_len {
            return Err(FsError::InvalidPath(format!(
                "path is {} bytes, limit is {}",
                path.len(),
                self.config.max_path_len
            )));
        }
        if path.contains('\0') {
            return Err(FsError::InvalidPath("path contains a NUL byte".to_string()));
        }
        Ok(())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<(Stage, JoinHandle<()>)>> {
        match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(target: tags::TARGET_FS, error = %err, "shutdown on drop failed");
        }
    }
}
