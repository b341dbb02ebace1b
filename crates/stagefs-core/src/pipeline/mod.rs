//! Two-stage job pipeline: a storage worker and a codec worker, each fed by
//! its own [`StageQueue`](queue::StageQueue).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::buffer::BufferPool;
use crate::compression::{self, Codec};
use crate::error::FsError;
use crate::storage::StorageBackend;
use crate::telemetry::StageTelemetry;
use crate::types::{CompressionAlgo, Result, Stage};

pub(crate) mod codec_stage;
pub(crate) mod job;
pub(crate) mod queue;
pub(crate) mod state;
pub(crate) mod storage_stage;

pub use job::{Completion, Payload, WorkItem};
pub use state::{PipelineSnapshot, StageSnapshot};

use job::Job;
use queue::StageQueue;
use state::{PipelineState, StageOutcome};

/// What a stage decided for the job it just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Complete,
    HandOff(Stage),
}

/// Everything the two workers share. Owned by the facade.
pub(crate) struct PipelineContext {
    pub(crate) storage_queue: StageQueue,
    pub(crate) codec_queue: StageQueue,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) telemetry: Arc<dyn StageTelemetry>,
    pub(crate) state: Arc<PipelineState>,
    pub(crate) max_decompressed_size: usize,
}

impl PipelineContext {
    pub(crate) fn queue(&self, stage: Stage) -> &StageQueue {
        match stage {
            Stage::Storage => &self.storage_queue,
            Stage::Codec => &self.codec_queue,
        }
    }

    /// Codec able to decode frames tagged with `algo`. Prefers the configured
    /// codec so custom implementations see both directions.
    pub(crate) fn codec_for(&self, algo: CompressionAlgo) -> Arc<dyn Codec> {
        if self.codec.algo() == algo {
            Arc::clone(&self.codec)
        } else {
            compression::codec_for(algo)
        }
    }

    pub(crate) fn queue_depths(&self) -> [usize; 2] {
        [self.storage_queue.depth(), self.codec_queue.depth()]
    }

    /// Pops jobs for `stage` until the sentinel arrives.
    fn run_stage(&self, stage: Stage, handler: fn(&PipelineContext, &mut Job) -> Result<Step>) {
        let queue = self.queue(stage);
        tracing::debug!(%stage, "stage worker started");

        while let Some(job) = queue.next() {
            self.telemetry.on_queue_depth(stage, queue.depth());
            // A panic outside the handler drops the job, which completes it
            // as abandoned; the worker keeps serving.
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| self.process(stage, job, handler)))
            {
                tracing::error!(
                    %stage,
                    details = %panic_message(payload.as_ref()),
                    "stage worker recovered from panic"
                );
            }
        }

        tracing::debug!(%stage, "stage worker stopped");
    }

    fn process(
        &self,
        stage: Stage,
        mut job: Job,
        handler: fn(&PipelineContext, &mut Job) -> Result<Step>,
    ) {
        let op = job.op;
        let path = Arc::clone(&job.path);
        self.telemetry.on_job_started(stage, op, &path);
        let started_at = Instant::now();

        let step = match catch_unwind(AssertUnwindSafe(|| handler(self, &mut job))) {
            Ok(step) => step,
            Err(payload) => {
                let details = panic_message(payload.as_ref());
                tracing::error!(%stage, %op, path = &*path, %details, "stage handler panicked");
                Err(FsError::WorkerPanicked(details))
            }
        };
        let elapsed = started_at.elapsed();

        match step {
            Ok(Step::Complete) => {
                self.state
                    .record_stage(stage, StageOutcome::Completed, elapsed);
                self.telemetry.on_job_finished(stage, op, &path, elapsed);
                job.complete(Ok(()));
            }
            Ok(Step::HandOff(next)) => {
                self.state
                    .record_stage(stage, StageOutcome::HandedOff, elapsed);
                self.telemetry.on_job_finished(stage, op, &path, elapsed);
                self.telemetry.on_handoff(stage, next, op, &path);
                self.queue(next).handoff(job);
            }
            Err(err) => {
                self.state.record_stage(stage, StageOutcome::Failed, elapsed);
                self.telemetry
                    .on_job_failed(stage, op, &path, elapsed, err.code());
                job.complete(Err(err));
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Spawns the worker for `stage` on a named thread.
pub(crate) fn spawn_stage(context: Arc<PipelineContext>, stage: Stage) -> Result<JoinHandle<()>> {
    let handler: fn(&PipelineContext, &mut Job) -> Result<Step> = match stage {
        Stage::Storage => storage_stage::process,
        Stage::Codec => codec_stage::process,
    };

    thread::Builder::new()
        .name(format!("stagefs-{stage}"))
        .spawn(move || context.run_stage(stage, handler))
        .map_err(|err| FsError::from(err).with_context(format!("spawning {stage} worker")))
}

/// Joins a worker, turning a panic into an error.
pub(crate) fn join_stage(stage: Stage, handle: JoinHandle<()>) -> Result<()> {
    handle.join().map_err(|payload| {
        FsError::WorkerPanicked(format!(
            "{stage} worker: {}",
            panic_message(payload.as_ref())
        ))
    })
}
