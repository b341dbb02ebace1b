use std::time::Duration;

use crate::telemetry::{self, tags};
use crate::types::{JobOp, Stage, duration_to_us};

/// Telemetry contract for the pipeline stage workers.
///
/// Stage workers call these hooks around every job they process so metrics
/// and logs stay independent of a specific backend. Implementations must be
/// cheap; they run on the worker threads.
pub trait StageTelemetry: Send + Sync {
    fn on_queue_depth(&self, stage: Stage, depth: usize);
    fn on_job_started(&self, stage: Stage, op: JobOp, path: &str);
    fn on_job_finished(&self, stage: Stage, op: JobOp, path: &str, elapsed: Duration);
    fn on_job_failed(&self, stage: Stage, op: JobOp, path: &str, elapsed: Duration, code: i32);

    /// Called when a job leaves `from` for the other stage instead of completing.
    fn on_handoff(&self, from: Stage, to: Stage, op: JobOp, path: &str) {
        let _ = (from, to, op, path);
    }
}

/// Default implementation: registry metrics plus `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStageTelemetry;

impl StageTelemetry for DefaultStageTelemetry {
    fn on_queue_depth(&self, stage: Stage, depth: usize) {
        let labels = [("stage", stage.as_str()), ("op", "queue_depth")];
        telemetry::set_gauge(tags::METRIC_STAGE_QUEUE_DEPTH, depth as u64, &labels);
        telemetry::record_histogram(tags::METRIC_STAGE_QUEUE_DEPTH_HIST, depth as u64, &labels);
    }

    fn on_job_started(&self, stage: Stage, op: JobOp, path: &str) {
        telemetry::increment_counter(
            tags::METRIC_STAGE_TASK_START_COUNT,
            1,
            &[("stage", stage.as_str()), ("op", op.as_str())],
        );
        match stage {
            Stage::Storage => tracing::trace!(target: tags::TARGET_STORAGE, %op, path, "job started"),
            Stage::Codec => tracing::trace!(target: tags::TARGET_CODEC, %op, path, "job started"),
        }
    }

    fn on_job_finished(&self, stage: Stage, op: JobOp, path: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        let labels = [
            ("stage", stage.as_str()),
            ("op", op.as_str()),
            ("result", "ok"),
        ];
        telemetry::increment_counter(tags::METRIC_STAGE_TASK_FINISH_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_STAGE_TASK_LATENCY_US, elapsed_us, &labels);

        match stage {
            Stage::Storage => {
                tracing::trace!(target: tags::TARGET_STORAGE, %op, path, elapsed_us, "job finished")
            }
            Stage::Codec => {
                tracing::trace!(target: tags::TARGET_CODEC, %op, path, elapsed_us, "job finished")
            }
        }
    }

    fn on_job_failed(&self, stage: Stage, op: JobOp, path: &str, elapsed: Duration, code: i32) {
        let elapsed_us = duration_to_us(elapsed);
        let labels = [
            ("stage", stage.as_str()),
            ("op", op.as_str()),
            ("result", "error"),
        ];
        telemetry::increment_counter(tags::METRIC_STAGE_TASK_FAIL_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_STAGE_TASK_LATENCY_US, elapsed_us, &labels);

        match stage {
            Stage::Storage => {
                tracing::warn!(target: tags::TARGET_STORAGE, %op, path, code, elapsed_us, "job failed")
            }
            Stage::Codec => {
                tracing::warn!(target: tags::TARGET_CODEC, %op, path, code, elapsed_us, "job failed")
            }
        }
    }
}
