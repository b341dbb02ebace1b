//! Stable names for tracing targets and metrics.

/// Tracing target for facade-level events (submission, shutdown).
pub const TARGET_FS: &str = "stagefs::fs";
/// Tracing target for the storage worker.
pub const TARGET_STORAGE: &str = "stagefs::storage";
/// Tracing target for the codec worker.
pub const TARGET_CODEC: &str = "stagefs::codec";
pub const TARGET_BUFFER: &str = "stagefs::buffer";

pub const METRIC_JOB_SUBMIT_COUNT: &str = "stagefs.job.submit.count";
pub const METRIC_JOB_COMPLETE_COUNT: &str = "stagefs.job.complete.count";
pub const METRIC_JOB_FAIL_COUNT: &str = "stagefs.job.fail.count";
pub const METRIC_JOB_LATENCY_US: &str = "stagefs.job.latency_us";
pub const METRIC_JOB_IN_FLIGHT: &str = "stagefs.job.in_flight";

pub const METRIC_STAGE_TASK_START_COUNT: &str = "stagefs.stage.task.start.count";
pub const METRIC_STAGE_TASK_FINISH_COUNT: &str = "stagefs.stage.task.finish.count";
pub const METRIC_STAGE_TASK_FAIL_COUNT: &str = "stagefs.stage.task.fail.count";
pub const METRIC_STAGE_TASK_LATENCY_US: &str = "stagefs.stage.task.latency_us";
pub const METRIC_STAGE_QUEUE_DEPTH: &str = "stagefs.stage.queue.depth";
pub const METRIC_STAGE_QUEUE_DEPTH_HIST: &str = "stagefs.stage.queue.depth.hist";

pub const METRIC_STORAGE_READ_BYTES: &str = "stagefs.storage.read.bytes";
pub const METRIC_STORAGE_WRITE_BYTES: &str = "stagefs.storage.write.bytes";

pub const METRIC_CODEC_INPUT_BYTES: &str = "stagefs.codec.input.bytes";
pub const METRIC_CODEC_OUTPUT_BYTES: &str = "stagefs.codec.output.bytes";

pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "stagefs.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "stagefs.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_ACQUIRE_REJECTED_COUNT: &str = "stagefs.buffer.acquire.rejected.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "stagefs.buffer.recycle.dropped.count";
pub const METRIC_BUFFER_OUTSTANDING_BYTES: &str = "stagefs.buffer.outstanding_bytes";
