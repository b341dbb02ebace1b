use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::FsError;
use crate::telemetry::{self, tags};
use crate::types::{Result, Stage, duration_to_us};

#[derive(Debug)]
struct Gate {
    accepting: bool,
    in_flight: usize,
}

#[derive(Debug, Default)]
struct StageCounters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    handed_off: AtomicUsize,
    busy_us: AtomicU64,
}

/// Shared bookkeeping for one filesystem instance.
///
/// Admission and the in-flight count live under one lock so that shutdown
/// cannot race a submission that has already been admitted. At most
/// `max_in_flight` jobs are admitted at once, which also bounds how many
/// jobs can sit in either handoff lane.
#[derive(Debug)]
pub(crate) struct PipelineState {
    started_at: Instant,
    max_in_flight: usize,
    gate: Mutex<Gate>,
    drained: Condvar,
    room: Condvar,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    stages: [StageCounters; 2],
}

impl PipelineState {
    pub(crate) fn new(max_in_flight: usize) -> Self {
        Self {
            started_at: Instant::now(),
            max_in_flight: max_in_flight.max(1),
            gate: Mutex::new(Gate {
                accepting: true,
                in_flight: 0,
            }),
            drained: Condvar::new(),
            room: Condvar::new(),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            stages: Default::default(),
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        match self.gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admits one job, or fails once shutdown has begun.
    ///
    /// Blocks while `max_in_flight` jobs are already admitted.
    pub(crate) fn begin_job(&self) -> Result<()> {
        let mut gate = self.lock_gate();
        loop {
            if !gate.accepting {
                return Err(FsError::ShuttingDown);
            }
            if gate.in_flight < self.max_in_flight {
                break;
            }
            gate = match self.room.wait(gate) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        gate.in_flight += 1;
        drop(gate);

        self.submitted.fetch_add(1, Ordering::AcqRel);
        telemetry::increment_counter(tags::METRIC_JOB_SUBMIT_COUNT, 1, &[]);
        telemetry::add_gauge(tags::METRIC_JOB_IN_FLIGHT, 1, &[]);
        Ok(())
    }

    pub(crate) fn job_finished(&self, success: bool, latency: Duration) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        if success {
            telemetry::increment_counter(tags::METRIC_JOB_COMPLETE_COUNT, 1, &[]);
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
            telemetry::increment_counter(tags::METRIC_JOB_FAIL_COUNT, 1, &[]);
        }
        telemetry::record_histogram(tags::METRIC_JOB_LATENCY_US, duration_to_us(latency), &[]);
        telemetry::sub_gauge_saturating(tags::METRIC_JOB_IN_FLIGHT, 1, &[]);

        let mut gate = self.lock_gate();
        gate.in_flight = gate.in_flight.saturating_sub(1);
        self.room.notify_one();
        if gate.in_flight == 0 {
            self.drained.notify_all();
        }
    }

    /// Stops admitting jobs and blocks until every admitted job is terminal.
    pub(crate) fn close_and_drain(&self) {
        let mut gate = self.lock_gate();
        gate.accepting = false;
        self.room.notify_all();
        while gate.in_flight > 0 {
            gate = match self.drained.wait(gate) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.lock_gate().accepting
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock_gate().in_flight
    }

    pub(crate) fn record_stage(&self, stage: Stage, outcome: StageOutcome, busy: Duration) {
        let counters = &self.stages[stage.index()];
        counters
            .busy_us
            .fetch_add(duration_to_us(busy), Ordering::AcqRel);
        match outcome {
            StageOutcome::Completed => counters.processed.fetch_add(1, Ordering::AcqRel),
            StageOutcome::HandedOff => {
                counters.processed.fetch_add(1, Ordering::AcqRel);
                counters.handed_off.fetch_add(1, Ordering::AcqRel)
            }
            StageOutcome::Failed => {
                counters.processed.fetch_add(1, Ordering::AcqRel);
                counters.failed.fetch_add(1, Ordering::AcqRel)
            }
        };
    }

    pub(crate) fn snapshot(&self, queue_depths: [usize; 2]) -> PipelineSnapshot {
        let elapsed = self.started_at.elapsed();
        let submitted = self.submitted.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);

        let stages = [Stage::Storage, Stage::Codec]
            .into_iter()
            .map(|stage| {
                let counters = &self.stages[stage.index()];
                let busy = Duration::from_micros(counters.busy_us.load(Ordering::Acquire));
                let utilization = if elapsed.is_zero() {
                    0.0
                } else {
                    (busy.as_secs_f64() / elapsed.as_secs_f64()).min(1.0)
                };
                StageSnapshot {
                    stage,
                    processed: counters.processed.load(Ordering::Acquire),
                    failed: counters.failed.load(Ordering::Acquire),
                    handed_off: counters.handed_off.load(Ordering::Acquire),
                    queue_depth: queue_depths[stage.index()],
                    busy,
                    utilization,
                }
            })
            .collect();

        PipelineSnapshot {
            elapsed,
            submitted,
            completed,
            failed: self.failed.load(Ordering::Acquire),
            in_flight: submitted.saturating_sub(completed),
            stages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    Completed,
    HandedOff,
    Failed,
}

/// Per-stage runtime metrics.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: Stage,
    /// Jobs this stage has finished working on, whatever the outcome.
    pub processed: usize,
    pub failed: usize,
    /// Jobs passed on to the other stage instead of completing here.
    pub handed_off: usize,
    pub queue_depth: usize,
    pub busy: Duration,
    pub utilization: f64,
}

/// Runtime metrics snapshot for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub elapsed: Duration,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub stages: Vec<StageSnapshot>,
}

impl PipelineSnapshot {
    pub fn stage(&self, stage: Stage) -> Option<&StageSnapshot> {
        self.stages.iter().find(|snapshot| snapshot.stage == stage)
    }
}
