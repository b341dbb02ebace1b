use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::error::FsError;
use crate::pipeline::job::Job;
use crate::types::Result;

pub(crate) enum Envelope {
    Job(Job),
    /// No more work; the worker exits when it pops this.
    Shutdown,
}

/// Input of one stage worker.
///
/// Callers push onto the bounded submission lane and block while it is full.
/// The other stage pushes onto the unbounded handoff lane, which the worker
/// drains first. Keeping worker-to-worker traffic off the bounded lane means
/// the two workers can never block on each other. The handoff lane is capped
/// by the in-flight limit enforced at admission, not by its channel.
pub(crate) struct StageQueue {
    submit_tx: Sender<Envelope>,
    submit_rx: Receiver<Envelope>,
    handoff_tx: Sender<Job>,
    handoff_rx: Receiver<Job>,
}

impl StageQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (submit_tx, submit_rx) = bounded(capacity.max(1));
        let (handoff_tx, handoff_rx) = unbounded();
        Self {
            submit_tx,
            submit_rx,
            handoff_tx,
            handoff_rx,
        }
    }

    /// Pushes a caller's job, blocking while the lane is full.
    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        self.submit_tx
            .send(Envelope::Job(job))
            .map_err(|_| FsError::ShuttingDown)
    }

    /// Pushes a job coming from the other stage. Never blocks.
    pub(crate) fn handoff(&self, job: Job) {
        // Both ends live in `self`, so the send cannot fail while we exist.
        let _ = self.handoff_tx.send(job);
    }

    pub(crate) fn push_shutdown(&self) {
        let _ = self.submit_tx.send(Envelope::Shutdown);
    }

    /// Blocks for the next job; `None` once the sentinel is popped.
    pub(crate) fn next(&self) -> Option<Job> {
        if let Ok(job) = self.handoff_rx.try_recv() {
            return Some(job);
        }

        select! {
            recv(self.handoff_rx) -> job => job.ok(),
            recv(self.submit_rx) -> envelope => match envelope {
                Ok(Envelope::Job(job)) => Some(job),
                Ok(Envelope::Shutdown) | Err(_) => None,
            },
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.submit_rx.len() + self.handoff_rx.len()
    }
}
