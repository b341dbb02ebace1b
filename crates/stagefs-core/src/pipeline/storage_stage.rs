use std::io::{self, Write};

use crate::pipeline::job::{Job, Payload};
use crate::pipeline::{PipelineContext, Step};
use crate::storage;
use crate::telemetry::{self, tags};
use crate::types::{JobOp, Result, Stage};

/// Raw reads and writes against the backend.
///
/// A compressed read leaves this stage holding the frame bytes and continues
/// on the codec stage; everything else completes here.
pub(crate) fn process(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    match job.op {
        JobOp::Read => read(context, job),
        JobOp::Write => write(context, job),
    }
}

fn read(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    let mut handle = context.backend.open_read(&job.path)?;
    let size = usize::try_from(handle.size()?)
        .map_err(|_| io::Error::other("resource does not fit in memory"))?;

    // The codec stage terminates decompressed output itself.
    let terminate = job.null_terminate && !job.use_compression;
    let mut buffer = job.pool.try_acquire(size + usize::from(terminate))?;
    let bytes = buffer.as_mut_vec();
    bytes.resize(size, 0);
    let read = storage::read_full(handle.as_mut(), bytes)?;
    bytes.truncate(read);
    if terminate {
        bytes.push(0);
    }
    drop(handle);

    telemetry::increment_counter(tags::METRIC_STORAGE_READ_BYTES, read as u64, &[("op", "read")]);
    job.size = read;
    job.payload = Payload::Pooled(buffer);

    if job.use_compression {
        Ok(Step::HandOff(Stage::Codec))
    } else {
        Ok(Step::Complete)
    }
}

fn write(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    let mut handle = context.backend.open_write(&job.path)?;
    let written = job.size;
    handle.write_all(&job.payload.as_slice()[..written])?;
    handle.close()?;

    telemetry::increment_counter(tags::METRIC_STORAGE_WRITE_BYTES, written as u64, &[("op", "write")]);
    Ok(Step::Complete)
}
