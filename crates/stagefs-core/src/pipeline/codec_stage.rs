use crate::compression::{FRAME_HEADER_LEN, FrameHeader, frame};
use crate::error::FsError;
use crate::pipeline::job::{Job, Payload};
use crate::pipeline::{PipelineContext, Step};
use crate::telemetry::{self, tags};
use crate::types::{JobOp, Result, Stage};

/// Compresses writes before storage and decompresses reads after it.
pub(crate) fn process(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    match job.op {
        JobOp::Read => decompress(context, job),
        JobOp::Write => compress(context, job),
    }
}

fn decompress(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    let frame_bytes = &job.payload.as_slice()[..job.size];
    let header = FrameHeader::decode(frame_bytes)?;
    let declared = header.checked_len(context.max_decompressed_size)?;

    let mut buffer = job
        .pool
        .try_acquire(declared + usize::from(job.null_terminate))?;
    let codec = context.codec_for(header.algo);
    frame::decode_into(&header, codec.as_ref(), frame_bytes, buffer.as_mut_vec())?;
    if job.null_terminate {
        buffer.as_mut_vec().push(0);
    }

    let labels = [("op", "decompress"), ("codec", header.algo.as_str())];
    telemetry::increment_counter(tags::METRIC_CODEC_INPUT_BYTES, frame_bytes.len() as u64, &labels);
    telemetry::increment_counter(tags::METRIC_CODEC_OUTPUT_BYTES, declared as u64, &labels);

    // Replacing the payload drops the frame buffer back into its pool.
    job.payload = Payload::Pooled(buffer);
    job.size = declared;
    Ok(Step::Complete)
}

fn compress(context: &PipelineContext, job: &mut Job) -> Result<Step> {
    let input = &job.payload.as_slice()[..job.size];
    let codec = context.codec.as_ref();

    let reserved = FRAME_HEADER_LEN + codec.max_compressed_size(input.len());
    let mut buffer = context.pool.try_acquire(reserved)?;
    frame::encode_into(codec, input, buffer.as_mut_vec())?;

    // The pool only accounts for the reservation.
    let compressed = buffer.len();
    if compressed > reserved {
        return Err(FsError::CompressionError(format!(
            "{} codec produced {compressed} bytes, bound was {reserved}",
            codec.algo().as_str()
        )));
    }

    let labels = [("op", "compress"), ("codec", codec.algo().as_str())];
    telemetry::increment_counter(tags::METRIC_CODEC_INPUT_BYTES, input.len() as u64, &labels);
    telemetry::increment_counter(tags::METRIC_CODEC_OUTPUT_BYTES, compressed as u64, &labels);

    job.payload = Payload::Pooled(buffer);
    job.size = compressed;
    Ok(Step::HandOff(Stage::Storage))
}
