use thiserror::Error;

/// Generic backend failure with no OS error code attached.
pub const CODE_IO: i32 = -1;
/// Reserved code for compression, decompression and frame failures.
pub const CODE_CODEC: i32 = -2;
/// Buffer allocation refused by the pool.
pub const CODE_OUT_OF_MEMORY: i32 = -3;
pub const CODE_INVALID_PATH: i32 = -4;
pub const CODE_SHUTDOWN: i32 = -5;
/// The pipeline lost the job before driving it to a terminal state.
pub const CODE_ABANDONED: i32 = -6;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("decompressed size {declared} exceeds capacity {capacity}")]
    CapacityExceeded { declared: usize, capacity: usize },
    #[error("checksum mismatch (expected {expected:#010x}, actual {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("out of memory: requested {requested} bytes with {outstanding} of {budget} in use")]
    OutOfMemory {
        requested: usize,
        outstanding: usize,
        budget: usize,
    },
    #[error("filesystem is shutting down; no new work accepted")]
    ShuttingDown,
    #[error("job was dropped by the pipeline before completion")]
    Abandoned,
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FsError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FsError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Integer status recorded on a failed job. Always nonzero.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(err) => match err.raw_os_error() {
                Some(code) if code != 0 => code,
                _ => CODE_IO,
            },
            Self::InvalidFrame(_)
            | Self::CompressionError(_)
            | Self::DecompressionError(_)
            | Self::CapacityExceeded { .. }
            | Self::ChecksumMismatch { .. } => CODE_CODEC,
            Self::OutOfMemory { .. } => CODE_OUT_OF_MEMORY,
            Self::InvalidPath(_) => CODE_INVALID_PATH,
            Self::ShuttingDown => CODE_SHUTDOWN,
            Self::Abandoned | Self::WorkerPanicked(_) => CODE_ABANDONED,
            Self::Context { source, .. } => source.code(),
            Self::Other(_) => CODE_IO,
        }
    }
}
