pub mod buffer;
pub mod compression;
pub mod config;
pub mod error;
pub mod fs;
pub mod pipeline;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use buffer::{BufferPool, PoolMetricsSnapshot, PooledBuffer};
pub use compression::{Codec, DeflateCodec, Lz4Codec};
pub use config::FsConfig;
pub use error::FsError;
pub use fs::{FileSystem, FileSystemBuilder, ReadOptions, WriteOptions};
pub use pipeline::{Completion, Payload, PipelineSnapshot, StageSnapshot, WorkItem};
pub use storage::{LocalStorage, ReadHandle, StorageBackend, WriteHandle};
pub use telemetry::{DefaultStageTelemetry, StageTelemetry};
pub use types::{CompressionAlgo, JobOp, Result, Stage};
