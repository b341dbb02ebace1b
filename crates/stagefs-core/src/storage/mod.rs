//! Raw storage backends used by the storage stage.

use std::io::{self, Read, Write};

mod local;

pub use local::LocalStorage;

/// Named-resource storage the storage worker reads from and writes to.
///
/// Paths are opaque identifiers; the facade validates their length but
/// never interprets them.
pub trait StorageBackend: Send + Sync {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn ReadHandle>>;

    /// Opens `path` for writing with create/truncate semantics.
    fn open_write(&self, path: &str) -> io::Result<Box<dyn WriteHandle>>;
}

pub trait ReadHandle: Read + Send {
    /// Current size of the resource in bytes.
    fn size(&self) -> io::Result<u64>;
}

pub trait WriteHandle: Write + Send {
    /// Flushes and closes the resource. Errors here fail the job.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Reads until `buf` is full or the handle reports end of input.
pub(crate) fn read_full(handle: &mut dyn ReadHandle, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
