use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{ReadHandle, StorageBackend, WriteHandle};

/// Backend over the local filesystem.
///
/// Paths are used as given unless a root is configured, in which case
/// relative paths are resolved against it.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    root: Option<PathBuf>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl StorageBackend for LocalStorage {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn ReadHandle>> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn WriteHandle>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.resolve(path))?;
        Ok(Box::new(file))
    }
}

impl ReadHandle for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl WriteHandle for File {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }
}
