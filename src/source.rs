//! Document sources and result consumers.
//!
//! A [`DocumentSource`] is read lazily: the worker that dispatches a job calls
//! [`DocumentSource::load`] only when the job starts running. The converted
//! document is handed to a [`ResultConsumer`].

use crate::error::ConverterError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lazily readable provider of the document to convert.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Reads the complete document.
    async fn load(&self) -> io::Result<Bytes>;

    /// Called once the document was sent to the conversion server.
    fn on_consumed(&self) {}
}

#[async_trait]
impl DocumentSource for Bytes {
    async fn load(&self) -> io::Result<Bytes> {
        Ok(self.clone())
    }
}

#[async_trait]
impl DocumentSource for Vec<u8> {
    async fn load(&self) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(self))
    }
}

#[async_trait]
impl DocumentSource for &'static [u8] {
    async fn load(&self) -> io::Result<Bytes> {
        Ok(Bytes::from_static(*self))
    }
}

/// Document read from a file when the job is dispatched.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    delete_after_conversion: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delete_after_conversion: false,
        }
    }

    /// Removes the file once its content was sent to the server.
    pub fn delete_after_conversion(mut self) -> Self {
        self.delete_after_conversion = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    async fn load(&self) -> io::Result<Bytes> {
        let content = tokio::fs::read(&self.path).await?;
        debug!(path = %self.path.display(), bytes = content.len(), "Loaded document source");
        Ok(Bytes::from(content))
    }

    fn on_consumed(&self) {
        if self.delete_after_conversion {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to delete consumed source file");
            }
        }
    }
}

/// Receives the outcome of a conversion job.
///
/// Exactly one of the three callbacks is invoked per execution.
pub trait ResultConsumer: Send + Sync {
    /// Receives the converted document.
    fn on_complete(&self, output: Bytes) -> io::Result<()>;

    /// The job was cancelled before producing a result.
    fn on_cancel(&self) {}

    /// The job failed or the server rejected the document.
    fn on_exception(&self, _error: &ConverterError) {}
}

impl<F> ResultConsumer for F
where
    F: Fn(Bytes) -> io::Result<()> + Send + Sync,
{
    fn on_complete(&self, output: Bytes) -> io::Result<()> {
        self(output)
    }
}

/// Writes the converted document to a file.
#[derive(Debug, Clone)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultConsumer for FileTarget {
    fn on_complete(&self, output: Bytes) -> io::Result<()> {
        std::fs::write(&self.path, &output)?;
        debug!(path = %self.path.display(), bytes = output.len(), "Wrote converted document");
        Ok(())
    }
}
