use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, Result};
use crate::handle::{FileHandle, WriteMode, WriteStream};

/// An open regular file: one shared cursor plus a lazily opened writer.
///
/// Writes stay buffered in the backend until [`OpenFile::flush`]; every read
/// path flushes first so it observes them.
pub struct OpenFile {
    path: String,
    handle: Arc<dyn FileHandle>,
    position: u64,
    writer: Option<Box<dyn WriteStream>>,
}

impl OpenFile {
    pub fn new(path: String, handle: Arc<dyn FileHandle>) -> Self {
        Self {
            path,
            handle,
            position: 0,
            writer: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> &Arc<dyn FileHandle> {
        &self.handle
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Committed content, after pushing out any pending writes.
    pub async fn get_file(&mut self) -> Result<Bytes> {
        self.flush().await?;
        Ok(self.handle.snapshot().await?)
    }

    /// Read up to `len` bytes at the cursor. Short (or empty) at end of file.
    pub async fn read(&mut self, len: usize) -> Result<Bytes> {
        let content = self.get_file().await?;
        let size = content.len() as u64;
        let start = self.position.min(size) as usize;
        let end = self.position.saturating_add(len as u64).min(size) as usize;
        let chunk = content.slice(start..end);
        self.position += chunk.len() as u64;
        trace!(path = %self.path, position = self.position, n = chunk.len(), "read");
        Ok(chunk)
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let position = self.position;
        let end = position.checked_add(data.len() as u64).ok_or_else(|| {
            Error::InvalidArgument(format!("write of {} bytes at {position}", data.len()))
        })?;
        self.writer().await?.write_at(position, data).await?;
        self.position = end;
        trace!(path = %self.path, position = self.position, n = data.len(), "write");
        Ok(())
    }

    /// Resize to exactly `size` bytes. The cursor does not move.
    pub async fn set_size(&mut self, size: u64) -> Result<()> {
        self.writer().await?.truncate(size).await?;
        Ok(())
    }

    pub async fn size(&mut self) -> Result<u64> {
        Ok(self.get_file().await?.len() as u64)
    }

    /// Move the cursor. Seeking past the end is allowed; a later write
    /// zero-fills the gap.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::Current(delta) => (self.position, delta),
            SeekFrom::End(delta) => (self.size().await?, delta),
        };
        self.position = base
            .checked_add_signed(delta)
            .ok_or_else(|| Error::InvalidArgument(format!("seek to {base} + {delta}")))?;
        Ok(self.position)
    }

    pub async fn flush(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.close().await?;
            trace!(path = %self.path, "flushed");
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.flush().await
    }

    async fn writer(&mut self) -> Result<&mut Box<dyn WriteStream>> {
        if self.writer.is_none() {
            let writer = self.handle.create_writable(WriteMode::KeepExisting).await?;
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or(Error::Internal("write stream vanished"))
    }
}
