//! Capability handle contract consumed from a storage backend.
//!
//! A backend hands out unforgeable references to files and directories. The
//! contract is deliberately narrow: there is no seek, no truncate-on-open and
//! directory enumeration is a one-shot forward stream. Everything POSIX-like is
//! layered on top in [`crate::file`], [`crate::dir`] and [`crate::table`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::BackendError;

/// Lazily produced children of a directory.
pub type EntryStream = BoxStream<'static, Result<Handle, BackendError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// How a write stream treats the content that already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Start from an empty file.
    Truncate,
    /// Start from the current content.
    KeepExisting,
}

#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Start a fresh enumeration of the children.
    async fn entries(&self) -> Result<EntryStream, BackendError>;

    /// Look up, or with `create` make, a file child.
    ///
    /// Fails with [`BackendError::TypeMismatch`] when `name` is a directory.
    async fn get_file(&self, name: &str, create: bool)
    -> Result<Arc<dyn FileHandle>, BackendError>;

    /// Look up, or with `create` make, a directory child.
    ///
    /// Fails with [`BackendError::TypeMismatch`] when `name` is a file.
    async fn get_directory(
        &self,
        name: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, BackendError>;

    async fn remove_entry(&self, name: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait FileHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Immutable view of the committed content.
    async fn snapshot(&self) -> Result<Bytes, BackendError>;

    async fn create_writable(&self, mode: WriteMode)
    -> Result<Box<dyn WriteStream>, BackendError>;
}

/// Buffered writer; nothing is visible through [`FileHandle::snapshot`] until
/// [`WriteStream::close`] returns.
#[async_trait]
pub trait WriteStream: Send {
    async fn write_at(&mut self, position: u64, data: &[u8]) -> Result<(), BackendError>;

    /// Shrink or zero-extend to exactly `size` bytes.
    async fn truncate(&mut self, size: u64) -> Result<(), BackendError>;

    async fn close(&mut self) -> Result<(), BackendError>;
}

/// A capability for either kind of entry.
#[derive(Clone)]
pub enum Handle {
    File(Arc<dyn FileHandle>),
    Directory(Arc<dyn DirectoryHandle>),
}

impl Handle {
    pub fn name(&self) -> &str {
        match self {
            Handle::File(f) => f.name(),
            Handle::Directory(d) => d.name(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Handle::File(_) => EntryKind::File,
            Handle::Directory(_) => EntryKind::Directory,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

fn out_of_range(value: impl fmt::Display) -> BackendError {
    BackendError::Other(format!("offset {value} out of range"))
}

fn offset(value: u64) -> Result<usize, BackendError> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v <= isize::MAX as usize)
        .ok_or_else(|| out_of_range(value))
}

/// Grow `buf` with zeroes to `len`, failing instead of aborting when the
/// allocation is impossible.
fn zero_extend(buf: &mut Vec<u8>, len: usize) -> Result<(), BackendError> {
    if len > buf.len() {
        buf.try_reserve(len - buf.len())
            .map_err(|e| BackendError::Other(format!("cannot grow to {len} bytes: {e}")))?;
    }
    buf.resize(len, 0);
    Ok(())
}

/// Positioned write into a staging buffer, zero-filling any gap.
pub(crate) fn stage_write(buf: &mut Vec<u8>, position: u64, data: &[u8]) -> Result<(), BackendError> {
    let start = offset(position)?;
    let end = start
        .checked_add(data.len())
        .filter(|&end| end <= isize::MAX as usize)
        .ok_or_else(|| out_of_range(format!("{position}+{}", data.len())))?;
    if buf.len() < end {
        zero_extend(buf, end)?;
    }
    buf[start..end].copy_from_slice(data);
    Ok(())
}

pub(crate) fn stage_resize(buf: &mut Vec<u8>, size: u64) -> Result<(), BackendError> {
    zero_extend(buf, offset(size)?)
}
