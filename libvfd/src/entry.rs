use crate::dir::OpenDirectory;
use crate::error::{Error, Result};
use crate::file::OpenFile;
use crate::handle::{EntryKind, Handle};

/// Whatever a descriptor refers to.
pub enum OpenEntry {
    File(OpenFile),
    Directory(OpenDirectory),
}

impl OpenEntry {
    pub(crate) fn from_handle(path: String, handle: Handle) -> Self {
        match handle {
            Handle::File(f) => OpenEntry::File(OpenFile::new(path, f)),
            Handle::Directory(d) => OpenEntry::Directory(OpenDirectory::new(path, d)),
        }
    }

    /// Path the entry was opened under.
    pub fn path(&self) -> &str {
        match self {
            OpenEntry::File(f) => f.path(),
            OpenEntry::Directory(d) => d.path(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            OpenEntry::File(_) => EntryKind::File,
            OpenEntry::Directory(_) => EntryKind::Directory,
        }
    }

    pub fn as_file(&mut self) -> Result<&mut OpenFile> {
        match self {
            OpenEntry::File(f) => Ok(f),
            OpenEntry::Directory(_) => Err(Error::IsDirectory),
        }
    }

    pub fn as_dir(&self) -> Result<&OpenDirectory> {
        match self {
            OpenEntry::Directory(d) => Ok(d),
            OpenEntry::File(_) => Err(Error::NotDirectory),
        }
    }

    pub fn as_dir_mut(&mut self) -> Result<&mut OpenDirectory> {
        match self {
            OpenEntry::Directory(d) => Ok(d),
            OpenEntry::File(_) => Err(Error::NotDirectory),
        }
    }

    /// Flushes files; directories have nothing to release.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            OpenEntry::File(f) => f.close().await,
            OpenEntry::Directory(_) => Ok(()),
        }
    }
}
