//! Descriptor table: maps fds to open entries.
//!
//! Fds 0-2 belong to the dispatch layer and are never handed out here.
//! Preopens occupy `FIRST_PREOPEN_FD..first_non_preopen`; everything opened
//! later gets the next value of a counter that only moves forward.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::Fd;
use crate::dir::OpenDirectory;
use crate::entry::OpenEntry;
use crate::error::{Error, Result};
use crate::flags::{FileOrDir, OpenFlags};
use crate::handle::DirectoryHandle;
use crate::preopen;

pub const FIRST_PREOPEN_FD: Fd = 3;

pub struct FdTable {
    entries: HashMap<Fd, OpenEntry>,
    next_fd: Fd,
    first_non_preopen: Fd,
}

impl FdTable {
    /// Register `preopens` in order as fds 3, 4, ...
    pub fn new<I, P>(preopens: I) -> Self
    where
        I: IntoIterator<Item = (P, Arc<dyn DirectoryHandle>)>,
        P: Into<String>,
    {
        let mut table = Self {
            entries: HashMap::new(),
            next_fd: FIRST_PREOPEN_FD,
            first_non_preopen: FIRST_PREOPEN_FD,
        };
        for (path, handle) in preopens {
            let path = path.into();
            let fd = table.insert(OpenEntry::Directory(OpenDirectory::new(path, handle)));
            debug!(fd, path = table.entries[&fd].path(), "registered preopen");
        }
        table.first_non_preopen = table.next_fd;
        table
    }

    fn insert(&mut self, entry: OpenEntry) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.entries.insert(fd, entry);
        fd
    }

    /// Open `path` relative to the directory at `dir_fd` and return a new fd.
    #[instrument(skip(self), level = "debug")]
    pub async fn open(
        &mut self,
        dir_fd: Fd,
        path: &str,
        mode: FileOrDir,
        flags: OpenFlags,
    ) -> Result<Fd> {
        let dir = self.get(dir_fd)?.as_dir()?;
        let handle = dir.get_file_or_dir(path, mode, flags).await?;
        let full_path = format!("{}/{}", dir.path(), path);
        let fd = self.insert(OpenEntry::from_handle(full_path, handle));
        debug!(fd, kind = ?self.entries[&fd].kind(), "opened");
        Ok(fd)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenEntry> {
        self.entries.get(&fd).ok_or(Error::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenEntry> {
        self.entries.get_mut(&fd).ok_or(Error::BadDescriptor(fd))
    }

    /// Like [`FdTable::get`], but only for fds in the preopen range.
    pub fn get_preopen(&self, fd: Fd) -> Result<&OpenDirectory> {
        if !self.is_preopen_fd(fd) {
            return Err(Error::BadDescriptor(fd));
        }
        self.get(fd)?.as_dir()
    }

    fn is_preopen_fd(&self, fd: Fd) -> bool {
        (FIRST_PREOPEN_FD..self.first_non_preopen).contains(&fd)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn close(&mut self, fd: Fd) -> Result<()> {
        let mut entry = self.entries.remove(&fd).ok_or(Error::BadDescriptor(fd))?;
        entry.close().await
    }

    /// Move the entry at `from` to `to`, closing whatever `to` held.
    #[instrument(skip(self), level = "debug")]
    pub async fn renumber(&mut self, from: Fd, to: Fd) -> Result<()> {
        if !self.entries.contains_key(&from) {
            return Err(Error::BadDescriptor(from));
        }
        if to < FIRST_PREOPEN_FD {
            return Err(Error::BadDescriptor(to));
        }
        if from == to {
            return Ok(());
        }
        if let Some(mut evicted) = self.entries.remove(&to) {
            evicted.close().await?;
        }
        let entry = self
            .entries
            .remove(&from)
            .ok_or(Error::BadDescriptor(from))?;
        self.entries.insert(to, entry);
        // Keep future allocations clear of `to`.
        self.next_fd = self.next_fd.max(to.saturating_add(1));
        Ok(())
    }

    /// Find the preopen covering `path`; see [`preopen::find_rel_path`].
    pub fn find_rel_path(&self, path: &str) -> Result<(Fd, String)> {
        let candidates = (FIRST_PREOPEN_FD..self.first_non_preopen)
            .rev()
            .filter_map(|fd| match self.entries.get(&fd) {
                Some(OpenEntry::Directory(d)) => Some((fd, d.path())),
                _ => None,
            });
        preopen::find_rel_path(candidates, path)
    }

    /// Live preopen slots in fd order.
    pub fn preopens(&self) -> impl Iterator<Item = (Fd, &str)> + '_ {
        (FIRST_PREOPEN_FD..self.first_non_preopen).filter_map(|fd| {
            self.get_preopen(fd).ok().map(|d| (fd, d.path()))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
