//! Open directories: path resolution under a capability root, POSIX open
//! flag handling and a resumable cursor over the backend's one-shot
//! enumeration.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, trace};

use crate::error::{BackendError, Error, Result};
use crate::flags::{FileOrDir, OpenFlags};
use crate::handle::{DirectoryHandle, EntryStream, Handle, WriteMode};

struct DirCursor {
    position: u64,
    reverted: Option<Handle>,
    entries: EntryStream,
}

pub struct OpenDirectory {
    path: String,
    handle: Arc<dyn DirectoryHandle>,
    cursor: Option<DirCursor>,
}

impl OpenDirectory {
    pub fn new(path: String, handle: Arc<dyn DirectoryHandle>) -> Self {
        Self {
            path,
            handle,
            cursor: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> &Arc<dyn DirectoryHandle> {
        &self.handle
    }

    /// Walk `path` down to the parent of its last segment.
    ///
    /// Returns the parent directory and the leaf name; the name is `None` when
    /// the path denotes this directory itself. `..` never climbs above this
    /// directory.
    pub async fn resolve(&self, path: &str) -> Result<(Arc<dyn DirectoryHandle>, Option<String>)> {
        let mut parts: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(Error::NotCapable);
                    }
                }
                name => parts.push(name),
            }
        }

        let leaf = parts.pop().map(str::to_string);
        let mut dir = self.handle.clone();
        for segment in parts {
            dir = dir
                .get_directory(segment, false)
                .await
                .map_err(|e| match e {
                    BackendError::TypeMismatch(_) => Error::NotDirectory,
                    e => e.into(),
                })?;
        }
        Ok((dir, leaf))
    }

    /// Open `path` the way open(2) would, restricted to the kinds in `mode`.
    pub async fn get_file_or_dir(
        &self,
        path: &str,
        mut mode: FileOrDir,
        flags: OpenFlags,
    ) -> Result<Handle> {
        if flags.contains(OpenFlags::DIRECTORY) {
            if !mode.contains(FileOrDir::DIRECTORY) {
                return Err(Error::InvalidArgument(
                    "directory flag requested with a file-only mode".into(),
                ));
            }
            mode = FileOrDir::DIRECTORY;
        }

        let (parent, name) = self.resolve(path).await?;
        let Some(name) = name else {
            if !mode.contains(FileOrDir::DIRECTORY) {
                return Err(Error::IsDirectory);
            }
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                return Err(Error::AlreadyExists);
            }
            if flags.contains(OpenFlags::TRUNCATE) {
                return Err(Error::IsDirectory);
            }
            return Ok(Handle::Directory(parent));
        };

        let handle = if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
            // Check-then-create: not atomic against a concurrent creator.
            if open_child(&parent, &name, mode, false).await.is_ok() {
                return Err(Error::AlreadyExists);
            }
            open_child(&parent, &name, mode, true).await?
        } else {
            let create = flags.contains(OpenFlags::CREATE);
            open_child(&parent, &name, mode, create).await?
        };

        if flags.contains(OpenFlags::TRUNCATE) {
            let Handle::File(file) = &handle else {
                return Err(Error::IsDirectory);
            };
            let mut writer = file.create_writable(WriteMode::Truncate).await?;
            writer.close().await?;
            debug!(path, "truncated");
        }
        Ok(handle)
    }

    /// Remove the entry at `path`. The directory itself cannot be removed.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve(path).await?;
        let name = name.ok_or(Error::Access)?;
        parent.remove_entry(&name).await?;
        debug!(dir = %self.path, path, "removed");
        Ok(())
    }

    /// Enumerate children starting at `start`.
    ///
    /// Resuming at the position where the previous enumeration stopped is
    /// O(1); any other position restarts the backend enumeration and skips
    /// forward.
    pub async fn get_entries(&mut self, start: u64) -> Result<DirEntries<'_>> {
        let resumable = matches!(&self.cursor, Some(c) if c.position == start);
        if !resumable {
            if let Some(stale) = &self.cursor {
                debug!(dir = %self.path, from = stale.position, to = start, "restarting enumeration");
            }
            let entries = self.handle.entries().await?;
            self.cursor = Some(DirCursor {
                position: 0,
                reverted: None,
                entries,
            });
        }

        let cursor = self
            .cursor
            .as_mut()
            .ok_or(Error::Internal("directory cursor missing"))?;
        let mut view = DirEntries { cursor };
        while view.position() < start {
            if view.next_entry().await?.is_none() {
                break;
            }
        }
        Ok(view)
    }
}

/// Borrowed view of a directory's live enumeration cursor.
pub struct DirEntries<'a> {
    cursor: &'a mut DirCursor,
}

impl DirEntries<'_> {
    /// Number of entries consumed so far.
    pub fn position(&self) -> u64 {
        self.cursor.position
    }

    pub async fn next_entry(&mut self) -> Result<Option<Handle>> {
        if let Some(entry) = self.cursor.reverted.take() {
            self.cursor.position += 1;
            return Ok(Some(entry));
        }
        match self.cursor.entries.next().await {
            Some(Ok(entry)) => {
                self.cursor.position += 1;
                trace!(position = self.cursor.position, name = entry.name(), "entry");
                Ok(Some(entry))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Push `entry` back so the next [`DirEntries::next_entry`] returns it
    /// again. Only one entry can be pending.
    pub fn revert(&mut self, entry: Handle) -> Result<()> {
        if self.cursor.reverted.is_some() {
            return Err(Error::Internal("an entry is already reverted"));
        }
        if self.cursor.position == 0 {
            return Err(Error::Internal("no entry consumed to revert"));
        }
        self.cursor.position -= 1;
        self.cursor.reverted = Some(entry);
        Ok(())
    }
}

async fn open_child(
    parent: &Arc<dyn DirectoryHandle>,
    name: &str,
    mode: FileOrDir,
    create: bool,
) -> Result<Handle> {
    if mode.contains(FileOrDir::FILE) {
        match parent.get_file(name, create).await {
            Ok(file) => return Ok(Handle::File(file)),
            Err(BackendError::TypeMismatch(_)) if mode.contains(FileOrDir::DIRECTORY) => {}
            Err(BackendError::TypeMismatch(_)) => return Err(Error::IsDirectory),
            Err(e) => return Err(e.into()),
        }
    }
    match parent.get_directory(name, create).await {
        Ok(dir) => Ok(Handle::Directory(dir)),
        Err(BackendError::TypeMismatch(_)) => Err(Error::NotDirectory),
        Err(e) => Err(e.into()),
    }
}
