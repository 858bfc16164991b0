//! Host directory backend: exposes a directory of the local filesystem as a
//! capability tree.
//!
//! Write streams stage the whole file in memory and replace it on close,
//! which matches the commit-on-close contract of [`WriteStream`].

use std::fs::FileType;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::fs;

use crate::error::BackendError;
use crate::handle::{
    DirectoryHandle, EntryStream, FileHandle, Handle, WriteMode, WriteStream, stage_resize,
    stage_write,
};

fn child_name(name: &str) -> Result<&str, BackendError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(BackendError::Other(format!("invalid entry name {name:?}")));
    }
    Ok(name)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct HostDirectory {
    name: String,
    path: PathBuf,
}

impl HostDirectory {
    /// Wrap an existing host directory.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, BackendError> {
        let path = path.as_ref().to_path_buf();
        let meta = fs::metadata(&path).await?;
        if !meta.is_dir() {
            return Err(BackendError::TypeMismatch(path.display().to_string()));
        }
        Ok(Arc::new(Self {
            name: file_name_of(&path),
            path,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: self.path.join(name),
        }
    }
}

/// File type of an existing child without following symlinks. `None` when
/// the child does not exist.
async fn child_type(path: &Path, name: &str) -> Result<Option<FileType>, BackendError> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(BackendError::Other(format!("{name:?} is a symbolic link")))
        }
        Ok(meta) => Ok(Some(meta.file_type())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Symlinks are not listed.
async fn entry_handle(entry: fs::DirEntry) -> Result<Option<Handle>, BackendError> {
    let file_type = entry.file_type().await?;
    if file_type.is_symlink() {
        return Ok(None);
    }
    let name = entry.file_name().to_string_lossy().into_owned();
    let path = entry.path();
    let handle = if file_type.is_dir() {
        Handle::Directory(Arc::new(HostDirectory { name, path }))
    } else {
        Handle::File(Arc::new(HostFile { name, path }))
    };
    Ok(Some(handle))
}

#[async_trait]
impl DirectoryHandle for HostDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> Result<EntryStream, BackendError> {
        let read_dir = fs::read_dir(&self.path).await?;
        // Iteration stops after the first error.
        let entries = stream::unfold(Some(read_dir), |state| async move {
            let mut read_dir = state?;
            loop {
                match read_dir.next_entry().await {
                    Ok(Some(entry)) => match entry_handle(entry).await {
                        Ok(Some(handle)) => return Some((Ok(handle), Some(read_dir))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), Some(read_dir))),
                    },
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e.into()), None)),
                }
            }
        });
        Ok(entries.boxed())
    }

    async fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileHandle>, BackendError> {
        let path = self.path.join(child_name(name)?);
        match child_type(&path, name).await? {
            Some(t) if t.is_dir() => return Err(BackendError::TypeMismatch(name.to_string())),
            Some(_) => {}
            None if create => {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .await?;
            }
            None => return Err(BackendError::NotFound(name.to_string())),
        }
        Ok(Arc::new(HostFile {
            name: name.to_string(),
            path,
        }))
    }

    async fn get_directory(
        &self,
        name: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, BackendError> {
        let dir = self.child(child_name(name)?);
        match child_type(&dir.path, name).await? {
            Some(t) if !t.is_dir() => return Err(BackendError::TypeMismatch(name.to_string())),
            Some(_) => {}
            None if create => fs::create_dir(&dir.path).await?,
            None => return Err(BackendError::NotFound(name.to_string())),
        }
        Ok(Arc::new(dir))
    }

    async fn remove_entry(&self, name: &str) -> Result<(), BackendError> {
        let path = self.path.join(child_name(name)?);
        if fs::symlink_metadata(&path).await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

pub struct HostFile {
    name: String,
    path: PathBuf,
}

#[async_trait]
impl FileHandle for HostFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn snapshot(&self) -> Result<Bytes, BackendError> {
        Ok(Bytes::from(fs::read(&self.path).await?))
    }

    async fn create_writable(&self, mode: WriteMode) -> Result<Box<dyn WriteStream>, BackendError> {
        let buf = match mode {
            WriteMode::Truncate => Vec::new(),
            WriteMode::KeepExisting => fs::read(&self.path).await?,
        };
        Ok(Box::new(HostWriter {
            path: self.path.clone(),
            buf,
            closed: false,
        }))
    }
}

struct HostWriter {
    path: PathBuf,
    buf: Vec<u8>,
    closed: bool,
}

impl HostWriter {
    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Other("write stream already closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WriteStream for HostWriter {
    async fn write_at(&mut self, position: u64, data: &[u8]) -> Result<(), BackendError> {
        self.check_open()?;
        stage_write(&mut self.buf, position, data)
    }

    async fn truncate(&mut self, size: u64) -> Result<(), BackendError> {
        self.check_open()?;
        stage_resize(&mut self.buf, size)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.check_open()?;
        fs::write(&self.path, &self.buf).await?;
        self.closed = true;
        self.buf = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_host_create_write_read() {
        let tmp = tempfile::tempdir().unwrap();
        let root = HostDirectory::open(tmp.path()).await.unwrap();

        let sub = root.get_directory("sub", true).await.unwrap();
        let file = sub.get_file("a.txt", true).await.unwrap();
        assert!(file.snapshot().await.unwrap().is_empty());

        let mut w = file.create_writable(WriteMode::KeepExisting).await.unwrap();
        w.write_at(0, b"hello").await.unwrap();
        w.write_at(7, b"!").await.unwrap();
        w.close().await.unwrap();

        let on_disk = std::fs::read(tmp.path().join("sub/a.txt")).unwrap();
        assert_eq!(on_disk, b"hello\0\0!");
        assert_eq!(&file.snapshot().await.unwrap()[..], b"hello\0\0!");
    }

    #[tokio::test]
    async fn test_host_kind_mismatch_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("d")).unwrap();
        std::fs::write(tmp.path().join("f"), b"x").unwrap();
        let root = HostDirectory::open(tmp.path()).await.unwrap();

        assert!(matches!(
            root.get_file("d", false).await,
            Err(BackendError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.get_directory("f", true).await,
            Err(BackendError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.get_file("nope", false).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(root.get_file("../escape", true).await.is_err());
    }

    #[tokio::test]
    async fn test_host_entries_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("d/nested")).unwrap();
        std::fs::write(tmp.path().join("f"), b"x").unwrap();
        let root = HostDirectory::open(tmp.path()).await.unwrap();

        let mut names: Vec<String> = root
            .entries()
            .await
            .unwrap()
            .map_ok(|h| h.name().to_string())
            .try_collect()
            .await
            .unwrap();
        names.sort();
        assert_eq!(names, ["d", "f"]);

        root.remove_entry("d").await.unwrap();
        root.remove_entry("f").await.unwrap();
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_host_writer_rejects_use_after_close() {
        let tmp = tempfile::tempdir().unwrap();
        let root = HostDirectory::open(tmp.path()).await.unwrap();
        let file = root.get_file("f", true).await.unwrap();

        let mut w = file.create_writable(WriteMode::Truncate).await.unwrap();
        w.write_at(0, b"kept").await.unwrap();
        w.close().await.unwrap();
        assert!(w.write_at(0, b"lost").await.is_err());
        assert!(w.truncate(0).await.is_err());
        assert!(w.close().await.is_err());
        assert_eq!(std::fs::read(tmp.path().join("f")).unwrap(), b"kept");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_refuses_symlinks() {
        use crate::{FdTable, FileOrDir, OpenFlags};

        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"outside").unwrap();
        let sandbox = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), sandbox.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret"),
            sandbox.path().join("alias"),
        )
        .unwrap();
        std::os::unix::fs::symlink(outside.path().join("new"), sandbox.path().join("dangling"))
            .unwrap();

        let root = HostDirectory::open(sandbox.path()).await.unwrap();
        assert!(root.get_directory("link", false).await.is_err());
        assert!(root.get_file("alias", false).await.is_err());
        assert!(root.get_file("dangling", true).await.is_err());
        assert!(!outside.path().join("new").exists());

        let listed = root.entries().await.unwrap().try_collect::<Vec<_>>().await.unwrap();
        assert!(listed.is_empty());

        let mut table = FdTable::new([("/sandbox", root as Arc<dyn DirectoryHandle>)]);
        for path in ["link/secret", "alias"] {
            assert!(
                table
                    .open(3, path, FileOrDir::ANY, OpenFlags::empty())
                    .await
                    .is_err()
            );
        }
    }
}
