//! In-memory capability backend: a deterministic tree used for local
//! development and the test suite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;

use crate::error::BackendError;
use crate::handle::{
    DirectoryHandle, EntryStream, FileHandle, Handle, WriteMode, WriteStream, stage_resize,
    stage_write,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
enum Node {
    File(Arc<MemoryFile>),
    Directory(Arc<MemoryDirectory>),
}

impl Node {
    fn handle(&self) -> Handle {
        match self {
            Node::File(f) => Handle::File(f.clone()),
            Node::Directory(d) => Handle::Directory(d.clone()),
        }
    }
}

pub struct MemoryFile {
    name: String,
    content: Arc<Mutex<Bytes>>,
}

impl MemoryFile {
    fn new(name: &str, content: Bytes) -> Self {
        Self {
            name: name.to_string(),
            content: Arc::new(Mutex::new(content)),
        }
    }

    /// Committed content, bypassing the handle contract.
    pub fn content(&self) -> Bytes {
        lock(&self.content).clone()
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn snapshot(&self) -> Result<Bytes, BackendError> {
        Ok(self.content())
    }

    async fn create_writable(&self, mode: WriteMode) -> Result<Box<dyn WriteStream>, BackendError> {
        let buf = match mode {
            WriteMode::Truncate => Vec::new(),
            WriteMode::KeepExisting => self.content().to_vec(),
        };
        Ok(Box::new(MemoryWriter {
            target: self.content.clone(),
            buf,
            closed: false,
        }))
    }
}

struct MemoryWriter {
    target: Arc<Mutex<Bytes>>,
    buf: Vec<u8>,
    closed: bool,
}

impl MemoryWriter {
    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Other("write stream already closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WriteStream for MemoryWriter {
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
        self.closed = true;
        *lock(&self.target) = Bytes::from(std::mem::take(&mut self.buf));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    name: String,
    children: Mutex<BTreeMap<String, Node>>,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::named(""))
    }

    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Insert or replace a file child.
    pub fn add_file(&self, name: &str, content: impl Into<Bytes>) -> Arc<MemoryFile> {
        let file = Arc::new(MemoryFile::new(name, content.into()));
        lock(&self.children).insert(name.to_string(), Node::File(file.clone()));
        file
    }

    /// Insert a directory child, or return the existing one.
    pub fn add_dir(&self, name: &str) -> Arc<MemoryDirectory> {
        let mut children = lock(&self.children);
        if let Some(Node::Directory(d)) = children.get(name) {
            return d.clone();
        }
        let dir = Arc::new(MemoryDirectory::named(name));
        children.insert(name.to_string(), Node::Directory(dir.clone()));
        dir
    }

    pub fn file(&self, name: &str) -> Option<Arc<MemoryFile>> {
        match lock(&self.children).get(name) {
            Some(Node::File(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn dir(&self, name: &str) -> Option<Arc<MemoryDirectory>> {
        match lock(&self.children).get(name) {
            Some(Node::Directory(d)) => Some(d.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.children).contains_key(name)
    }

    /// Number of child lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> Result<EntryStream, BackendError> {
        let handles: Vec<Handle> = lock(&self.children).values().map(Node::handle).collect();
        Ok(stream::iter(handles.into_iter().map(Ok)).boxed())
    }

    async fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileHandle>, BackendError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut children = lock(&self.children);
        match children.get(name) {
            Some(Node::File(f)) => Ok(f.clone()),
            Some(Node::Directory(_)) => Err(BackendError::TypeMismatch(name.to_string())),
            None if create => {
                let file = Arc::new(MemoryFile::new(name, Bytes::new()));
                children.insert(name.to_string(), Node::File(file.clone()));
                Ok(file)
            }
            None => Err(BackendError::NotFound(name.to_string())),
        }
    }

    async fn get_directory(
        &self,
        name: &str,
        create: bool,
    ) -> Result<Arc<dyn DirectoryHandle>, BackendError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut children = lock(&self.children);
        match children.get(name) {
            Some(Node::Directory(d)) => Ok(d.clone()),
            Some(Node::File(_)) => Err(BackendError::TypeMismatch(name.to_string())),
            None if create => {
                let dir = Arc::new(MemoryDirectory::named(name));
                children.insert(name.to_string(), Node::Directory(dir.clone()));
                Ok(dir)
            }
            None => Err(BackendError::NotFound(name.to_string())),
        }
    }

    async fn remove_entry(&self, name: &str) -> Result<(), BackendError> {
        lock(&self.children)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_writes_are_invisible_until_close() {
        let root = MemoryDirectory::root();
        let file = root.add_file("f", "old");

        let mut w = file.create_writable(WriteMode::KeepExisting).await.unwrap();
        w.write_at(3, b"new").await.unwrap();
        assert_eq!(&file.snapshot().await.unwrap()[..], b"old");

        w.close().await.unwrap();
        assert_eq!(&file.snapshot().await.unwrap()[..], b"oldnew");
        assert!(w.write_at(0, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_truncate_mode_discards_content() {
        let root = MemoryDirectory::root();
        let file = root.add_file("f", "content");
        let mut w = file.create_writable(WriteMode::Truncate).await.unwrap();
        w.close().await.unwrap();
        assert!(file.content().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_kinds() {
        let root = MemoryDirectory::root();
        root.add_file("f", "");
        root.add_dir("d");

        assert!(matches!(
            root.get_directory("f", false).await,
            Err(BackendError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.get_file("d", true).await,
            Err(BackendError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.get_file("missing", false).await,
            Err(BackendError::NotFound(_))
        ));
        root.get_file("new", true).await.unwrap();
        assert!(root.contains("new"));
        assert_eq!(root.lookups(), 4);
    }

    #[tokio::test]
    async fn test_entries_in_name_order() {
        let root = MemoryDirectory::root();
        root.add_file("b", "");
        root.add_dir("a");
        let names: Vec<String> = root
            .entries()
            .await
            .unwrap()
            .map_ok(|h| h.name().to_string())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(names, ["a", "b"]);
    }
}
