//! Handle-based file trees.
//!
//! A [`DirectoryHandle`] is a live directory the caller owns (a mounted
//! share, a sandboxed picker, an in-memory tree in tests). The scanner
//! walks it, and the orchestrator can write curated output into one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CurateError, Result};

/// Bytes of a file together with what the source knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub bytes: Vec<u8>,
    /// Modification time in milliseconds since the epoch.
    pub mtime: Option<i64>,
}

/// One readable file.
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Size without reading the contents, when known.
    fn size(&self) -> Option<u64>;

    /// Modification time in milliseconds, when known without reading.
    fn modified(&self) -> Option<i64> {
        None
    }

    /// The first `len` bytes, or `None` when the handle cannot read a
    /// prefix without fetching the whole file.
    async fn read_prefix(&self, _len: usize) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn read(&self) -> Result<FileContents>;
}

/// A child of a directory.
#[derive(Debug, Clone)]
pub enum DirEntry {
    File(Arc<dyn FileHandle>),
    Directory(Arc<dyn DirectoryHandle>),
}

impl DirEntry {
    pub fn name(&self) -> &str {
        match self {
            DirEntry::File(f) => f.name(),
            DirEntry::Directory(d) => d.name(),
        }
    }
}

/// A live directory tree.
#[async_trait]
pub trait DirectoryHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Immediate children, in any order.
    async fn entries(&self) -> Result<Vec<DirEntry>>;

    /// Write `bytes` at the slash-separated `path`, creating directories.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()>;
}

/// A file held in memory.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    bytes: Arc<Vec<u8>>,
    mtime: i64,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
            mtime: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn modified(&self) -> Option<i64> {
        Some(self.mtime)
    }

    async fn read_prefix(&self, len: usize) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.bytes[..len.min(self.bytes.len())].to_vec()))
    }

    async fn read(&self) -> Result<FileContents> {
        Ok(FileContents {
            bytes: self.bytes.as_ref().clone(),
            mtime: Some(self.mtime),
        })
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(MemoryFile),
    Directory(MemoryDirectory),
}

/// An in-memory directory tree. Clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    children: Arc<Mutex<BTreeMap<String, Node>>>,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn subdirectory(&self, name: &str) -> Result<MemoryDirectory> {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        let node = children
            .entry(name.to_string())
            .or_insert_with(|| Node::Directory(MemoryDirectory::new(name)));
        match node {
            Node::Directory(dir) => Ok(dir.clone()),
            Node::File(_) => Err(CurateError::Transport(format!(
                "'{}' in '{}' is a file, not a directory",
                name, self.name
            ))),
        }
    }

    fn walk_to(&self, path: &str) -> Result<(MemoryDirectory, String)> {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let name = parts
            .pop()
            .ok_or_else(|| CurateError::Transport(format!("Empty file path '{}'", path)))?;
        let mut dir = self.clone();
        for part in parts {
            dir = dir.subdirectory(part)?;
        }
        Ok((dir, name.to_string()))
    }

    /// Add or replace a file at a slash-separated path.
    pub fn insert_file(&self, path: &str, file: MemoryFile) -> Result<()> {
        let (dir, name) = self.walk_to(path)?;
        let file = MemoryFile { name: name.clone(), ..file };
        dir.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Node::File(file));
        Ok(())
    }

    /// Contents of the file at `path`, if there is one.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();
        let mut dir = self.clone();
        while let Some(part) = parts.next() {
            let node = dir
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(part)
                .cloned()?;
            match (node, parts.peek().is_none()) {
                (Node::File(f), true) => return Some(f.bytes().to_vec()),
                (Node::Directory(d), false) => dir = d,
                _ => return None,
            }
        }
        None
    }

    /// Every file path below this directory, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        let children = self.children.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for (name, node) in children {
            let path = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
            match node {
                Node::File(_) => out.push(path),
                Node::Directory(d) => d.collect_paths(&path, out),
            }
        }
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> Result<Vec<DirEntry>> {
        let children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(children
            .values()
            .map(|node| match node {
                Node::File(f) => DirEntry::File(Arc::new(f.clone())),
                Node::Directory(d) => DirEntry::Directory(Arc::new(d.clone())),
            })
            .collect())
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.insert_file(path, MemoryFile::new("", bytes.to_vec()))
    }
}
