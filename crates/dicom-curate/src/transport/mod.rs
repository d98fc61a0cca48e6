//! Storage and network adapters: local directories, directory handles,
//! HTTP and object storage.

mod handle;
mod http;
mod object_store;

use std::path::Path;

use crate::error::{CurateError, Result};

pub use handle::{DirEntry, DirectoryHandle, FileContents, FileHandle, MemoryDirectory, MemoryFile};
pub use http::{
    fetch_url, header_map, join_url, parse_http_date, put_bytes, HeaderProvider, Headers,
    HttpHeaders,
};
pub use object_store::{
    parse_list_response, HttpObjectStore, ListPage, MemoryObjectStore, Metadata, ObjectEntry,
    ObjectStore,
};

/// Modification time of `metadata` in milliseconds since the epoch.
pub fn mtime_millis(metadata: &std::fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let since = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(since.as_millis()).ok()
}

/// Read a local file with its modification time.
pub async fn read_local(path: &Path) -> Result<FileContents> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CurateError::io(path, e))?;
    let mtime = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| mtime_millis(&m));
    Ok(FileContents { bytes, mtime })
}

/// Write `bytes` at `relative` below `root`, creating directories.
pub async fn write_to_directory(root: &Path, relative: &str, bytes: &[u8]) -> Result<()> {
    let mut target = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        target.push(segment);
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CurateError::io(parent, e))?;
    }
    tokio::fs::write(&target, bytes)
        .await
        .map_err(|e| CurateError::io(&target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read_local() {
        let dir = TempDir::new().unwrap();
        write_to_directory(dir.path(), "p1/s1/a.dcm", b"abc").await.unwrap();

        let path = dir.path().join("p1").join("s1").join("a.dcm");
        let contents = read_local(&path).await.unwrap();
        assert_eq!(contents.bytes, b"abc");
        assert!(contents.mtime.is_some());
    }

    #[tokio::test]
    async fn test_read_missing_reports_path() {
        let dir = TempDir::new().unwrap();
        let err = read_local(&dir.path().join("nope.dcm")).await.unwrap_err();
        assert!(err.to_string().contains("nope.dcm"));
    }
}
