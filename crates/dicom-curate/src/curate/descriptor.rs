//! File descriptors and the prior-run cache index.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CurateError, Result};
use crate::transport::{FileHandle, Headers, ObjectStore};

use super::results::MapResults;

/// Where the bytes of a file come from.
#[derive(Clone)]
pub enum FileSource {
    /// A local file.
    Path(PathBuf),
    /// Bytes already in memory.
    Blob(Arc<Vec<u8>>),
    /// An HTTP resource fetched with GET.
    Http { url: String, headers: Headers },
    /// An object in a bucket.
    ObjectStore { store: Arc<dyn ObjectStore>, key: String },
    /// A file inside a caller-provided directory handle.
    Handle(Arc<dyn FileHandle>),
}

impl FileSource {
    pub fn kind(&self) -> &'static str {
        match self {
            FileSource::Path(_) => "path",
            FileSource::Blob(_) => "blob",
            FileSource::Http { .. } => "http",
            FileSource::ObjectStore { .. } => "object-store",
            FileSource::Handle(_) => "handle",
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            FileSource::Blob(b) => write!(f, "Blob({} bytes)", b.len()),
            FileSource::Http { url, .. } => f.debug_struct("Http").field("url", url).finish_non_exhaustive(),
            FileSource::ObjectStore { key, .. } => {
                f.debug_struct("ObjectStore").field("key", key).finish_non_exhaustive()
            }
            FileSource::Handle(h) => f.debug_tuple("Handle").field(&h.name()).finish(),
        }
    }
}

/// Identity of a file from an earlier run, used only to decide skipping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousFileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mapped_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mapped_hash: Option<String>,
}

/// One file to curate. Immutable once the scanner produced it.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub name: String,
    /// Slash-separated directory of the file, starting at the scan root.
    pub path: String,
    /// Size in bytes, when the source knows it before reading.
    pub size: Option<u64>,
    /// Modification time in milliseconds since the epoch.
    pub mtime: Option<i64>,
    pub source: FileSource,
    /// Matching entry of the prior-run cache.
    pub previous: Option<PreviousFileInfo>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<String>, source: FileSource) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: None,
            mtime: None,
            source,
            previous: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_mtime(mut self, mtime: Option<i64>) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_previous(mut self, previous: Option<PreviousFileInfo>) -> Self {
        self.previous = previous;
        self
    }

    /// `path/name`, the key used by path templates and the cache index.
    pub fn file_path(&self) -> String {
        if self.path.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.path, self.name)
        }
    }
}

const OUTPUT_PREFIX: &str = "output:";

/// Serialized cache of a prior run.
///
/// Source entries are keyed by `path/name`; post-mapped entries by
/// `output:<output path>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileInfoIndex {
    entries: BTreeMap<String, PreviousFileInfo>,
}

impl FileInfoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CurateError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self, file_path: &str) -> Option<&PreviousFileInfo> {
        self.entries.get(file_path)
    }

    pub fn output(&self, output_path: &str) -> Option<&PreviousFileInfo> {
        self.entries.get(&format!("{}{}", OUTPUT_PREFIX, output_path))
    }

    pub fn insert_source(&mut self, file_path: impl Into<String>, info: PreviousFileInfo) {
        self.entries.insert(file_path.into(), info);
    }

    pub fn insert_output(&mut self, output_path: &str, post_mapped_hash: impl Into<String>) {
        self.entries.insert(
            format!("{}{}", OUTPUT_PREFIX, output_path),
            PreviousFileInfo {
                post_mapped_hash: Some(post_mapped_hash.into()),
                ..PreviousFileInfo::default()
            },
        );
    }

    /// Only the post-mapped entries; what mapping workers need.
    pub fn post_mapped_only(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, info)| info.post_mapped_hash.is_some())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Record the identities observed in a run, for the next one.
    ///
    /// Unchanged files keep their earlier entries; failed files are left out
    /// so they are retried.
    pub fn update_from_results<'a>(&mut self, results: impl IntoIterator<Item = &'a MapResults>) {
        for result in results {
            let Some(info) = &result.file_info else {
                continue;
            };
            if result.has_errors() || info.parse_error.is_some() {
                continue;
            }
            let key = if info.path.is_empty() {
                info.name.clone()
            } else {
                format!("{}/{}", info.path, info.name)
            };
            let previous = self.entries.get(&key).cloned().unwrap_or_default();
            self.entries.insert(
                key,
                PreviousFileInfo {
                    size: Some(info.size),
                    mtime: info.mtime.or(previous.mtime),
                    pre_mapped_hash: info.pre_mapped_hash.clone().or(previous.pre_mapped_hash),
                    post_mapped_hash: None,
                },
            );
            if let (Some(output), Some(hash)) = (&result.output_file_path, &info.post_mapped_hash) {
                self.insert_output(output, hash.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curate::ResultFileInfo;

    #[test]
    fn test_index_json_shape() {
        let json = r#"{
            "root/p1/a.dcm": {"size": 10, "mtime": 5, "preMappedHash": "abc"},
            "output:p1/a.dcm": {"postMappedHash": "def"}
        }"#;
        let index = FileInfoIndex::from_json(json).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.source("root/p1/a.dcm").unwrap().pre_mapped_hash.as_deref(), Some("abc"));
        assert_eq!(index.output("p1/a.dcm").unwrap().post_mapped_hash.as_deref(), Some("def"));
        assert_eq!(index.post_mapped_only().len(), 1);
    }

    #[test]
    fn test_update_from_results() {
        let mut mapped = MapResults::default();
        mapped.output_file_path = Some("out/a.dcm".into());
        mapped.file_info = Some(ResultFileInfo {
            name: "a.dcm".into(),
            size: 10,
            path: "root".into(),
            mtime: Some(7),
            pre_mapped_hash: Some("pre".into()),
            post_mapped_hash: Some("post".into()),
            parse_error: None,
        });
        let mut failed = mapped.clone();
        failed.errors.push("Upload failed: 500".into());
        if let Some(info) = failed.file_info.as_mut() {
            info.name = "b.dcm".into();
        }

        let mut index = FileInfoIndex::new();
        index.update_from_results([&mapped, &failed]);
        assert_eq!(index.source("root/a.dcm").unwrap().size, Some(10));
        assert_eq!(index.output("out/a.dcm").unwrap().post_mapped_hash.as_deref(), Some("post"));
        assert!(index.source("root/b.dcm").is_none());
    }

    #[test]
    fn test_descriptor_file_path() {
        let d = FileDescriptor::new("a.dcm", "", FileSource::Blob(Arc::new(vec![])));
        assert_eq!(d.file_path(), "a.dcm");
        let d = FileDescriptor::new("a.dcm", "root/p1", FileSource::Path("x".into()));
        assert_eq!(d.file_path(), "root/p1/a.dcm");
        assert_eq!(d.source.kind(), "path");
    }
}
