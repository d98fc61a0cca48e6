//! Source scanner.
//!
//! Walks a local directory, a directory handle or an object-store prefix
//! depth-first with siblings in name order, and streams a [`ScanMsg`] per
//! candidate file. Files that cannot be DICOM (excluded names, too small,
//! no `DICM` signature) become anomalies instead of jobs. The stream ends
//! with exactly one `Done` or `Error`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::{MAGIC, MIN_PART10_SIZE, PREAMBLE_LEN};
use crate::curate::{FileDescriptor, FileInfoIndex, FileSource};
use crate::transport::{mtime_millis, DirEntry, DirectoryHandle, ObjectStore};

/// Names never curated, compared case-insensitively.
pub const DEFAULT_EXCLUDED_FILETYPES: &[&str] = &[
    "dicomdir",
    "dicomdir.dir",
    "dicomdir.dat",
    "dicomdir.bak",
    "thumbs.db",
    ".ds_store",
];

/// What to scan.
#[derive(Debug, Clone)]
pub enum ScanSource {
    Directory(PathBuf),
    Handle(Arc<dyn DirectoryHandle>),
    ObjectStore { store: Arc<dyn ObjectStore>, prefix: String },
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Extra names to exclude, on top of [`DEFAULT_EXCLUDED_FILETYPES`].
    pub excluded_filetypes: Vec<String>,
    /// Prior-run cache; matching entries travel with their descriptors.
    pub file_info_index: Option<Arc<FileInfoIndex>>,
}

impl ScanOptions {
    pub fn with_excluded_filetypes(mut self, names: Vec<String>) -> Self {
        self.excluded_filetypes = names;
        self
    }

    pub fn with_file_info_index(mut self, index: Option<Arc<FileInfoIndex>>) -> Self {
        self.file_info_index = index;
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        DEFAULT_EXCLUDED_FILETYPES.iter().any(|e| *e == lower)
            || self.excluded_filetypes.iter().any(|e| e.to_lowercase() == lower)
    }

    /// Anomalies that keep a file out of mapping; `size` and `signature`
    /// are checked only when known.
    fn vet(&self, name: &str, size: Option<u64>, signature: Option<&[u8]>) -> Vec<String> {
        if self.is_excluded(name) {
            return vec![format!("Skipped excluded file: {}", name)];
        }
        if let Some(size) = size.filter(|s| *s < MIN_PART10_SIZE) {
            return vec![format!("Skipped very small file: {} ({} bytes)", name, size)];
        }
        match signature {
            Some(sig) if sig != MAGIC => {
                vec![format!("Skipped file without DICOM signature: {}", name)]
            }
            _ => Vec::new(),
        }
    }

    fn descriptor(&self, descriptor: FileDescriptor) -> FileDescriptor {
        let previous = self
            .file_info_index
            .as_ref()
            .and_then(|index| index.source(&descriptor.file_path()).cloned());
        descriptor.with_previous(previous)
    }
}

/// Messages from the scanner.
#[derive(Debug)]
pub enum ScanMsg {
    /// A file to curate.
    File(FileDescriptor),
    /// A file kept out of mapping, with the reasons.
    Anomalies {
        descriptor: FileDescriptor,
        anomalies: Vec<String>,
    },
    /// Traversal fault; no more messages follow.
    Error(String),
    /// Scan complete; no more messages follow.
    Done,
}

/// Control for a running scan.
#[derive(Debug)]
pub struct ScanHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Stop emitting files. The scan still ends with `Done`.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop and tear the scanner down without a final message.
    pub fn abort(&self) {
        self.stop();
        self.task.abort();
    }
}

/// Start scanning `source` on its own task.
pub fn spawn_scan(source: ScanSource, options: ScanOptions, buffer: usize) -> (mpsc::Receiver<ScanMsg>, ScanHandle) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let scanner = Scanner {
        options,
        tx,
        stop: stop_rx,
    };
    let task = tokio::spawn(scanner.run(source));
    (rx, ScanHandle { stop: stop_tx, task })
}

struct Scanner {
    options: ScanOptions,
    tx: mpsc::Sender<ScanMsg>,
    stop: watch::Receiver<bool>,
}

impl Scanner {
    async fn run(self, source: ScanSource) {
        let outcome = match &source {
            ScanSource::Directory(root) => self.scan_directory(root.clone()).await,
            ScanSource::Handle(root) => self.scan_handle(root.clone()).await,
            ScanSource::ObjectStore { store, prefix } => self.scan_store(store, prefix).await,
        };
        let last = match outcome {
            Ok(count) => {
                info!(files = count, "scan finished");
                ScanMsg::Done
            }
            Err(message) => {
                warn!(error = %message, "scan failed");
                ScanMsg::Error(message)
            }
        };
        let _ = self.tx.send(last).await;
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Emit one candidate. `false` once the receiver is gone.
    async fn emit(&self, descriptor: FileDescriptor, anomalies: Vec<String>) -> bool {
        let descriptor = self.options.descriptor(descriptor);
        let msg = if anomalies.is_empty() {
            ScanMsg::File(descriptor)
        } else {
            debug!(file = %descriptor.file_path(), ?anomalies, "scan anomaly");
            ScanMsg::Anomalies { descriptor, anomalies }
        };
        self.tx.send(msg).await.is_ok()
    }

    async fn scan_directory(&self, root: PathBuf) -> Result<usize, String> {
        let options = self.options.clone();
        let tx = self.tx.clone();
        let stop = self.stop.clone();
        tokio::task::spawn_blocking(move || walk_directory(&root, &options, &tx, &stop))
            .await
            .map_err(|e| format!("Directory scan failed: {}", e))?
    }

    async fn scan_handle(&self, root: Arc<dyn DirectoryHandle>) -> Result<usize, String> {
        let mut count = 0;
        let mut stack: Vec<(String, VecDeque<DirEntry>)> =
            vec![(root.name().to_string(), sorted_entries(root.as_ref()).await?)];

        while let Some((prefix, entries)) = stack.last_mut() {
            if self.stopped() {
                break;
            }
            let Some(entry) = entries.pop_front() else {
                stack.pop();
                continue;
            };
            let prefix = prefix.clone();
            match entry {
                DirEntry::Directory(dir) => {
                    let entries = sorted_entries(dir.as_ref()).await?;
                    stack.push((format!("{}/{}", prefix, dir.name()), entries));
                }
                DirEntry::File(file) => {
                    let name = file.name().to_string();
                    let mut anomalies = self.options.vet(&name, file.size(), None);
                    if anomalies.is_empty() {
                        // Probe only when the handle can read a bounded prefix.
                        match file.read_prefix(PREAMBLE_LEN + 4).await {
                            Ok(Some(prefix)) => {
                                let signature = prefix.get(PREAMBLE_LEN..PREAMBLE_LEN + 4);
                                let size = file.size().or_else(|| {
                                    (prefix.len() < PREAMBLE_LEN + 4).then_some(prefix.len() as u64)
                                });
                                anomalies = self.options.vet(&name, size, signature);
                            }
                            Ok(None) => {}
                            Err(e) => debug!(file = %name, error = %e, "could not probe, processing anyway"),
                        }
                    }
                    let mut descriptor = FileDescriptor::new(name, prefix, FileSource::Handle(file.clone()))
                        .with_mtime(file.modified());
                    descriptor.size = file.size();
                    count += 1;
                    if !self.emit(descriptor, anomalies).await {
                        break;
                    }
                }
            }
        }
        Ok(count)
    }

    async fn scan_store(&self, store: &Arc<dyn ObjectStore>, prefix: &str) -> Result<usize, String> {
        let mut count = 0;
        let mut continuation: Option<String> = None;
        loop {
            let page = store
                .list(prefix, continuation.as_deref())
                .await
                .map_err(|e| format!("Object store scan failed: {}", e))?;
            for entry in page.entries {
                if self.stopped() {
                    return Ok(count);
                }
                if entry.key.ends_with('/') {
                    continue;
                }
                let (path, name) = match entry.key.rsplit_once('/') {
                    Some((path, name)) => (path.to_string(), name.to_string()),
                    None => (String::new(), entry.key.clone()),
                };
                // The signature cannot be probed without downloading.
                let anomalies = self.options.vet(&name, Some(entry.size), None);
                let source = FileSource::ObjectStore {
                    store: Arc::clone(store),
                    key: entry.key.clone(),
                };
                let descriptor = FileDescriptor::new(name, path, source)
                    .with_size(entry.size)
                    .with_mtime(entry.mtime);
                count += 1;
                if !self.emit(descriptor, anomalies).await {
                    return Ok(count);
                }
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(count),
            }
        }
    }
}

async fn sorted_entries(dir: &dyn DirectoryHandle) -> Result<VecDeque<DirEntry>, String> {
    let mut entries = dir
        .entries()
        .await
        .map_err(|e| format!("Directory scan failed: {}", e))?;
    entries.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(entries.into())
}

/// Bytes where the `DICM` signature sits, if the file is long enough.
fn probe_signature(path: &Path) -> std::io::Result<Option<[u8; 4]>> {
    let mut head = [0u8; PREAMBLE_LEN + 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut head) {
        Ok(()) => Ok(Some([head[128], head[129], head[130], head[131]])),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn walk_directory(
    root: &Path,
    options: &ScanOptions,
    tx: &mpsc::Sender<ScanMsg>,
    stop: &watch::Receiver<bool>,
) -> Result<usize, String> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut count = 0;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        if *stop.borrow() {
            break;
        }
        let entry = entry.map_err(|e| format!("Directory scan failed: {}", e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let mut prefix = vec![root_name.clone()];
        if let Some(parent) = entry.path().parent().and_then(|p| p.strip_prefix(root).ok()) {
            prefix.extend(parent.components().map(|c| c.as_os_str().to_string_lossy().into_owned()));
        }
        let prefix: Vec<_> = prefix.into_iter().filter(|p| !p.is_empty()).collect();

        let metadata = entry
            .metadata()
            .map_err(|e| format!("Directory scan failed: {}", e))?;
        let size = metadata.len();
        let mut anomalies = options.vet(&name, Some(size), None);
        if anomalies.is_empty() {
            match probe_signature(entry.path()) {
                Ok(signature) => anomalies = options.vet(&name, Some(size), signature.as_ref().map(|s| &s[..])),
                Err(e) => debug!(file = %name, error = %e, "could not probe, processing anyway"),
            }
        }

        let descriptor = FileDescriptor::new(name, prefix.join("/"), FileSource::Path(entry.path().to_path_buf()))
            .with_size(size)
            .with_mtime(mtime_millis(&metadata));
        let descriptor = options.descriptor(descriptor);
        let msg = if anomalies.is_empty() {
            ScanMsg::File(descriptor)
        } else {
            ScanMsg::Anomalies { descriptor, anomalies }
        };
        count += 1;
        if tx.blocking_send(msg).is_err() {
            break;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curate::PreviousFileInfo;
    use crate::transport::{FileContents, FileHandle, MemoryDirectory, MemoryFile, MemoryObjectStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn dicom_like(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len.max(132)];
        bytes[128..132].copy_from_slice(MAGIC);
        bytes
    }

    async fn collect(mut rx: mpsc::Receiver<ScanMsg>) -> Vec<ScanMsg> {
        let mut out = Vec::new();
        while let Some(msg) = rx.recv().await {
            let last = matches!(msg, ScanMsg::Done | ScanMsg::Error(_));
            out.push(msg);
            if last {
                break;
            }
        }
        out
    }

    fn summary(msgs: &[ScanMsg]) -> Vec<String> {
        msgs.iter()
            .map(|m| match m {
                ScanMsg::File(d) => format!("file {}", d.file_path()),
                ScanMsg::Anomalies { descriptor, .. } => format!("anomaly {}", descriptor.file_path()),
                ScanMsg::Error(e) => format!("error {}", e),
                ScanMsg::Done => "done".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_vet_rules() {
        let options = ScanOptions::default().with_excluded_filetypes(vec!["Notes.TXT".into()]);
        assert_eq!(options.vet("DICOMDIR", Some(5000), None), vec!["Skipped excluded file: DICOMDIR"]);
        assert_eq!(options.vet("notes.txt", Some(5000), None).len(), 1);
        assert_eq!(
            options.vet("a.dcm", Some(100), None),
            vec!["Skipped very small file: a.dcm (100 bytes)"]
        );
        assert_eq!(options.vet("a.dcm", Some(200), Some(&b"NOPE"[..])).len(), 1);
        assert!(options.vet("a.dcm", Some(200), Some(&b"DICM"[..])).is_empty());
        assert!(options.vet("a.dcm", None, None).is_empty());
    }

    #[tokio::test]
    async fn test_directory_scan_order_and_anomalies() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("scans");
        std::fs::create_dir_all(root.join("p2")).unwrap();
        std::fs::create_dir_all(root.join("p1/s1")).unwrap();
        std::fs::write(root.join("p2/b.dcm"), dicom_like(200)).unwrap();
        std::fs::write(root.join("p1/s1/a.dcm"), dicom_like(200)).unwrap();
        std::fs::write(root.join("p1/tiny.dcm"), b"x").unwrap();
        std::fs::write(root.join("p1/DICOMDIR"), dicom_like(200)).unwrap();
        std::fs::write(root.join("p1/plain.bin"), vec![7u8; 300]).unwrap();

        let (rx, _handle) = spawn_scan(ScanSource::Directory(root), ScanOptions::default(), 8);
        let msgs = collect(rx).await;
        assert_eq!(
            summary(&msgs),
            vec![
                "anomaly scans/p1/DICOMDIR",
                "anomaly scans/p1/plain.bin",
                "file scans/p1/s1/a.dcm",
                "anomaly scans/p1/tiny.dcm",
                "file scans/p2/b.dcm",
                "done",
            ]
        );
    }

    #[tokio::test]
    async fn test_directory_scan_attaches_previous_info() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("in");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.dcm"), dicom_like(140)).unwrap();

        let mut index = FileInfoIndex::new();
        index.insert_source(
            "in/a.dcm",
            PreviousFileInfo {
                size: Some(140),
                ..PreviousFileInfo::default()
            },
        );
        let options = ScanOptions::default().with_file_info_index(Some(Arc::new(index)));
        let (rx, _handle) = spawn_scan(ScanSource::Directory(root), options, 8);
        let msgs = collect(rx).await;
        let ScanMsg::File(descriptor) = &msgs[0] else {
            panic!("expected a file, got {:?}", msgs[0]);
        };
        assert_eq!(descriptor.previous.as_ref().unwrap().size, Some(140));
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let (rx, _handle) = spawn_scan(
            ScanSource::Directory(tmp.path().join("missing")),
            ScanOptions::default(),
            8,
        );
        let msgs = collect(rx).await;
        assert!(matches!(msgs.last(), Some(ScanMsg::Error(_))));
    }

    #[tokio::test]
    async fn test_handle_scan_is_depth_first() {
        let root = MemoryDirectory::new("root");
        for path in ["b/x.dcm", "a/z.dcm", "a/y/w.dcm", "c.dcm"] {
            root.insert_file(path, MemoryFile::new("", dicom_like(150))).unwrap();
        }
        root.insert_file("a/thumbs.db", MemoryFile::new("", dicom_like(150))).unwrap();

        let (rx, _handle) = spawn_scan(ScanSource::Handle(Arc::new(root)), ScanOptions::default(), 8);
        let msgs = collect(rx).await;
        assert_eq!(
            summary(&msgs),
            vec![
                "anomaly root/a/thumbs.db",
                "file root/a/y/w.dcm",
                "file root/a/z.dcm",
                "file root/b/x.dcm",
                "file root/c.dcm",
                "done",
            ]
        );
    }

    /// A handle file that counts full reads.
    #[derive(Debug)]
    struct CountingFile {
        name: String,
        bytes: Vec<u8>,
        prefix_reads: bool,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FileHandle for CountingFile {
        fn name(&self) -> &str {
            &self.name
        }

        fn size(&self) -> Option<u64> {
            Some(self.bytes.len() as u64)
        }

        async fn read_prefix(&self, len: usize) -> crate::Result<Option<Vec<u8>>> {
            Ok(self
                .prefix_reads
                .then(|| self.bytes[..len.min(self.bytes.len())].to_vec()))
        }

        async fn read(&self) -> crate::Result<FileContents> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(FileContents {
                bytes: self.bytes.clone(),
                mtime: None,
            })
        }
    }

    #[derive(Debug)]
    struct FlatDirectory {
        files: Vec<Arc<CountingFile>>,
    }

    #[async_trait]
    impl DirectoryHandle for FlatDirectory {
        fn name(&self) -> &str {
            "flat"
        }

        async fn entries(&self) -> crate::Result<Vec<DirEntry>> {
            Ok(self
                .files
                .iter()
                .map(|f| DirEntry::File(f.clone() as Arc<dyn FileHandle>))
                .collect())
        }

        async fn write_file(&self, _path: &str, _bytes: &[u8]) -> crate::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handle_scan_probes_prefix_without_full_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let file = |name: &str, bytes: Vec<u8>, prefix_reads: bool| {
            Arc::new(CountingFile {
                name: name.into(),
                bytes,
                prefix_reads,
                reads: reads.clone(),
            })
        };
        let root = FlatDirectory {
            files: vec![
                file("a.dcm", dicom_like(4096), true),
                file("b.bin", vec![7u8; 4096], true),
                file("c.bin", vec![7u8; 4096], false),
            ],
        };

        let (rx, _handle) = spawn_scan(ScanSource::Handle(Arc::new(root)), ScanOptions::default(), 8);
        let msgs = collect(rx).await;
        assert_eq!(
            summary(&msgs),
            vec!["file flat/a.dcm", "anomaly flat/b.bin", "file flat/c.bin", "done"]
        );
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_object_store_scan_pages() {
        let store = MemoryObjectStore::new().with_page_size(1);
        store.insert("in/p1/a.dcm", dicom_like(200));
        store.insert("in/p1/b.dcm", vec![0; 10]);
        store.insert("in/p2/c.dcm", dicom_like(200));

        let source = ScanSource::ObjectStore {
            store: Arc::new(store),
            prefix: "in/".into(),
        };
        let (rx, _handle) = spawn_scan(source, ScanOptions::default(), 8);
        let msgs = collect(rx).await;
        assert_eq!(
            summary(&msgs),
            vec!["file in/p1/a.dcm", "anomaly in/p1/b.dcm", "file in/p2/c.dcm", "done"]
        );
    }

    #[tokio::test]
    async fn test_stop_halts_emission() {
        let root = MemoryDirectory::new("root");
        for i in 0..20 {
            root.insert_file(&format!("f{:02}.dcm", i), MemoryFile::new("", dicom_like(150)))
                .unwrap();
        }
        let (mut rx, handle) = spawn_scan(ScanSource::Handle(Arc::new(root)), ScanOptions::default(), 1);
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ScanMsg::File(_)));
        handle.stop();

        let mut files = 1;
        while let Some(msg) = rx.recv().await {
            match msg {
                ScanMsg::File(_) => files += 1,
                ScanMsg::Done => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(files < 20);
    }
}
