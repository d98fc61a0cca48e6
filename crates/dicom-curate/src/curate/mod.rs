//! Per-file curation.
//!
//! [`curate_one`] runs one file through
//! fetch → skip check → decode → map → encode → content skip check →
//! write → report. It holds no state between calls and never fails:
//! every fault ends up in the returned [`MapResults`].

mod descriptor;
mod results;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::codec::{DicomCodec, Part10Codec};
use crate::error::{CurateError, Result};
use crate::hash::{hash, HashMethod};
use crate::mapping::{curate_dataset, MappingOptions};
use crate::transport::{
    fetch_url, join_url, put_bytes, read_local, write_to_directory, DirectoryHandle, FileContents,
    Headers, Metadata, ObjectStore,
};

pub use descriptor::{FileDescriptor, FileInfoIndex, FileSource, PreviousFileInfo};
pub use results::{sanitize_name, MapResults, OutputUpload, ResultFileInfo};

/// Where curated files go.
#[derive(Debug, Clone, Default)]
pub enum Destination {
    /// Keep the encoded bytes in [`MapResults::mapped_bytes`].
    #[default]
    None,
    /// A local directory tree.
    Directory(PathBuf),
    /// A caller-provided directory handle.
    Handle(Arc<dyn DirectoryHandle>),
    /// HTTP PUT below a base URL.
    Http { url: String, headers: Headers },
    /// Object storage below a key prefix.
    ObjectStore { store: Arc<dyn ObjectStore>, prefix: String },
}

/// Options shared by every invocation of [`curate_one`] in a run.
#[derive(Clone)]
pub struct CurateOptions {
    pub mapping: MappingOptions,
    pub destination: Destination,
    pub hash_method: HashMethod,
    /// Map only: no encoding, no writing.
    pub skip_write: bool,
    /// Post-mapped hashes of a prior run, looked up by output path.
    pub file_info_index: Option<Arc<FileInfoIndex>>,
    pub codec: Arc<dyn DicomCodec>,
    pub client: Client,
}

impl CurateOptions {
    pub fn new(mapping: MappingOptions) -> Self {
        Self {
            mapping,
            destination: Destination::None,
            hash_method: HashMethod::default(),
            skip_write: false,
            file_info_index: None,
            codec: Arc::new(Part10Codec::new()),
            client: Client::new(),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_hash_method(mut self, method: HashMethod) -> Self {
        self.hash_method = method;
        self
    }

    pub fn with_skip_write(mut self, skip: bool) -> Self {
        self.skip_write = skip;
        self
    }

    pub fn with_file_info_index(mut self, index: Option<Arc<FileInfoIndex>>) -> Self {
        self.file_info_index = index;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn DicomCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

impl fmt::Debug for CurateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurateOptions")
            .field("mapping", &self.mapping)
            .field("destination", &self.destination)
            .field("hash_method", &self.hash_method)
            .field("skip_write", &self.skip_write)
            .field("file_info_index", &self.file_info_index.as_ref().map(|i| i.len()))
            .finish_non_exhaustive()
    }
}

async fn fetch(source: &FileSource, client: &Client) -> Result<FileContents> {
    match source {
        FileSource::Path(path) => read_local(path).await,
        FileSource::Blob(bytes) => Ok(FileContents {
            bytes: bytes.as_ref().clone(),
            mtime: None,
        }),
        FileSource::Http { url, headers } => fetch_url(client, url, headers).await,
        FileSource::ObjectStore { store, key } => store.get(key).await,
        FileSource::Handle(handle) => handle.read().await,
    }
}

fn iso_time(mtime: Option<i64>) -> String {
    mtime
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

fn elapsed_ms(started: Instant) -> Option<f64> {
    Some(started.elapsed().as_secs_f64() * 1000.0)
}

/// What one invocation learned about its source file.
struct Identity<'a> {
    descriptor: &'a FileDescriptor,
    size: u64,
    mtime: Option<i64>,
    pre_mapped_hash: Option<String>,
}

impl Identity<'_> {
    fn file_info(&self) -> ResultFileInfo {
        ResultFileInfo {
            name: self.descriptor.name.clone(),
            size: self.size,
            path: self.descriptor.path.clone(),
            mtime: self.mtime,
            pre_mapped_hash: self.pre_mapped_hash.clone(),
            post_mapped_hash: None,
            parse_error: None,
        }
    }

    /// Minimal result for a file that needs no work.
    fn unchanged(&self, output_file_path: Option<String>, post_mapped_hash: Option<String>) -> MapResults {
        let previous_mtime = self.descriptor.previous.as_ref().and_then(|p| p.mtime);
        MapResults {
            output_file_path,
            mapping_required: Some(false),
            file_info: Some(ResultFileInfo {
                mtime: previous_mtime.or(self.mtime),
                post_mapped_hash,
                ..self.file_info()
            }),
            ..MapResults::labelled("unchanged", &self.descriptor.name)
        }
    }

    /// Whether the cached identity from a prior run still matches.
    ///
    /// A cached pre-mapping hash decides alone; otherwise size and mtime
    /// must both match.
    fn matches_previous(&mut self, bytes: &[u8], method: HashMethod) -> bool {
        let Some(previous) = &self.descriptor.previous else {
            return false;
        };
        if let Some(expected) = &previous.pre_mapped_hash {
            let current = hash(bytes, method);
            let same = *expected == current;
            self.pre_mapped_hash = Some(current);
            return same;
        }
        match (previous.size, previous.mtime) {
            (Some(size), Some(mtime)) => size == self.size && Some(mtime) == self.mtime,
            _ => false,
        }
    }
}

/// Curate one file. Always returns a result; faults are recorded in it.
pub async fn curate_one(descriptor: &FileDescriptor, file_index: usize, options: &CurateOptions) -> MapResults {
    let started = Instant::now();
    let file_path = descriptor.file_path();

    let contents = match fetch(&descriptor.source, &options.client).await {
        Ok(contents) => contents,
        Err(e) => {
            warn!(file = %file_path, error = %e, "could not read file");
            let mut results = MapResults::labelled("error", &descriptor.name);
            results.errors.push(format!("Could not read {}: {}", descriptor.name, e));
            results.file_info = Some(ResultFileInfo {
                name: descriptor.name.clone(),
                size: descriptor.size.unwrap_or(0),
                path: descriptor.path.clone(),
                mtime: descriptor.mtime,
                ..ResultFileInfo::default()
            });
            results.curation_time_ms = elapsed_ms(started);
            return results;
        }
    };

    let mut identity = Identity {
        descriptor,
        size: descriptor.size.unwrap_or(contents.bytes.len() as u64),
        mtime: contents.mtime.or(descriptor.mtime),
        pre_mapped_hash: None,
    };

    if identity.matches_previous(&contents.bytes, options.hash_method) {
        debug!(file = %file_path, "unchanged since previous run");
        let mut results = identity.unchanged(None, None);
        results.curation_time_ms = elapsed_ms(started);
        return results;
    }

    let file = match options.codec.decode(&contents.bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!(file = %file_path, error = %e, "could not parse as DICOM");
            let mut results = MapResults::labelled("invalid", &descriptor.name);
            results
                .anomalies
                .push(format!("Could not parse {} as DICOM data", descriptor.name));
            results.errors.push(format!(
                "File {} is not a valid DICOM file or is corrupted",
                descriptor.name
            ));
            results.file_info = Some(ResultFileInfo {
                parse_error: Some(e.to_string()),
                ..identity.file_info()
            });
            results.curation_time_ms = elapsed_ms(started);
            return results;
        }
    };

    let curated = curate_dataset(&file_path, file_index, &file, &options.mapping);
    let mut results = curated.map_results;
    results.mapping_required = Some(true);
    if identity.pre_mapped_hash.is_none() {
        identity.pre_mapped_hash = Some(hash(&contents.bytes, options.hash_method));
    }

    let mut post_mapped_hash = None;
    if !options.skip_write {
        let output_path = results.output_file_path.clone().unwrap_or_default();
        let encoded = match options.codec.encode(&curated.file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file_path, error = %e, "could not encode curated file");
                results.errors.push(format!("Could not encode {}: {}", output_path, e));
                results.file_info = Some(identity.file_info());
                results.curation_time_ms = elapsed_ms(started);
                return results;
            }
        };
        let post_hash = hash(&encoded, options.hash_method);

        let previous_post = options
            .file_info_index
            .as_ref()
            .and_then(|index| index.output(&output_path))
            .and_then(|info| info.post_mapped_hash.as_deref());
        if previous_post == Some(post_hash.as_str()) {
            debug!(file = %file_path, output = %output_path, "output unchanged, not writing");
            let mut unchanged = identity.unchanged(Some(output_path), Some(post_hash));
            unchanged.curation_time_ms = elapsed_ms(started);
            return unchanged;
        }

        if let Err(e) = write_output(&mut results, &identity, &output_path, encoded, &post_hash, options).await {
            warn!(file = %file_path, output = %output_path, error = %e, "could not write output");
            results.errors.push(e);
        }
        post_mapped_hash = Some(post_hash);
    }

    results.file_info = Some(ResultFileInfo {
        post_mapped_hash,
        ..identity.file_info()
    });
    results.curation_time_ms = elapsed_ms(started);
    debug!(
        file = %file_path,
        output = results.output_file_path.as_deref().unwrap_or_default(),
        "curated file"
    );
    results
}

/// Send the encoded file to the configured destination.
async fn write_output(
    results: &mut MapResults,
    identity: &Identity<'_>,
    output_path: &str,
    encoded: Vec<u8>,
    post_hash: &str,
    options: &CurateOptions,
) -> std::result::Result<(), String> {
    let pre_hash = identity.pre_mapped_hash.clone().unwrap_or_default();
    match &options.destination {
        Destination::None => {
            results.mapped_bytes = Some(encoded);
            Ok(())
        }
        Destination::Directory(root) => write_to_directory(root, output_path, &encoded)
            .await
            .map_err(|e| format!("Write error: {}", e)),
        Destination::Handle(handle) => handle
            .write_file(output_path, &encoded)
            .await
            .map_err(|e| format!("Write error: {}", e)),
        Destination::Http { url, headers } => {
            let upload_url = join_url(url, output_path).map_err(|e| format!("Upload error: {}", e))?;
            let file_name = output_path.rsplit('/').next().unwrap_or(output_path);
            let mut all = Headers::new();
            all.insert("Content-Type".into(), "application/dicom".into());
            all.insert("X-File-Name".into(), file_name.to_string());
            all.insert("X-File-Type".into(), "application/dicom".into());
            all.insert("X-File-Size".into(), encoded.len().to_string());
            all.insert("X-Source-File-Size".into(), identity.size.to_string());
            all.insert("X-Source-File-Modified-Time".into(), iso_time(identity.mtime));
            all.insert("X-Source-File-Hash".into(), pre_hash);
            all.insert("X-Mapped-File-Hash".into(), post_hash.to_string());
            all.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));

            match put_bytes(&options.client, &upload_url, &all, encoded).await {
                Ok(status) if (200..300).contains(&status) => {
                    results.output_upload = Some(OutputUpload { url: upload_url, status });
                    Ok(())
                }
                Ok(status) => Err(format!("Upload failed: {}", status)),
                Err(e) => Err(format!("Upload error: {}", upload_error_text(&e))),
            }
        }
        Destination::ObjectStore { store, prefix } => {
            let key = format!("{}{}", prefix, output_path);
            let mut metadata = Metadata::new();
            metadata.insert("source-file-size".into(), identity.size.to_string());
            metadata.insert("source-file-modified-time".into(), iso_time(identity.mtime));
            metadata.insert("source-file-hash".into(), pre_hash);
            metadata.insert("source-file-post-mapped-hash".into(), post_hash.to_string());
            store
                .put(&key, encoded, &metadata)
                .await
                .map_err(|e| format!("Object store upload error: {}", e))?;
            results.output_upload = Some(OutputUpload {
                url: store.location(&key),
                status: 200,
            });
            Ok(())
        }
    }
}

fn upload_error_text(e: &CurateError) -> String {
    match e {
        CurateError::Transport(msg) => msg.clone(),
        other => other.to_string(),
    }
}
