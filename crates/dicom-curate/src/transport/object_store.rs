//! Object storage: GET, PUT with metadata, and paged LIST.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use tracing::debug;

use crate::error::{CurateError, Result};

use super::handle::FileContents;
use super::http::{header_map, join_url, parse_http_date, Headers};

/// User metadata stored with an object.
pub type Metadata = IndexMap<String, String>;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    /// Milliseconds since the epoch.
    pub mtime: Option<i64>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Token for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<FileContents>;

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: &Metadata) -> Result<()>;

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    /// Human-readable location of `key`, reported in upload results.
    fn location(&self, key: &str) -> String {
        key.to_string()
    }
}

static ROOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<ListBucketResult[\s>]").unwrap());
static CONTENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Contents(?:\s[^>]*)?>(.*?)</Contents>").unwrap());
static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<Key>(.*?)</Key>").unwrap());
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Size>\s*(\d+)\s*</Size>").unwrap());
static MODIFIED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LastModified>\s*(.*?)\s*</LastModified>").unwrap());
static TRUNCATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").unwrap());
static NEXT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<NextContinuationToken>(.*?)</NextContinuationToken>").unwrap());
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#x[0-9A-Fa-f]+);").unwrap());

/// Resolve the predefined entities and numeric character references.
fn unescape_xml(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let resolved = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse())
                    .ok()
                    .and_then(char::from_u32),
            };
            resolved.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Parse a `ListObjectsV2` response body.
///
/// Fails when the body is not a bucket listing, or when it claims more
/// results without saying where they continue.
pub fn parse_list_response(body: &str) -> Result<ListPage> {
    if !ROOT_RE.is_match(body) {
        return Err(CurateError::Transport(
            "LIST response is not a ListBucketResult".to_string(),
        ));
    }

    let entries = CONTENTS_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let block = caps.get(1)?.as_str();
            let key = unescape_xml(KEY_RE.captures(block)?.get(1)?.as_str());
            let size = SIZE_RE
                .captures(block)
                .and_then(|c| c.get(1)?.as_str().parse().ok())
                .unwrap_or(0);
            let mtime = MODIFIED_RE
                .captures(block)
                .and_then(|c| DateTime::parse_from_rfc3339(c.get(1)?.as_str()).ok())
                .map(|d| d.timestamp_millis());
            Some(ObjectEntry { key, size, mtime })
        })
        .collect();

    let continuation = if TRUNCATED_RE.is_match(body) {
        let token = NEXT_TOKEN_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape_xml(m.as_str().trim()))
            .filter(|t| !t.is_empty());
        match token {
            Some(token) => Some(token),
            None => {
                return Err(CurateError::Transport(
                    "LIST response is truncated but has no continuation token".to_string(),
                ));
            }
        }
    } else {
        None
    };

    Ok(ListPage { entries, continuation })
}

/// S3-compatible store addressed path-style (`<endpoint>/<bucket>/<key>`).
///
/// Requests are unsigned: public buckets, presigning gateways and local
/// emulators.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint, bucket)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, key: &str) -> Result<String> {
        join_url(&self.endpoint, &format!("{}/{}", self.bucket, key))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str) -> Result<FileContents> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CurateError::Transport(format!("GET {} failed: {}", key, e)))?;
        if !response.status().is_success() {
            return Err(CurateError::Transport(format!(
                "GET {} failed: {}",
                key,
                response.status()
            )));
        }
        let mtime = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CurateError::Transport(format!("GET {} failed: {}", key, e)))?;
        Ok(FileContents {
            bytes: bytes.to_vec(),
            mtime,
        })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: &Metadata) -> Result<()> {
        let url = self.object_url(key)?;
        let headers: Headers = metadata
            .iter()
            .map(|(k, v)| (format!("x-amz-meta-{}", k), v.clone()))
            .collect();
        let response = self
            .client
            .put(&url)
            .headers(header_map(&headers)?)
            .header("Content-Type", "application/dicom")
            .body(bytes)
            .send()
            .await
            .map_err(|e| CurateError::Transport(format!("PUT {} failed: {}", key, e)))?;
        if !response.status().is_success() {
            return Err(CurateError::Transport(format!(
                "PUT {} failed: {}",
                key,
                response.status()
            )));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut url = reqwest::Url::parse(&self.object_url("")?)
            .map_err(|e| CurateError::Config(format!("Invalid endpoint: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("list-type", "2");
            query.append_pair("prefix", prefix);
            if let Some(token) = continuation {
                query.append_pair("continuation-token", token);
            }
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CurateError::Transport(format!("LIST {} failed: {}", prefix, e)))?;
        if !response.status().is_success() {
            return Err(CurateError::Transport(format!(
                "LIST {} failed: {}",
                prefix,
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| CurateError::Transport(format!("LIST {} failed: {}", prefix, e)))?;
        let page = parse_list_response(&body)?;
        debug!(prefix, objects = page.entries.len(), more = page.continuation.is_some(), "listed objects");
        Ok(page)
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    metadata: Metadata,
    mtime: i64,
}

/// In-memory object store. Clones share the same objects.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            page_size: 1000,
        }
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects per LIST page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).insert(
            key.into(),
            StoredObject {
                bytes,
                metadata: Metadata::new(),
                mtime: Utc::now().timestamp_millis(),
            },
        );
    }

    pub fn metadata(&self, key: &str) -> Option<Metadata> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|o| o.metadata.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<FileContents> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let object = objects
            .get(key)
            .ok_or_else(|| CurateError::Transport(format!("No such object: {}", key)))?;
        Ok(FileContents {
            bytes: object.bytes.clone(),
            mtime: Some(object.mtime),
        })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: &Metadata) -> Result<()> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner).insert(
            key.to_string(),
            StoredObject {
                bytes,
                metadata: metadata.clone(),
                mtime: Utc::now().timestamp_millis(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<ObjectEntry> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation.is_none_or(|after| key.as_str() > after))
            .take(self.page_size + 1)
            .map(|(key, o)| ObjectEntry {
                key: key.clone(),
                size: o.bytes.len() as u64,
                mtime: Some(o.mtime),
            })
            .collect();
        let continuation = if entries.len() > self.page_size {
            entries.truncate(self.page_size);
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };
        Ok(ListPage { entries, continuation })
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}
