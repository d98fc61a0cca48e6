//! Plain HTTP fetch and upload.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED};
use reqwest::Client;
use tracing::debug;

use crate::error::{CurateError, Result};

use super::handle::FileContents;

/// Request headers by name, in insertion order.
pub type Headers = IndexMap<String, String>;

/// Supplies request headers at the time each request is made, for
/// short-lived credentials.
#[async_trait]
pub trait HeaderProvider: Send + Sync + fmt::Debug {
    async fn headers(&self) -> Result<Headers>;
}

/// Headers fixed for the run or fetched per request.
#[derive(Debug, Clone)]
pub enum HttpHeaders {
    Static(Headers),
    Provider(Arc<dyn HeaderProvider>),
}

impl Default for HttpHeaders {
    fn default() -> Self {
        HttpHeaders::Static(Headers::new())
    }
}

impl From<Headers> for HttpHeaders {
    fn from(headers: Headers) -> Self {
        HttpHeaders::Static(headers)
    }
}

impl HttpHeaders {
    pub async fn resolve(&self) -> Result<Headers> {
        match self {
            HttpHeaders::Static(headers) => Ok(headers.clone()),
            HttpHeaders::Provider(provider) => provider.headers().await,
        }
    }
}

/// Build a header map, rejecting names or values HTTP cannot carry.
pub fn header_map(headers: &Headers) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CurateError::Transport(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CurateError::Transport(format!("Invalid value for '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Milliseconds since the epoch from an HTTP date.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.timestamp_millis())
}

/// GET a file; `Last-Modified` becomes the modification time.
pub async fn fetch_url(client: &Client, url: &str, headers: &Headers) -> Result<FileContents> {
    let response = client
        .get(url)
        .headers(header_map(headers)?)
        .send()
        .await
        .map_err(|e| CurateError::Transport(format!("Fetch of {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(CurateError::Transport(format!(
            "Fetch of {} failed: {}",
            url,
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
        .map_err(|e| CurateError::Transport(format!("Reading {} failed: {}", url, e)))?;

    debug!(url, size = bytes.len(), "fetched file");
    Ok(FileContents {
        bytes: bytes.to_vec(),
        mtime,
    })
}

/// PUT `bytes` and return the response status.
///
/// A non-success status is returned, not raised; only a request that never
/// got a response is an error.
pub async fn put_bytes(client: &Client, url: &str, headers: &Headers, bytes: Vec<u8>) -> Result<u16> {
    let response = client
        .put(url)
        .headers(header_map(headers)?)
        .body(bytes)
        .send()
        .await
        .map_err(|e| CurateError::Transport(format!("{}", e)))?;
    Ok(response.status().as_u16())
}

/// Append slash-separated `path` to `base`, percent-encoding each segment.
pub fn join_url(base: &str, path: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| CurateError::Config(format!("Invalid URL '{}': {}", base, e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CurateError::Config(format!("URL '{}' cannot take a path", base)))?;
        segments.pop_if_empty();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
    }
    Ok(url.to_string())
}
