//! Per-file outcome of a curation run.

use serde::{Deserialize, Serialize};

use crate::mapping::{MappingTable, Quarantine};

/// Identity of the source file as seen during this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFileInfo {
    pub name: String,
    pub size: u64,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mapped_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mapped_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// Where the curated bytes were uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUpload {
    pub url: String,
    pub status: u16,
}

/// Everything known about one file after curation.
///
/// Every input file yields exactly one `MapResults`, whether it was
/// mapped, skipped as unchanged, rejected by the scanner or failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapResults {
    #[serde(rename = "sourceInstanceUID")]
    pub source_instance_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_path: Option<String>,
    #[serde(default)]
    pub mappings: MappingTable,
    #[serde(default)]
    pub anomalies: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub quarantine: Quarantine,
    /// `false` when the file was skipped as unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<ResultFileInfo>,
    #[serde(rename = "curationTime", default, skip_serializing_if = "Option::is_none")]
    pub curation_time_ms: Option<f64>,
    /// Encoded output when no destination took it.
    #[serde(skip)]
    pub mapped_bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_upload: Option<OutputUpload>,
}

/// Replace everything but ASCII letters and digits with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl MapResults {
    /// Result with an identifier of the form `<kind>_<sanitized name>`.
    pub fn labelled(kind: &str, name: &str) -> Self {
        Self {
            source_instance_uid: format!("{}_{}", kind, sanitize_name(name)),
            ..Self::default()
        }
    }

    /// Result standing in for a file the scanner rejected.
    pub fn scan_anomaly(name: &str, path: &str, anomalies: Vec<String>) -> Self {
        Self {
            output_file_path: Some(format!("{}/{}", path, name)),
            anomalies,
            ..Self::labelled("scan", name)
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
