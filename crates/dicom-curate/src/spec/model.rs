//! The composed curation specification.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::dataset::Value;
use crate::deid::DeidOption;
use crate::lookup::ColumnLookup;
use crate::resolve::Resolver;

/// Version every specification layer must declare.
pub const SPEC_VERSION: &str = "3.0";

/// Desired header values by attribute path; `None` deletes the attribute.
pub type HeaderEdits = IndexMap<String, Option<Value>>;

/// Produces header edits for one file.
pub type HeaderFn = Arc<dyn Fn(&Resolver<'_>) -> HeaderEdits + Send + Sync>;

/// Produces the output path segments for one file.
pub type OutputPathFn = Arc<dyn Fn(&Resolver<'_>) -> Vec<String> + Send + Sync>;

/// Produces diagnostic messages for one file.
pub type ErrorsFn = Arc<dyn Fn(&Resolver<'_>) -> Vec<String> + Send + Sync>;

/// Computes the value matched against a lookup table.
pub type ValueFn = Arc<dyn Fn(&Resolver<'_>) -> Option<String> + Send + Sync>;

/// Free-form properties for the embedding application.
pub type HostProps = serde_json::Map<String, serde_json::Value>;

/// One lookup key: how to compute the match value and which columns to read.
#[derive(Clone)]
pub struct LookupEntry {
    pub value: ValueFn,
    pub lookup: ColumnLookup,
}

impl fmt::Debug for LookupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupEntry")
            .field("lookup", &self.lookup)
            .finish_non_exhaustive()
    }
}

/// Auxiliary tabular data description.
#[derive(Debug, Clone, Default)]
pub struct AdditionalData {
    pub mapping: IndexMap<String, LookupEntry>,
}

impl AdditionalData {
    /// Lookup columns by key, in declaration order.
    pub fn lookups(&self) -> impl Iterator<Item = (&String, &ColumnLookup)> {
        self.mapping.iter().map(|(key, entry)| (key, &entry.lookup))
    }
}

/// The effective specification of a run.
///
/// Built once by [`compose_specs`](super::compose_specs) and shared
/// read-only by every worker.
#[derive(Clone)]
pub struct CurationSpecification {
    pub version: String,
    /// Slash-separated names for the segments of an input path.
    pub input_path_pattern: String,
    pub modify_header: HeaderFn,
    pub output_path_components: OutputPathFn,
    /// File names skipped by the scanner, compared case-insensitively.
    pub excluded_filetypes: Vec<String>,
    pub deid: DeidOption,
    pub additional_data: Option<AdditionalData>,
    pub errors: ErrorsFn,
    pub host_props: HostProps,
}

impl Default for CurationSpecification {
    fn default() -> Self {
        Self {
            version: SPEC_VERSION.to_string(),
            input_path_pattern: String::new(),
            modify_header: Arc::new(|_: &Resolver<'_>| HeaderEdits::new()),
            output_path_components: Arc::new(|r: &Resolver<'_>| r.path_segments()),
            excluded_filetypes: Vec::new(),
            deid: DeidOption::Off,
            additional_data: None,
            errors: Arc::new(|_: &Resolver<'_>| Vec::new()),
            host_props: HostProps::new(),
        }
    }
}

impl fmt::Debug for CurationSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurationSpecification")
            .field("version", &self.version)
            .field("input_path_pattern", &self.input_path_pattern)
            .field("excluded_filetypes", &self.excluded_filetypes)
            .field("deid", &self.deid)
            .field("additional_data", &self.additional_data)
            .field("host_props", &self.host_props)
            .finish_non_exhaustive()
    }
}

/// Serializable view of the data-valued fields of a specification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecSummary {
    pub version: String,
    pub input_path_pattern: String,
    pub excluded_filetypes: Vec<String>,
    #[serde(rename = "dicomPS315EOptions")]
    pub deid: DeidOption,
    pub lookup_keys: Vec<String>,
    pub host_props: HostProps,
}

impl CurationSpecification {
    pub fn summary(&self) -> SpecSummary {
        SpecSummary {
            version: self.version.clone(),
            input_path_pattern: self.input_path_pattern.clone(),
            excluded_filetypes: self.excluded_filetypes.clone(),
            deid: self.deid.clone(),
            lookup_keys: self
                .additional_data
                .as_ref()
                .map(|d| d.mapping.keys().cloned().collect())
                .unwrap_or_default(),
            host_props: self.host_props.clone(),
        }
    }
}
