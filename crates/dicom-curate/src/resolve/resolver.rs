//! Per-file view used by specification functions.

use std::fmt;

use crate::codec::dictionary;
use crate::dataset::{NaturalDataset, Value};
use crate::deid::{self, DeidPolicy};
use crate::lookup::ColumnMappings;
use crate::spec::CurationSpecification;

use super::path::{self, AttrPath};

/// Selects one segment of a file's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    /// A named segment of the input path pattern.
    Named(String),
    /// Position in the concrete path; negative counts from the end.
    Index(isize),
    /// The last segment.
    Filename,
    /// The last segment without its extension.
    Basename,
}

impl PathComponent {
    /// Parse a token: `@filename`, `@basename`, an integer, or a pattern name.
    pub fn parse(token: &str) -> Self {
        match token {
            "@filename" => PathComponent::Filename,
            "@basename" => PathComponent::Basename,
            _ => match token.parse::<isize>() {
                Ok(index) => PathComponent::Index(index),
                Err(_) => PathComponent::Named(token.to_string()),
            },
        }
    }
}

impl From<&str> for PathComponent {
    fn from(token: &str) -> Self {
        PathComponent::parse(token)
    }
}

impl From<isize> for PathComponent {
    fn from(index: isize) -> Self {
        PathComponent::Index(index)
    }
}

/// Resolves path segments, attributes and lookups for one file.
pub struct Resolver<'a> {
    dataset: &'a NaturalDataset,
    file_path: &'a str,
    spec: &'a CurationSpecification,
    policy: &'a dyn DeidPolicy,
    column_mappings: Option<&'a ColumnMappings>,
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("file_path", &self.file_path)
            .field("attributes", &self.dataset.len())
            .finish()
    }
}

impl<'a> Resolver<'a> {
    /// Bind a resolver to a dataset and its `path/name`.
    pub fn new(
        dataset: &'a NaturalDataset,
        file_path: &'a str,
        spec: &'a CurationSpecification,
        policy: &'a dyn DeidPolicy,
    ) -> Self {
        Self {
            dataset,
            file_path,
            spec,
            policy,
            column_mappings: None,
        }
    }

    pub fn with_column_mappings(mut self, mappings: Option<&'a ColumnMappings>) -> Self {
        self.column_mappings = mappings;
        self
    }

    pub fn file_path(&self) -> &str {
        self.file_path
    }

    /// Segments of the file path, in order.
    pub fn path_segments(&self) -> Vec<String> {
        self.file_path.split('/').map(|s| s.to_string()).collect()
    }

    pub fn dataset(&self) -> &'a NaturalDataset {
        self.dataset
    }

    /// Segment of the concrete path selected by `component`.
    ///
    /// Named segments are matched against the pattern aligned to the end
    /// of the concrete path, so a scan prefix before the pattern is skipped.
    pub fn file_path_component(&self, component: impl Into<PathComponent>) -> Option<String> {
        let component = component.into();
        let parts: Vec<&str> = self.file_path.split('/').collect();

        let idx = match &component {
            PathComponent::Index(i) if *i < 0 => parts.len().checked_sub(i.unsigned_abs())?,
            PathComponent::Index(i) => *i as usize,
            PathComponent::Filename | PathComponent::Basename => parts.len() - 1,
            PathComponent::Named(name) => {
                let pattern: Vec<&str> = self.spec.input_path_pattern.split('/').collect();
                let pos = pattern.iter().position(|p| p == name)?;
                pos + parts.len().saturating_sub(pattern.len())
            }
        };
        let segment = *parts.get(idx)?;

        if component == PathComponent::Basename {
            if let Some(dot) = segment.rfind('.') {
                return Some(segment[..dot].to_string());
            }
        }
        Some(segment.to_string())
    }

    /// Value at an attribute path, or at a tag identifier such as `(0010,0020)`.
    pub fn dicom_attribute(&self, path: &str) -> Option<&'a Value> {
        let path = dictionary::keyword_for_identifier(path).unwrap_or(path);
        path::get(self.dataset, &AttrPath::parse(path)?)
    }

    /// Attribute value rendered as text.
    pub fn dicom_string(&self, path: &str) -> Option<String> {
        self.dicom_attribute(path).map(|v| v.to_string())
    }

    /// True when the attribute is absent or an empty string.
    pub fn is_missing(&self, path: &str) -> bool {
        match self.dicom_attribute(path) {
            None => true,
            Some(Value::Text(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Protected form of a UID when de-identification is active, else the UID.
    pub fn protect_uid(&self, uid: &str) -> String {
        match self.spec.deid.profile() {
            Some(options) => self.policy.protect_uid(uid, options),
            None => uid.to_string(),
        }
    }

    /// Value from the auxiliary table for a lookup key.
    pub fn lookup_auxiliary(&self, key: &str) -> Option<String> {
        let data = self.spec.additional_data.as_ref()?;
        let mappings = self.column_mappings?;
        let entry = data.mapping.get(key)?;
        let matched = (entry.value)(self)?;
        mappings.get(key)?.get(&matched).cloned()
    }

    /// Add whole days to a `YYYYMMDD` date.
    pub fn shift_date(&self, date: &str, offset_days: i64) -> Option<String> {
        deid::shift_date(date, offset_days)
    }

    /// Read from `dicom` attributes or, for any other source, the file path.
    pub fn from(&self, source: &str, identifier: &str) -> Option<String> {
        if source == "dicom" {
            self.dicom_string(identifier)
        } else {
            self.file_path_component(identifier)
        }
    }
}
