//! Declarative JSON specification documents.
//!
//! A document describes one [`PartialSpec`] without code. String values
//! are templates that may interpolate:
//!
//! - `{path:<token>}`: a segment of the input path (`@filename`,
//!   `@basename`, an index, or a pattern name);
//! - `{dicom:<attribute path>}`: an attribute of the file;
//! - `{uid:<attribute path>}`: an attribute passed through UID protection;
//! - `{lookup:<key>}`: a value from the auxiliary table.
//!
//! A template that is exactly one `{dicom:...}` placeholder yields the
//! attribute with its type preserved.
//!
//! ```json
//! {
//!   "version": "3.0",
//!   "inputPathPattern": "patient/study/series/file",
//!   "modifications": { "PatientID": "{path:patient}", "PatientComments": null },
//!   "outputPathComponents": ["{dicom:PatientID}", "{path:@basename}.dcm"],
//!   "dicomPS315EOptions": { "retainUIDsOption": "Hashed" }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::Value;
use crate::deid::DeidLayer;
use crate::error::{CurateError, Result};
use crate::lookup::ColumnLookup;
use crate::resolve::Resolver;

use super::layer::PartialSpec;
use super::model::{AdditionalData, HeaderEdits, HostProps, LookupEntry, SPEC_VERSION};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(path|dicom|lookup|uid):([^{}]*)\}").unwrap());

/// One lookup key in a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupDocument {
    /// Template for the value matched against `lookup.matchColumn`.
    pub value: String,
    pub lookup: ColumnLookup,
}

/// The `additionalData` section of a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdditionalDataDocument {
    #[serde(default)]
    pub mapping: IndexMap<String, LookupDocument>,
}

/// A specification layer as written in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path_pattern: Option<String>,
    /// Attribute path → template, or `null` to delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<IndexMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path_components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_filetypes: Option<Vec<String>>,
    #[serde(rename = "dicomPS315EOptions", default, skip_serializing_if = "Option::is_none")]
    pub deid: Option<DeidLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<AdditionalDataDocument>,
    /// Attributes whose absence is reported as an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_props: Option<HostProps>,
}

fn default_version() -> String {
    SPEC_VERSION.to_string()
}

impl SpecDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CurateError::io(path, e))?;
        Self::from_json(&text)
    }

    /// Compile the document into a specification layer.
    pub fn into_partial(self) -> Result<PartialSpec> {
        let mut partial = PartialSpec::new().with_version(self.version);
        partial.input_path_pattern = self.input_path_pattern;
        partial.excluded_filetypes = self.excluded_filetypes;
        partial.deid = self.deid;
        partial.host_props = self.host_props;

        if let Some(modifications) = self.modifications {
            let compiled: Vec<(String, Option<Template>)> = modifications
                .into_iter()
                .map(|(path, t)| -> Result<(String, Option<Template>)> {
                    Ok((path, t.map(|t| Template::parse(&t)).transpose()?))
                })
                .collect::<Result<_>>()?;
            partial = partial.with_modify_header(move |r| {
                let mut edits = HeaderEdits::new();
                for (path, template) in &compiled {
                    match template {
                        None => {
                            edits.insert(path.clone(), None);
                        }
                        Some(template) => {
                            if let Some(value) = template.evaluate(r) {
                                edits.insert(path.clone(), Some(value));
                            }
                        }
                    }
                }
                edits
            });
        }

        if let Some(components) = self.output_path_components {
            let compiled = components
                .iter()
                .map(|c| Template::parse(c))
                .collect::<Result<Vec<_>>>()?;
            partial = partial.with_output_path_components(move |r| {
                compiled.iter().map(|t| t.render(r)).collect()
            });
        }

        if let Some(data) = self.additional_data {
            let mut mapping = IndexMap::new();
            for (key, entry) in data.mapping {
                let template = Template::parse(&entry.value)?;
                mapping.insert(
                    key,
                    LookupEntry {
                        value: Arc::new(move |r: &Resolver<'_>| {
                            Some(template.render(r)).filter(|s| !s.is_empty())
                        }),
                        lookup: entry.lookup,
                    },
                );
            }
            partial = partial.with_additional_data(AdditionalData { mapping });
        }

        if let Some(required) = self.required_attributes {
            partial = partial.with_errors(move |r| {
                required
                    .iter()
                    .filter(|attr| r.is_missing(attr))
                    .map(|attr| format!("Missing required attribute {}", attr))
                    .collect()
            });
        }

        Ok(partial)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Path(String),
    Dicom(String),
    Lookup(String),
    Uid(String),
}

/// A compiled template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(text) {
            let (Some(whole), Some(kind), Some(arg)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(text[last..whole.start()].to_string()));
            }
            let arg = arg.as_str().trim().to_string();
            if arg.is_empty() {
                return Err(CurateError::Config(format!(
                    "Empty placeholder in template '{}'",
                    text
                )));
            }
            parts.push(match kind.as_str() {
                "path" => Part::Path(arg),
                "dicom" => Part::Dicom(arg),
                "lookup" => Part::Lookup(arg),
                _ => Part::Uid(arg),
            });
            last = whole.end();
        }
        if last < text.len() {
            parts.push(Part::Literal(text[last..].to_string()));
        }
        Ok(Self { parts })
    }

    /// Evaluate to a value. A lone `{dicom:...}` keeps the attribute's type;
    /// `None` when a lone placeholder does not resolve.
    pub fn evaluate(&self, r: &Resolver<'_>) -> Option<Value> {
        match self.parts.as_slice() {
            [Part::Dicom(path)] => r.dicom_attribute(path).cloned(),
            [single] if !matches!(single, Part::Literal(_)) => {
                self.part_text(single, r).map(Value::Text)
            }
            _ => Some(Value::Text(self.render(r))),
        }
    }

    /// Render as text; unresolved placeholders render empty.
    pub fn render(&self, r: &Resolver<'_>) -> String {
        self.parts
            .iter()
            .map(|p| self.part_text(p, r).unwrap_or_default())
            .collect()
    }

    fn part_text(&self, part: &Part, r: &Resolver<'_>) -> Option<String> {
        match part {
            Part::Literal(s) => Some(s.clone()),
            Part::Path(token) => r.file_path_component(token.as_str()),
            Part::Dicom(path) => r.dicom_string(path),
            Part::Lookup(key) => r.lookup_auxiliary(key),
            Part::Uid(path) => r.dicom_string(path).map(|uid| r.protect_uid(&uid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::NaturalDataset;
    use crate::deid::BasicProfile;
    use crate::spec::compose_specs;

    const DOC: &str = r#"{
        "version": "3.0",
        "inputPathPattern": "patient/study/series/file",
        "modifications": {
            "PatientID": "{path:patient}",
            "PatientName": "{path:patient}^anon",
            "Rows": "{dicom:Rows}",
            "PatientComments": null,
            "StudyID": "{dicom:Missing}"
        },
        "outputPathComponents": ["{dicom:PatientID}", "{path:@basename}.dcm"],
        "excludedFiletypes": ["notes.txt"],
        "dicomPS315EOptions": "Off",
        "requiredAttributes": ["Modality"]
    }"#;

    fn dataset() -> NaturalDataset {
        let mut ds = NaturalDataset::new();
        ds.insert("PatientID".into(), Value::from("orig"));
        ds.insert("Rows".into(), Value::Int(512));
        ds
    }

    #[test]
    fn test_document_compiles_to_layer() {
        let partial = SpecDocument::from_json(DOC).unwrap().into_partial().unwrap();
        let spec = compose_specs(&[partial.into()]).unwrap();
        assert_eq!(spec.excluded_filetypes, vec!["notes.txt"]);

        let ds = dataset();
        let policy = BasicProfile::new();
        let r = Resolver::new(&ds, "scan/p7/s1/se1/img1.dcm", &spec, &policy);

        let edits = (spec.modify_header)(&r);
        assert_eq!(edits["PatientID"], Some(Value::from("p7")));
        assert_eq!(edits["PatientName"], Some(Value::from("p7^anon")));
        assert_eq!(edits["Rows"], Some(Value::Int(512)));
        assert_eq!(edits["PatientComments"], None);
        assert!(!edits.contains_key("StudyID"));

        assert_eq!((spec.output_path_components)(&r), vec!["orig", "img1.dcm"]);
        assert_eq!((spec.errors)(&r), vec!["Missing required attribute Modality"]);
    }

    #[test]
    fn test_template_parsing() {
        let t = Template::parse("a{path:0}-{dicom:X}").unwrap();
        assert_eq!(t.parts.len(), 4);
        assert!(Template::parse("{dicom: }").is_err());
        assert_eq!(Template::parse("plain").unwrap().parts, vec![Part::Literal("plain".into())]);
    }

    #[test]
    fn test_version_defaults() {
        let doc = SpecDocument::from_json("{}").unwrap();
        assert_eq!(doc.version, SPEC_VERSION);
    }
}
