//! Mapping and quarantine engine.
//!
//! [`curate_dataset`] turns one decoded file into its curated form:
//!
//! 1. naturalize the raw dataset into keyword form;
//! 2. [`collect_mappings`]: header edits from the specification, then the
//!    de-identification decision for every untouched path, with private
//!    elements moved into the quarantine;
//! 3. apply the decisions and compute the output path;
//! 4. rebuild the meta group and denaturalize;
//! 5. [`restore_quarantine`]: put every private element back by tag.

mod collect;
mod decision;
mod metaheader;
mod quarantine;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{denaturalize, naturalize};
use crate::curate::MapResults;
use crate::dataset::{DicomFile, NaturalDataset, Value};
use crate::deid::{BasicProfile, DateOffset, DeidPolicy};
use crate::lookup::ColumnMappings;
use crate::resolve::{path, AttrPath, Resolver};
use crate::spec::CurationSpecification;

pub use collect::collect_mappings;
pub use decision::{MappingDecision, MappingOperation, MappingTable, Quarantine};
pub use metaheader::map_metaheader;
pub use quarantine::restore_quarantine;

/// Everything a worker needs to map files, shared read-only.
#[derive(Clone)]
pub struct MappingOptions {
    pub spec: Arc<CurationSpecification>,
    pub policy: Arc<dyn DeidPolicy>,
    pub column_mappings: Option<Arc<ColumnMappings>>,
    pub date_offset: Option<DateOffset>,
    pub skip_modifications: bool,
    pub skip_validation: bool,
}

impl MappingOptions {
    /// Options for `spec` with a fresh per-run de-identification profile.
    pub fn new(spec: Arc<CurationSpecification>) -> Self {
        Self {
            spec,
            policy: Arc::new(BasicProfile::for_run()),
            column_mappings: None,
            date_offset: None,
            skip_modifications: false,
            skip_validation: false,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DeidPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_column_mappings(mut self, mappings: Option<Arc<ColumnMappings>>) -> Self {
        self.column_mappings = mappings;
        self
    }

    pub fn with_date_offset(mut self, offset: Option<DateOffset>) -> Self {
        self.date_offset = offset;
        self
    }

    pub fn with_skip_modifications(mut self, skip: bool) -> Self {
        self.skip_modifications = skip;
        self
    }

    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Bind a resolver for one file.
    pub fn resolver<'a>(&'a self, dataset: &'a NaturalDataset, file_path: &'a str) -> Resolver<'a> {
        Resolver::new(dataset, file_path, &self.spec, self.policy.as_ref())
            .with_column_mappings(self.column_mappings.as_deref())
    }
}

impl fmt::Debug for MappingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingOptions")
            .field("spec", &self.spec)
            .field("policy", &self.policy)
            .field("lookup_keys", &self.column_mappings.as_ref().map(|m| m.len()))
            .field("date_offset", &self.date_offset)
            .field("skip_modifications", &self.skip_modifications)
            .field("skip_validation", &self.skip_validation)
            .finish()
    }
}

/// A curated file ready for encoding, with its mapping results.
#[derive(Debug, Clone)]
pub struct CuratedDataset {
    pub file: DicomFile,
    pub map_results: MapResults,
}

/// Apply the mapping table; returns anomalies for paths that could not change.
fn apply_mappings(natural: &mut NaturalDataset, mappings: &MappingTable) -> Vec<String> {
    let mut anomalies = Vec::new();
    for (key, decision) in mappings {
        let Some(attr) = AttrPath::parse(key) else {
            anomalies.push(format!("Invalid attribute path '{}'", key));
            continue;
        };
        match decision.operation {
            MappingOperation::Keep => {}
            MappingOperation::Replace => {
                let value = decision
                    .value
                    .clone()
                    .unwrap_or_else(|| Value::Text(String::new()));
                if !path::set(natural, &attr, value) {
                    anomalies.push(format!("Could not set {}", key));
                }
            }
            MappingOperation::Delete => {
                path::unset(natural, &attr);
            }
            MappingOperation::Unknown => {
                warn!(path = %key, "unknown mapping operation, skipping");
            }
        }
    }
    anomalies
}

fn sanitize_segment(segment: &str) -> String {
    match segment.trim() {
        "." | ".." => "_".to_string(),
        s => s.to_string(),
    }
}

/// Join output components into a relative path; empty segments are dropped.
pub(crate) fn join_output_path(components: &[String]) -> String {
    components
        .iter()
        .flat_map(|c| c.split('/'))
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map one decoded file.
///
/// `file_path` is the file's `path/name` relative to the scan root and is
/// what path templates resolve against.
pub fn curate_dataset(
    file_path: &str,
    file_index: usize,
    file: &DicomFile,
    options: &MappingOptions,
) -> CuratedDataset {
    let natural = naturalize(&file.dict);
    let mut results = collect_mappings(&natural, file_path, options);

    let mut mapped = natural.clone();
    let anomalies = apply_mappings(&mut mapped, &results.mappings);
    results.anomalies.extend(anomalies);

    let components = {
        let resolver = options.resolver(&mapped, file_path);
        (options.spec.output_path_components)(&resolver)
    };
    let mut output_path = join_output_path(&components);
    if output_path.is_empty() {
        let name = file_path.rsplit('/').next().unwrap_or(file_path);
        results
            .errors
            .push(format!("Output path for {} resolved to nothing", file_path));
        output_path = sanitize_segment(name);
    }
    results.output_file_path = Some(output_path);

    let sop_class = mapped.get("SOPClassUID").map(|v| v.to_string());
    let sop_instance = mapped.get("SOPInstanceUID").map(|v| v.to_string());
    let meta = map_metaheader(&file.meta, sop_class.as_deref(), sop_instance.as_deref());

    let (mut dict, problems) = denaturalize(&mapped);
    results.anomalies.extend(problems);
    let restore = restore_quarantine(&mut dict, &results.quarantine);
    results.anomalies.extend(restore);

    debug!(
        file = file_path,
        index = file_index,
        output = results.output_file_path.as_deref().unwrap_or_default(),
        "mapped dataset"
    );

    CuratedDataset {
        file: DicomFile::new(meta, dict),
        map_results: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{RawDataset, RawElement, RawValue, Tag, Vr};
    use crate::deid::{DeidLayer, PartialPs315Options};
    use crate::spec::{compose_specs, HeaderEdits, PartialSpec};

    fn ui(s: &str) -> RawElement {
        RawElement::new(Vr::UI, RawValue::Strings(vec![s.into()]))
    }

    fn file() -> DicomFile {
        let mut item = RawDataset::new();
        item.insert(Tag::new(0x0008, 0x1155), ui("1.2.3.9"));
        item.insert(
            Tag::new(0x0009, 0x1010),
            RawElement::new(Vr::LO, RawValue::Strings(vec!["vendor".into()])),
        );

        let mut dict = RawDataset::new();
        dict.insert(Tag::new(0x0008, 0x0016), ui("1.2.840.10008.5.1.4.1.1.4"));
        dict.insert(Tag::new(0x0008, 0x0018), ui("1.2.3.4"));
        dict.insert(Tag::new(0x0008, 0x1115), RawElement::sequence(vec![item]));
        dict.insert(
            Tag::new(0x0010, 0x0010),
            RawElement::new(Vr::PN, RawValue::Strings(vec!["Doe^Jane".into()])),
        );
        dict.insert(
            Tag::new(0x0010, 0x0020),
            RawElement::new(Vr::LO, RawValue::Strings(vec!["P1".into()])),
        );

        let mut meta = RawDataset::new();
        meta.insert(Tag::new(0x0002, 0x0003), ui("1.2.3.4"));
        DicomFile::new(meta, dict)
    }

    fn options(partial: PartialSpec) -> MappingOptions {
        MappingOptions::new(Arc::new(compose_specs(&[partial.into()]).unwrap()))
    }

    #[test]
    fn test_join_output_path() {
        let parts = vec!["a".to_string(), "".to_string(), "..".to_string(), "b/c.dcm".to_string()];
        assert_eq!(join_output_path(&parts), "a/_/b/c.dcm");
    }

    #[test]
    fn test_apply_skips_unknown_operation() {
        let mut ds = NaturalDataset::new();
        ds.insert("PatientID".into(), Value::from("P1"));
        let mut table = MappingTable::new();
        table.insert(
            "PatientID".into(),
            MappingDecision {
                operation: MappingOperation::Unknown,
                previous: None,
                value: Some(Value::from("X")),
            },
        );
        assert!(apply_mappings(&mut ds, &table).is_empty());
        assert_eq!(ds["PatientID"], Value::from("P1"));
    }

    #[test]
    fn test_curate_dataset_edits_and_output_path() {
        let spec = PartialSpec::new()
            .with_input_path_pattern("patient/file")
            .with_modify_header(|r| {
                let mut edits = HeaderEdits::new();
                if let Some(p) = r.file_path_component("patient") {
                    edits.insert("PatientID".into(), Some(Value::Text(p)));
                }
                edits
            })
            .with_output_path_components(|r| {
                vec![
                    r.dicom_string("PatientID").unwrap_or_default(),
                    r.file_path_component("@filename").unwrap_or_default(),
                ]
            });
        let curated = curate_dataset("root/p9/img.dcm", 0, &file(), &options(spec));

        assert_eq!(curated.map_results.output_file_path.as_deref(), Some("p9/img.dcm"));
        assert_eq!(
            curated.file.dict[&Tag::new(0x0010, 0x0020)].first_string(),
            Some("p9")
        );
        // Nested private element survives at its original place.
        match &curated.file.dict[&Tag::new(0x0008, 0x1115)].value {
            RawValue::Items(items) => assert!(items[0].contains_key(&Tag::new(0x0009, 0x1010))),
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn test_meta_follows_protected_uid() {
        let spec = PartialSpec::new().with_deid(DeidLayer::Options(PartialPs315Options::new()));
        let curated = curate_dataset("root/img.dcm", 0, &file(), &options(spec));
        let sop = curated.file.dict[&Tag::new(0x0008, 0x0018)].first_string().unwrap();
        assert!(sop.starts_with("2.25."));
        assert_eq!(
            curated.file.meta[&Tag::new(0x0002, 0x0003)].first_string(),
            Some(sop)
        );
    }

    fn lo(s: &str) -> RawElement {
        RawElement::new(Vr::LO, RawValue::Strings(vec![s.into()]))
    }

    #[test]
    fn test_deid_removes_secondary_identifiers() {
        let mut source = file();
        source.dict.insert(Tag::new(0x0010, 0x1000), lo("MRN-778"));
        source.dict.insert(Tag::new(0x0010, 0x1040), lo("1 Main St"));
        source.dict.insert(
            Tag::new(0x0010, 0x2154),
            RawElement::new(Vr::SH, RawValue::Strings(vec!["555-0100".into()])),
        );
        // Not in the built-in dictionary.
        source.dict.insert(
            Tag::new(0x0010, 0x2297),
            RawElement::new(Vr::PN, RawValue::Strings(vec!["Doe^John".into()])),
        );
        let mut item = RawDataset::new();
        item.insert(Tag::new(0x0010, 0x0020), lo("P1"));
        source.dict.insert(Tag::new(0x0018, 0x9346), RawElement::sequence(vec![item]));

        let spec = PartialSpec::new().with_deid(DeidLayer::Options(PartialPs315Options::new()));
        let curated = curate_dataset("root/img.dcm", 0, &source, &options(spec));
        let dict = &curated.file.dict;

        for tag in [
            Tag::new(0x0010, 0x1000),
            Tag::new(0x0010, 0x1040),
            Tag::new(0x0010, 0x2154),
            Tag::new(0x0010, 0x2297),
        ] {
            assert!(!dict.contains_key(&tag), "{} survived de-identification", tag);
        }
        match &dict[&Tag::new(0x0018, 0x9346)].value {
            RawValue::Items(items) => assert_eq!(items[0][&Tag::new(0x0010, 0x0020)].value, RawValue::Empty),
            other => panic!("expected items, got {:?}", other),
        }
        assert!(curated.map_results.anomalies.is_empty(), "{:?}", curated.map_results.anomalies);
    }

    #[test]
    fn test_private_edits_reach_output() {
        let mut source = file();
        source.dict.insert(Tag::new(0x0029, 0x1010), lo("site secret"));
        source.dict.insert(Tag::new(0x0029, 0x1011), lo("keep me"));
        let spec = PartialSpec::new().with_modify_header(|_| {
            let mut edits = HeaderEdits::new();
            edits.insert("00291010".into(), None);
            edits.insert("(0029,1011)".into(), Some(Value::from("edited")));
            edits
        });
        let curated = curate_dataset("root/img.dcm", 0, &source, &options(spec));

        assert!(!curated.file.dict.contains_key(&Tag::new(0x0029, 0x1010)));
        assert_eq!(curated.file.dict[&Tag::new(0x0029, 0x1011)], lo("edited"));
        assert!(curated.map_results.anomalies.is_empty(), "{:?}", curated.map_results.anomalies);
    }

    #[test]
    fn test_empty_output_path_falls_back_to_name() {
        let spec = PartialSpec::new().with_output_path_components(|_| vec![String::new()]);
        let curated = curate_dataset("root/img.dcm", 0, &file(), &options(spec));
        assert_eq!(curated.map_results.output_file_path.as_deref(), Some("img.dcm"));
        assert_eq!(curated.map_results.errors.len(), 1);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let spec = PartialSpec::new().with_deid(DeidLayer::Options(PartialPs315Options::new()));
        let opts = options(spec);
        let a = curate_dataset("root/img.dcm", 0, &file(), &opts);
        let b = curate_dataset("root/img.dcm", 1, &file(), &opts);
        assert_eq!(a.map_results.mappings, b.map_results.mappings);
        assert_eq!(a.file, b.file);
    }
}
