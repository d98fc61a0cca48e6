//! Building the mapping table and quarantine for one dataset.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::codec::{dictionary, value_to_element};
use crate::curate::MapResults;
use crate::dataset::{NaturalDataset, RawElement, RawValue, Tag, Value, Vr};
use crate::deid::{Action, PrivateMode, Ps315Options};
use crate::resolve::{path, AttrPath, Resolver};

use super::decision::MappingDecision;
use super::MappingOptions;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn private_tag(key: &str) -> bool {
    Tag::parse(key).is_some_and(|t| t.is_private())
}

/// Keyword for a known tag identifier, the 8-digit form for any other tag,
/// else the key unchanged.
fn normalize_key(key: &str) -> String {
    match Tag::parse(key) {
        Some(tag) => dictionary::natural_key(tag),
        None => key.to_string(),
    }
}

/// Every private element, by keyword path. Private sequences are taken whole.
pub(crate) fn private_elements(ds: &NaturalDataset, prefix: &str, out: &mut Vec<(String, Value)>) {
    for (key, value) in ds {
        let path = join(prefix, key);
        if private_tag(key) {
            out.push((path, value.clone()));
            continue;
        }
        if let Value::Sequence(items) = value {
            for (i, item) in items.iter().enumerate() {
                private_elements(item, &format!("{}[{}]", path, i), out);
            }
        }
    }
}

/// Produce the mapping table, anomalies, diagnostics and quarantine.
pub fn collect_mappings(
    natural: &NaturalDataset,
    file_path: &str,
    options: &MappingOptions,
) -> MapResults {
    let mut results = MapResults {
        source_instance_uid: natural
            .get("SOPInstanceUID")
            .map(|v| v.to_string())
            .unwrap_or_default(),
        ..MapResults::default()
    };

    let spec = options.spec.as_ref();
    let profile = spec.deid.profile();
    let resolver = options.resolver(natural, file_path);

    // Private elements cannot travel through the keyword model.
    let mut privates = Vec::new();
    private_elements(natural, "", &mut privates);
    let drop_private = profile
        .is_some_and(|p| p.retain_safe_private_option == PrivateMode::Off)
        && !options.skip_modifications;
    for (path, value) in privates {
        if drop_private {
            results.mappings.insert(path, MappingDecision::delete(Some(value)));
        } else if let Value::Raw(element) = value {
            results.quarantine.insert(path, element);
        }
    }

    let mut touched = HashSet::new();

    if !options.skip_modifications {
        let edits = (spec.modify_header)(&resolver);
        for (key, desired) in edits {
            let Some(attr) = AttrPath::parse(&key) else {
                results.anomalies.push(format!("Invalid attribute path '{}'", key));
                continue;
            };
            // Tag identifiers address the same attribute as their keyword.
            let attr = attr.map_keys(normalize_key);
            let key = attr.to_string();
            let known = attr.segments().iter().all(|s| match s {
                path::Segment::Key(k) => {
                    dictionary::lookup_keyword(k).is_some() || Tag::parse(k).is_some()
                }
                path::Segment::Index(_) => true,
            });
            if !known {
                results.anomalies.push(format!("Unknown attribute in path '{}'", key));
                continue;
            }

            let canonical = attr.with_explicit_indices();
            let private_at = canonical
                .segments()
                .iter()
                .position(|s| matches!(s, path::Segment::Key(k) if private_tag(k)));
            if let Some(position) = private_at {
                if position + 1 == canonical.segments().len() {
                    edit_private(&mut results, natural, &canonical, desired);
                } else {
                    results
                        .anomalies
                        .push(format!("Cannot edit inside private element '{}'", key));
                }
                touched.insert(canonical.to_string());
                continue;
            }

            let previous = path::get(natural, &attr).cloned();
            match desired {
                None if previous.is_some() => {
                    results.mappings.insert(key.clone(), MappingDecision::delete(previous));
                }
                None => {}
                Some(value) if previous.as_ref() != Some(&value) => {
                    results
                        .mappings
                        .insert(key.clone(), MappingDecision::replace(previous, value));
                }
                Some(_) => {}
            }
            touched.insert(canonical.to_string());
        }

        if let Some(profile) = profile {
            let mut walker = DeidWalker {
                options,
                profile,
                touched: &touched,
                results: &mut results,
                resolver: &resolver,
            };
            walker.walk(natural, "");
        }
    }

    if !options.skip_validation {
        results.errors.extend((spec.errors)(&resolver));
    }

    debug!(
        file = file_path,
        mappings = results.mappings.len(),
        quarantined = results.quarantine.len(),
        "collected mappings"
    );
    results
}

/// Apply a header edit to a private element through the quarantine, which
/// is the only way private elements reach the output.
fn edit_private(
    results: &mut MapResults,
    natural: &NaturalDataset,
    attr: &AttrPath,
    desired: Option<Value>,
) {
    let key = attr.to_string();
    let existing = results.quarantine.get(&key).cloned().or_else(|| match path::get(natural, attr) {
        Some(Value::Raw(element)) => Some(element.clone()),
        _ => None,
    });
    let previous = existing.clone().map(Value::Raw);

    let Some(value) = desired else {
        results.quarantine.shift_remove(&key);
        if previous.is_some() {
            results.mappings.insert(key, MappingDecision::delete(previous));
        }
        return;
    };

    let vr = existing.as_ref().map_or(Vr::UN, |e| e.vr);
    let Some(element) = value_to_element(&value, vr) else {
        results
            .anomalies
            .push(format!("Value for private element '{}' cannot be written as {}", key, vr));
        return;
    };
    if existing.as_ref() == Some(&element) {
        // Kept as is, even when private elements are otherwise dropped.
        results.mappings.shift_remove(&key);
    } else {
        results
            .mappings
            .insert(key.clone(), MappingDecision::replace(previous, value));
    }
    results.quarantine.insert(key, element);
}

/// Empty form of a value, keeping the VR of raw elements.
fn emptied(value: &Value) -> Value {
    match value {
        Value::Sequence(_) => Value::Sequence(Vec::new()),
        Value::Raw(element) => Value::Raw(RawElement::new(element.vr, RawValue::Empty)),
        _ => Value::Text(String::new()),
    }
}

struct DeidWalker<'a, 'r> {
    options: &'a MappingOptions,
    profile: &'a Ps315Options,
    touched: &'a HashSet<String>,
    results: &'a mut MapResults,
    resolver: &'a Resolver<'r>,
}

impl DeidWalker<'_, '_> {
    fn walk(&mut self, ds: &NaturalDataset, prefix: &str) {
        for (key, value) in ds {
            let path = join(prefix, key);
            if self.touched.contains(&path) {
                continue;
            }
            let action = match Tag::parse(key) {
                // Private elements travel through the quarantine.
                Some(tag) if tag.is_private() => continue,
                Some(tag) => self.options.policy.action_for_tag(tag, self.profile),
                None => self.options.policy.action(key, self.profile),
            };

            match action {
                Action::Retain => {
                    if let Value::Sequence(items) = value {
                        for (i, item) in items.iter().enumerate() {
                            self.walk(item, &format!("{}[{}]", path, i));
                        }
                    }
                }
                Action::Remove => {
                    self.decide(path, MappingDecision::delete(Some(value.clone())));
                }
                Action::Clean => {
                    if !value.is_empty() {
                        self.decide(path, MappingDecision::replace(Some(value.clone()), emptied(value)));
                    }
                }
                Action::ReplaceUid => {
                    let protected = match value {
                        Value::Text(uid) if !uid.is_empty() => Value::Text(self.resolver.protect_uid(uid)),
                        Value::Multi(uids) => Value::Multi(
                            uids.iter()
                                .map(|u| Value::Text(self.resolver.protect_uid(&u.to_string())))
                                .collect(),
                        ),
                        Value::Raw(RawElement {
                            vr,
                            value: RawValue::Strings(uids),
                        }) => Value::Raw(RawElement::new(
                            *vr,
                            RawValue::Strings(uids.iter().map(|u| self.resolver.protect_uid(u)).collect()),
                        )),
                        _ => continue,
                    };
                    if &protected != value {
                        self.decide(path, MappingDecision::replace(Some(value.clone()), protected));
                    }
                }
                Action::ShiftDate => self.shift(key, path, value),
            }
        }
    }

    fn shift(&mut self, key: &str, path: String, value: &Value) {
        let (text, is_datetime) = match value {
            Value::Text(text) => (
                text.as_str(),
                dictionary::lookup_keyword(key).is_some_and(|e| e.vr == Vr::DT),
            ),
            Value::Raw(RawElement {
                vr: vr @ (Vr::DA | Vr::DT),
                value: RawValue::Strings(values),
            }) if values.len() == 1 => (values[0].as_str(), *vr == Vr::DT),
            _ => return,
        };
        if text.is_empty() {
            return;
        }
        let shifted = self.options.date_offset.and_then(|offset| {
            if is_datetime {
                offset.shift_dt(text)
            } else {
                offset.shift_da(text)
            }
        });
        match shifted {
            Some(new) => {
                let new = match value {
                    Value::Raw(element) => Value::Raw(RawElement::new(element.vr, RawValue::Strings(vec![new]))),
                    _ => Value::Text(new),
                };
                self.decide(path, MappingDecision::replace(Some(value.clone()), new));
            }
            None => {
                warn!(path = %path, value = %text, "could not shift date, cleaning it");
                self.results
                    .anomalies
                    .push(format!("Could not shift date {} ({})", path, text));
                self.decide(path, MappingDecision::replace(Some(value.clone()), emptied(value)));
            }
        }
    }

    fn decide(&mut self, path: String, decision: MappingDecision) {
        self.results.mappings.insert(path, decision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{RawElement, RawValue};
    use crate::deid::{DateOffset, DeidLayer, LongitudinalMode, PartialPs315Options, UidMode};
    use crate::mapping::MappingOperation;
    use crate::spec::{compose_specs, HeaderEdits, PartialSpec};
    use std::sync::Arc;

    fn dataset() -> NaturalDataset {
        let mut item = NaturalDataset::new();
        item.insert("ReferencedSOPInstanceUID".into(), Value::from("1.2.3.9"));
        item.insert(
            "00091010".into(),
            Value::Raw(RawElement::new(Vr::LO, RawValue::Strings(vec!["vendor".into()]))),
        );

        let mut ds = NaturalDataset::new();
        ds.insert("SOPInstanceUID".into(), Value::from("1.2.3.4"));
        ds.insert("StudyDate".into(), Value::from("20240110"));
        ds.insert("PatientName".into(), Value::from("Doe^Jane"));
        ds.insert("PatientID".into(), Value::from("P1"));
        ds.insert("Modality".into(), Value::from("MR"));
        ds.insert("InstitutionName".into(), Value::from("General"));
        ds.insert("ReferencedSeriesSequence".into(), Value::Sequence(vec![item]));
        ds.insert(
            "00291010".into(),
            Value::Raw(RawElement::new(Vr::OB, RawValue::Bytes(vec![1, 2]))),
        );
        ds
    }

    fn options(layers: Vec<PartialSpec>) -> MappingOptions {
        let layers: Vec<_> = layers.into_iter().map(Into::into).collect();
        MappingOptions::new(Arc::new(compose_specs(&layers).unwrap()))
    }

    #[test]
    fn test_quarantine_collects_nested_private() {
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![PartialSpec::new()]));
        let keys: Vec<_> = results.quarantine.keys().cloned().collect();
        assert_eq!(keys, vec!["ReferencedSeriesSequence[0].00091010", "00291010"]);
        assert!(results.mappings.is_empty());
        assert_eq!(results.source_instance_uid, "1.2.3.4");
    }

    #[test]
    fn test_header_edits_classified() {
        let spec = PartialSpec::new().with_modify_header(|_| {
            let mut edits = HeaderEdits::new();
            edits.insert("PatientID".into(), Some(Value::from("NEW")));
            edits.insert("Modality".into(), Some(Value::from("MR")));
            edits.insert("InstitutionName".into(), None);
            edits.insert("StudyID".into(), None);
            edits.insert("NotAKeyword".into(), Some(Value::from("x")));
            edits
        });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));

        assert_eq!(results.mappings["PatientID"].operation, MappingOperation::Replace);
        assert_eq!(results.mappings["InstitutionName"].operation, MappingOperation::Delete);
        assert!(!results.mappings.contains_key("Modality"));
        assert!(!results.mappings.contains_key("StudyID"));
        assert_eq!(results.anomalies.len(), 1);
    }

    #[test]
    fn test_deid_applies_to_untouched_paths() {
        let layer = PartialPs315Options::new().with_uids(UidMode::Hashed);
        let spec = PartialSpec::new()
            .with_deid(DeidLayer::Options(layer))
            .with_modify_header(|_| {
                let mut edits = HeaderEdits::new();
                edits.insert("PatientName".into(), Some(Value::from("Kept^Name")));
                edits
            });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));

        assert_eq!(
            results.mappings["PatientName"].value,
            Some(Value::from("Kept^Name"))
        );
        assert_eq!(results.mappings["PatientID"].value, Some(Value::from("")));
        assert_eq!(results.mappings["InstitutionName"].operation, MappingOperation::Delete);
        assert_eq!(results.mappings["StudyDate"].value, Some(Value::from("")));
        let uid = results.mappings["SOPInstanceUID"].value.as_ref().unwrap().to_string();
        assert!(uid.starts_with("2.25."));
        assert!(results
            .mappings
            .contains_key("ReferencedSeriesSequence[0].ReferencedSOPInstanceUID"));
        assert!(!results.mappings.contains_key("Modality"));
        assert_eq!(results.quarantine.len(), 2);
    }

    #[test]
    fn test_deid_reaches_unnamed_standard_tags() {
        let mut ds = dataset();
        ds.insert("OtherPatientIDs".into(), Value::from("MRN-778"));
        ds.insert(
            "00102297".into(),
            Value::Raw(RawElement::new(Vr::PN, RawValue::Strings(vec!["Doe^John".into()]))),
        );
        ds.insert(
            "00189004".into(),
            Value::Raw(RawElement::new(Vr::CS, RawValue::Strings(vec!["PRODUCT".into()]))),
        );
        let spec = PartialSpec::new().with_deid(DeidLayer::Options(PartialPs315Options::new()));
        let results = collect_mappings(&ds, "a.dcm", &options(vec![spec]));

        assert_eq!(results.mappings["OtherPatientIDs"].operation, MappingOperation::Delete);
        assert_eq!(results.mappings["00102297"].operation, MappingOperation::Delete);
        assert!(!results.mappings.contains_key("00189004"));
    }

    #[test]
    fn test_private_replace_updates_quarantine() {
        let spec = PartialSpec::new().with_modify_header(|_| {
            let mut edits = HeaderEdits::new();
            edits.insert("(0029,1010)".into(), Some(Value::Bytes(vec![7, 7])));
            edits.insert("ReferencedSeriesSequence.00091010".into(), Some(Value::from("edited")));
            edits
        });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));

        assert!(results.anomalies.is_empty(), "{:?}", results.anomalies);
        assert_eq!(
            results.quarantine["00291010"],
            RawElement::new(Vr::OB, RawValue::Bytes(vec![7, 7]))
        );
        assert_eq!(
            results.quarantine["ReferencedSeriesSequence[0].00091010"],
            RawElement::new(Vr::LO, RawValue::Strings(vec!["edited".into()]))
        );
        assert_eq!(results.mappings["00291010"].operation, MappingOperation::Replace);
    }

    #[test]
    fn test_private_delete_leaves_quarantine() {
        let spec = PartialSpec::new().with_modify_header(|_| {
            let mut edits = HeaderEdits::new();
            edits.insert("00291010".into(), None);
            edits
        });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));
        assert!(!results.quarantine.contains_key("00291010"));
        assert_eq!(results.mappings["00291010"].operation, MappingOperation::Delete);
        assert_eq!(results.quarantine.len(), 1);
    }

    #[test]
    fn test_private_keep_survives_private_off() {
        let layer = PartialPs315Options::new().with_private(PrivateMode::Off);
        let spec = PartialSpec::new()
            .with_deid(DeidLayer::Options(layer))
            .with_modify_header(|_| {
                let mut edits = HeaderEdits::new();
                edits.insert("00291010".into(), Some(Value::Bytes(vec![1, 2])));
                edits
            });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));
        assert!(!results.mappings.contains_key("00291010"));
        assert!(results.quarantine.contains_key("00291010"));
        assert_eq!(
            results.mappings["ReferencedSeriesSequence[0].00091010"].operation,
            MappingOperation::Delete
        );
    }

    #[test]
    fn test_edit_inside_private_sequence_reported() {
        let spec = PartialSpec::new().with_modify_header(|_| {
            let mut edits = HeaderEdits::new();
            edits.insert("00291010[0].PatientName".into(), Some(Value::from("x")));
            edits
        });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));
        assert_eq!(results.anomalies.len(), 1);
        assert!(results.anomalies[0].contains("private element"));
    }

    #[test]
    fn test_implicit_item_edit_shields_item_from_deid() {
        let layer = PartialPs315Options::new().with_uids(UidMode::Hashed);
        let spec = PartialSpec::new()
            .with_deid(DeidLayer::Options(layer))
            .with_modify_header(|_| {
                let mut edits = HeaderEdits::new();
                edits.insert(
                    "ReferencedSeriesSequence.ReferencedSOPInstanceUID".into(),
                    Some(Value::from("1.2.3.10")),
                );
                edits
            });
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));

        assert_eq!(
            results.mappings["ReferencedSeriesSequence.ReferencedSOPInstanceUID"].value,
            Some(Value::from("1.2.3.10"))
        );
        assert!(!results
            .mappings
            .contains_key("ReferencedSeriesSequence[0].ReferencedSOPInstanceUID"));
    }

    #[test]
    fn test_private_off_deletes_instead_of_quarantine() {
        let layer = PartialPs315Options::new().with_private(PrivateMode::Off);
        let spec = PartialSpec::new().with_deid(DeidLayer::Options(layer));
        let results = collect_mappings(&dataset(), "a.dcm", &options(vec![spec]));
        assert!(results.quarantine.is_empty());
        assert_eq!(results.mappings["00291010"].operation, MappingOperation::Delete);
    }

    #[test]
    fn test_date_offset_shifts_dates() {
        let layer = PartialPs315Options::new().with_longitudinal(LongitudinalMode::Offset);
        let spec = PartialSpec::new().with_deid(DeidLayer::Options(layer));
        let opts = options(vec![spec]).with_date_offset(DateOffset::parse("P1D").ok());
        let results = collect_mappings(&dataset(), "a.dcm", &opts);
        assert_eq!(results.mappings["StudyDate"].value, Some(Value::from("20240111")));
    }

    #[test]
    fn test_skip_validation_and_diagnostics() {
        let spec = PartialSpec::new().with_errors(|r| {
            if r.is_missing("StudyID") {
                vec!["no study id".to_string()]
            } else {
                Vec::new()
            }
        });
        let opts = options(vec![spec]);
        let results = collect_mappings(&dataset(), "a.dcm", &opts);
        assert_eq!(results.errors, vec!["no study id"]);

        let results = collect_mappings(&dataset(), "a.dcm", &opts.with_skip_validation(true));
        assert!(results.errors.is_empty());
    }
}
