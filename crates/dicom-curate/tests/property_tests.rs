//! Property-based tests for composition, mapping and hashing.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p dicom-curate --test property_tests
//!
//! # More cases
//! PROPTEST_CASES=10000 cargo test -p dicom-curate --test property_tests
//! ```

use std::sync::Arc;

use proptest::prelude::*;

use dicom_curate::curate::sanitize_name;
use dicom_curate::dataset::{RawDataset, RawElement, RawValue, Vr};
use dicom_curate::deid::{DeidLayer, PartialPs315Options};
use dicom_curate::hash::hash;
use dicom_curate::resolve::AttrPath;
use dicom_curate::spec::SpecLayer;
use dicom_curate::{
    compose_specs, curate_dataset, DicomFile, HashMethod, MappingOptions, PartialSpec, Tag,
};

// =============================================================================
// Test Strategies
// =============================================================================

fn file_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.]{1,12}"
}

/// A layer that may or may not set each field.
fn layer() -> impl Strategy<Value = (Option<String>, Option<Vec<String>>)> {
    (
        proptest::option::of("[a-z]{1,8}(/[a-z]{1,8}){0,3}"),
        proptest::option::of(prop::collection::vec(file_name(), 0..4)),
    )
}

/// Private (odd-group) data element tags.
fn private_tag() -> impl Strategy<Value = Tag> {
    (0u16..8, 0x1000u16..0x10FF).prop_map(|(g, e)| Tag::new(0x0009 + 2 * g, e))
}

fn hash_method() -> impl Strategy<Value = HashMethod> {
    prop_oneof![
        Just(HashMethod::Crc64),
        Just(HashMethod::Crc32),
        Just(HashMethod::Sha256),
    ]
}

// =============================================================================
// Composition
// =============================================================================

proptest! {
    #[test]
    fn prop_composition_follows_layer_rules(layers in prop::collection::vec(layer(), 1..6)) {
        let spec_layers: Vec<SpecLayer> = layers
            .iter()
            .map(|(pattern, excluded)| {
                let mut partial = PartialSpec::new();
                if let Some(p) = pattern {
                    partial = partial.with_input_path_pattern(p.clone());
                }
                if let Some(names) = excluded {
                    partial = partial.with_excluded_filetypes(names.clone());
                }
                partial.into()
            })
            .collect();

        let spec = compose_specs(&spec_layers).unwrap();

        let expected_pattern = layers
            .iter()
            .rev()
            .find_map(|(p, _)| p.clone())
            .unwrap_or_default();
        prop_assert_eq!(spec.input_path_pattern, expected_pattern);

        let expected_excluded: Vec<String> = layers
            .iter()
            .filter_map(|(_, e)| e.clone())
            .flatten()
            .collect();
        prop_assert_eq!(spec.excluded_filetypes, expected_excluded);
    }

    #[test]
    fn prop_version_mismatch_always_rejected(version in "[0-9]\\.[0-9]") {
        prop_assume!(version != "3.0");
        let layer = PartialSpec::new().with_version(version);
        prop_assert!(compose_specs(&[layer.into()]).is_err());
    }
}

// =============================================================================
// Mapping
// =============================================================================

proptest! {
    #[test]
    fn prop_private_elements_survive_curation(
        privates in prop::collection::btree_map(
            private_tag(),
            "[A-Z0-9]{1,16}",
            0..6,
        ),
        deid in any::<bool>(),
    ) {
        let mut dict = RawDataset::new();
        dict.insert(
            Tag::new(0x0010, 0x0020),
            RawElement::new(Vr::LO, RawValue::Strings(vec!["P1".into()])),
        );
        for (tag, value) in &privates {
            dict.insert(*tag, RawElement::new(Vr::LO, RawValue::Strings(vec![value.clone()])));
        }
        let file = DicomFile::new(RawDataset::new(), dict);

        let mut partial = PartialSpec::new();
        if deid {
            partial = partial.with_deid(DeidLayer::Options(PartialPs315Options::new()));
        }
        let options = MappingOptions::new(Arc::new(compose_specs(&[partial.into()]).unwrap()));
        let curated = curate_dataset("root/a.dcm", 0, &file, &options);

        for (tag, value) in &privates {
            let restored = curated.file.dict.get(tag).and_then(|e| e.first_string());
            prop_assert_eq!(restored, Some(value.as_str()));
        }
        prop_assert_eq!(curated.map_results.quarantine.len(), privates.len());
    }

    #[test]
    fn prop_curation_is_deterministic(patient_id in "[A-Z0-9]{1,12}", name in file_name()) {
        let mut dict = RawDataset::new();
        dict.insert(
            Tag::new(0x0010, 0x0020),
            RawElement::new(Vr::LO, RawValue::Strings(vec![patient_id])),
        );
        let file = DicomFile::new(RawDataset::new(), dict);
        let partial = PartialSpec::new().with_deid(DeidLayer::Options(PartialPs315Options::new()));
        let options = MappingOptions::new(Arc::new(compose_specs(&[partial.into()]).unwrap()));
        let path = format!("root/{}", name);

        let first = curate_dataset(&path, 0, &file, &options);
        let second = curate_dataset(&path, 1, &file, &options);
        prop_assert_eq!(first.file, second.file);
        prop_assert_eq!(first.map_results.output_file_path, second.map_results.output_file_path);
    }

    #[test]
    fn prop_attr_paths_never_panic(path in "[A-Za-z0-9\\[\\]\\.]{0,40}") {
        if let Some(parsed) = AttrPath::parse(&path) {
            prop_assert!(!parsed.segments().is_empty());
            prop_assert_eq!(AttrPath::parse(&parsed.to_string()), Some(parsed));
        }
    }
}

// =============================================================================
// Hashing and Naming
// =============================================================================

proptest! {
    #[test]
    fn prop_hash_is_stable_lowercase_hex(data in prop::collection::vec(any::<u8>(), 0..512), method in hash_method()) {
        let digest = hash(&data, method);
        prop_assert_eq!(&digest, &hash(&data, method));
        prop_assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn prop_sanitized_names_are_alphanumeric(name in "\\PC{0,24}") {
        let clean = sanitize_name(&name);
        prop_assert_eq!(clean.chars().count(), name.chars().count());
        prop_assert!(clean.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
