//! Folding specification layers into one effective specification.

use std::sync::Arc;

use tracing::debug;

use crate::error::{CurateError, Result};
use crate::resolve::Resolver;

use super::layer::{Context, PartialSpec, SpecLayer};
use super::model::{CurationSpecification, HostProps, SPEC_VERSION};

/// Compose layers, in order, on top of the default specification.
///
/// Fails on an empty list or on any layer whose version differs from
/// [`SPEC_VERSION`].
pub fn compose_specs(layers: &[SpecLayer]) -> Result<CurationSpecification> {
    if layers.is_empty() {
        return Err(CurateError::Composition(
            "at least one specification layer is required".to_string(),
        ));
    }

    let mut spec = CurationSpecification::default();
    let mut ctx = Context::new();

    for (index, layer) in layers.iter().enumerate() {
        let produced;
        let partial = match layer {
            SpecLayer::Partial(partial) => partial,
            SpecLayer::Contextual(f) => {
                let out = f(&ctx);
                ctx.extend(out.ctx);
                match out.spec {
                    Some(partial) => {
                        produced = partial;
                        &produced
                    }
                    None => continue,
                }
            }
        };

        if partial.version != SPEC_VERSION {
            return Err(CurateError::VersionMismatch {
                expected: SPEC_VERSION.to_string(),
                found: partial.version.clone(),
            });
        }

        debug!(layer = index, "folding specification layer");
        fold(&mut spec, partial);
    }

    Ok(spec)
}

fn fold(spec: &mut CurationSpecification, layer: &PartialSpec) {
    if let Some(props) = &layer.host_props {
        merge_host_props(&mut spec.host_props, props);
    }

    if let Some(pattern) = &layer.input_path_pattern {
        spec.input_path_pattern = pattern.clone();
    }

    if let Some(deid) = &layer.deid {
        spec.deid = spec.deid.merge(deid);
    }

    if let Some(names) = &layer.excluded_filetypes {
        spec.excluded_filetypes.extend(names.iter().cloned());
    }

    if let Some(data) = &layer.additional_data {
        spec.additional_data = Some(data.clone());
    }

    if let Some(next) = &layer.modify_header {
        let prev = Arc::clone(&spec.modify_header);
        let next = Arc::clone(next);
        spec.modify_header = Arc::new(move |r: &Resolver<'_>| {
            let mut edits = prev(r);
            edits.extend(next(r));
            edits
        });
    }

    if let Some(output) = &layer.output_path_components {
        spec.output_path_components = Arc::clone(output);
    }

    if let Some(next) = &layer.errors {
        let prev = Arc::clone(&spec.errors);
        let next = Arc::clone(next);
        spec.errors = Arc::new(move |r: &Resolver<'_>| {
            let mut errors = prev(r);
            errors.extend(next(r));
            errors
        });
    }
}

/// Deep-merge `next` into `prev`: objects merge, arrays and scalars replace.
pub fn merge_host_props(prev: &mut HostProps, next: &HostProps) {
    for (key, value) in next {
        match (prev.get_mut(key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                merge_host_props(existing, incoming);
            }
            _ => {
                prev.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{NaturalDataset, Value};
    use crate::deid::{BasicProfile, DeidLayer, DeidOption, PartialPs315Options, UidMode};
    use crate::spec::{ContextLayer, HeaderEdits};
    use serde_json::json;

    fn props(value: serde_json::Value) -> HostProps {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn edits(pairs: &[(&str, &str)]) -> HeaderEdits {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(Value::from(*v))))
            .collect()
    }

    fn run_header(spec: &CurationSpecification) -> HeaderEdits {
        let ds = NaturalDataset::new();
        let policy = BasicProfile::new();
        let r = Resolver::new(&ds, "a.dcm", spec, &policy);
        (spec.modify_header)(&r)
    }

    #[test]
    fn test_empty_list_fails() {
        let err = compose_specs(&[]).unwrap_err();
        assert!(matches!(err, CurateError::Composition(_)));
    }

    #[test]
    fn test_version_mismatch_fails() {
        let layers = vec![
            PartialSpec::new().into(),
            PartialSpec::new().with_version("2.0").into(),
        ];
        let err = compose_specs(&layers).unwrap_err();
        assert!(matches!(err, CurateError::VersionMismatch { .. }));
    }

    #[test]
    fn test_scalar_fields_last_wins() {
        let layers = vec![
            PartialSpec::new().with_input_path_pattern("a/b").into(),
            PartialSpec::new().with_input_path_pattern("c/d/e").into(),
            PartialSpec::new().into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        assert_eq!(spec.input_path_pattern, "c/d/e");
    }

    #[test]
    fn test_excluded_filetypes_concatenate() {
        let layers = vec![
            PartialSpec::new().with_excluded_filetypes(["a.txt", "b.txt"]).into(),
            PartialSpec::new().with_excluded_filetypes(["b.txt"]).into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        assert_eq!(spec.excluded_filetypes, vec!["a.txt", "b.txt", "b.txt"]);
    }

    #[test]
    fn test_header_functions_compose_later_wins() {
        let layers = vec![
            PartialSpec::new()
                .with_modify_header(|_| edits(&[("PatientID", "a"), ("PatientName", "n")]))
                .into(),
            PartialSpec::new()
                .with_modify_header(|_| edits(&[("PatientID", "b")]))
                .into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        let result = run_header(&spec);
        assert_eq!(result["PatientID"], Some(Value::from("b")));
        assert_eq!(result["PatientName"], Some(Value::from("n")));
    }

    #[test]
    fn test_errors_accumulate() {
        let layers = vec![
            PartialSpec::new().with_errors(|_| vec!["one".to_string()]).into(),
            PartialSpec::new().with_errors(|_| vec!["two".to_string()]).into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        let ds = NaturalDataset::new();
        let policy = BasicProfile::new();
        let r = Resolver::new(&ds, "a.dcm", &spec, &policy);
        assert_eq!((spec.errors)(&r), vec!["one", "two"]);
    }

    #[test]
    fn test_host_props_deep_merge() {
        let layers = vec![
            PartialSpec::new()
                .with_host_props(props(json!({"a": {"x": 1, "list": [1, 2]}, "b": 1})))
                .into(),
            PartialSpec::new()
                .with_host_props(props(json!({"a": {"y": 2, "list": [3]}, "b": {"z": 0}})))
                .into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        assert_eq!(
            serde_json::Value::Object(spec.host_props),
            json!({"a": {"x": 1, "y": 2, "list": [3]}, "b": {"z": 0}})
        );
    }

    #[test]
    fn test_deid_chain() {
        let hashed = PartialPs315Options::new().with_uids(UidMode::On);
        let layers = vec![
            PartialSpec::new().with_deid(DeidLayer::Off).into(),
            PartialSpec::new().with_deid(DeidLayer::Options(hashed.clone())).into(),
        ];
        let spec = compose_specs(&layers).unwrap();
        assert_eq!(spec.deid.profile().unwrap().retain_uids_option, UidMode::On);

        let layers = vec![
            PartialSpec::new().with_deid(DeidLayer::Options(hashed)).into(),
            PartialSpec::new().with_deid(DeidLayer::Off).into(),
        ];
        assert_eq!(compose_specs(&layers).unwrap().deid, DeidOption::Off);
    }

    #[test]
    fn test_contextual_layers_see_earlier_context() {
        let layers = vec![
            SpecLayer::contextual(|_| ContextLayer {
                ctx: props(json!({"site": "north"})),
                spec: None,
            }),
            SpecLayer::contextual(|ctx| {
                let site = ctx.get("site").and_then(|v| v.as_str()).unwrap_or("none").to_string();
                ContextLayer {
                    ctx: Context::new(),
                    spec: Some(PartialSpec::new().with_input_path_pattern(site)),
                }
            }),
        ];
        let spec = compose_specs(&layers).unwrap();
        assert_eq!(spec.input_path_pattern, "north");
    }

    #[test]
    fn test_default_output_path_is_input_path() {
        let spec = compose_specs(&[PartialSpec::new().into()]).unwrap();
        let ds = NaturalDataset::new();
        let policy = BasicProfile::new();
        let r = Resolver::new(&ds, "root/x/a.dcm", &spec, &policy);
        assert_eq!((spec.output_path_components)(&r), vec!["root", "x", "a.dcm"]);
    }
}
