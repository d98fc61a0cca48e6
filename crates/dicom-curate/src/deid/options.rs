//! De-identification profile options and their layered merge.

use serde::{Deserialize, Serialize};

use crate::error::CurateError;

/// Handling of dates and times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LongitudinalMode {
    /// Keep dates as recorded.
    Full,
    /// Blank dates.
    #[default]
    Off,
    /// Shift dates by the run's ISO-8601 duration.
    Offset,
}

/// Handling of UIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UidMode {
    /// Keep UIDs as recorded.
    On,
    /// Replace with a UID derived per run.
    Off,
    /// Replace with a UID derived identically across runs.
    #[default]
    Hashed,
}

/// Handling of private elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrivateMode {
    /// Carry private elements through unchanged.
    #[default]
    Quarantine,
    /// Drop private elements.
    Off,
}

/// A keyword list that a later layer can switch off entirely with `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetainListRepr", into = "RetainListRepr")]
pub enum RetainList {
    Disabled,
    List(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RetainListRepr {
    Flag(bool),
    List(Vec<String>),
}

impl TryFrom<RetainListRepr> for RetainList {
    type Error = CurateError;

    fn try_from(repr: RetainListRepr) -> Result<Self, Self::Error> {
        match repr {
            RetainListRepr::Flag(false) => Ok(RetainList::Disabled),
            RetainListRepr::Flag(true) => Err(CurateError::Config(
                "expected a keyword list or false, found true".to_string(),
            )),
            RetainListRepr::List(items) => Ok(RetainList::List(items)),
        }
    }
}

impl From<RetainList> for RetainListRepr {
    fn from(list: RetainList) -> Self {
        match list {
            RetainList::Disabled => RetainListRepr::Flag(false),
            RetainList::List(items) => RetainListRepr::List(items),
        }
    }
}

impl RetainList {
    pub fn contains(&self, keyword: &str) -> bool {
        match self {
            RetainList::Disabled => false,
            RetainList::List(items) => items.iter().any(|k| k == keyword),
        }
    }

    /// Merge a later layer's list into this one.
    ///
    /// `Disabled` in the later layer wins outright, a `Disabled` earlier
    /// layer is replaced, and two lists are unioned in first-seen order.
    pub fn merged_with(&self, next: &RetainList) -> RetainList {
        match (self, next) {
            (_, RetainList::Disabled) => RetainList::Disabled,
            (RetainList::Disabled, list) => list.clone(),
            (RetainList::List(prev), RetainList::List(items)) => {
                let mut merged = prev.clone();
                for item in items {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                RetainList::List(merged)
            }
        }
    }
}

/// Complete PS3.15 basic-profile option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ps315Options {
    pub clean_descriptors_option: bool,
    pub clean_descriptors_exceptions: RetainList,
    pub retain_longitudinal_temporal_information_options: LongitudinalMode,
    pub retain_patient_characteristics_option: RetainList,
    pub retain_device_identity_option: bool,
    #[serde(rename = "retainUIDsOption")]
    pub retain_uids_option: UidMode,
    pub retain_safe_private_option: PrivateMode,
    pub retain_institution_identity_option: bool,
}

impl Default for Ps315Options {
    fn default() -> Self {
        Self {
            clean_descriptors_option: true,
            clean_descriptors_exceptions: RetainList::List(Vec::new()),
            retain_longitudinal_temporal_information_options: LongitudinalMode::Off,
            retain_patient_characteristics_option: RetainList::Disabled,
            retain_device_identity_option: false,
            retain_uids_option: UidMode::Hashed,
            retain_safe_private_option: PrivateMode::Quarantine,
            retain_institution_identity_option: false,
        }
    }
}

/// Options as written in one specification layer; unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialPs315Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_descriptors_option: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_descriptors_exceptions: Option<RetainList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_longitudinal_temporal_information_options: Option<LongitudinalMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_patient_characteristics_option: Option<RetainList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_device_identity_option: Option<bool>,
    #[serde(rename = "retainUIDsOption", skip_serializing_if = "Option::is_none")]
    pub retain_uids_option: Option<UidMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_safe_private_option: Option<PrivateMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retain_institution_identity_option: Option<bool>,
}

impl PartialPs315Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_longitudinal(mut self, mode: LongitudinalMode) -> Self {
        self.retain_longitudinal_temporal_information_options = Some(mode);
        self
    }

    pub fn with_uids(mut self, mode: UidMode) -> Self {
        self.retain_uids_option = Some(mode);
        self
    }

    pub fn with_private(mut self, mode: PrivateMode) -> Self {
        self.retain_safe_private_option = Some(mode);
        self
    }

    pub fn with_device_identity(mut self, retain: bool) -> Self {
        self.retain_device_identity_option = Some(retain);
        self
    }

    pub fn with_institution_identity(mut self, retain: bool) -> Self {
        self.retain_institution_identity_option = Some(retain);
        self
    }

    pub fn with_clean_descriptors(mut self, clean: bool) -> Self {
        self.clean_descriptors_option = Some(clean);
        self
    }

    pub fn with_descriptor_exceptions(mut self, list: RetainList) -> Self {
        self.clean_descriptors_exceptions = Some(list);
        self
    }

    pub fn with_patient_characteristics(mut self, list: RetainList) -> Self {
        self.retain_patient_characteristics_option = Some(list);
        self
    }
}

impl Ps315Options {
    /// Defaults overlaid with a layer; the layer's lists are taken verbatim.
    pub fn from_layer(layer: &PartialPs315Options) -> Self {
        let mut options = Self::default();
        options.overlay_scalars(layer);
        if let Some(list) = &layer.clean_descriptors_exceptions {
            options.clean_descriptors_exceptions = list.clone();
        }
        if let Some(list) = &layer.retain_patient_characteristics_option {
            options.retain_patient_characteristics_option = list.clone();
        }
        options
    }

    /// Merge a later layer into these options, unioning the list fields.
    pub fn merged_with(&self, layer: &PartialPs315Options) -> Self {
        let mut options = self.clone();
        options.overlay_scalars(layer);
        if let Some(list) = &layer.clean_descriptors_exceptions {
            options.clean_descriptors_exceptions =
                self.clean_descriptors_exceptions.merged_with(list);
        }
        if let Some(list) = &layer.retain_patient_characteristics_option {
            options.retain_patient_characteristics_option =
                self.retain_patient_characteristics_option.merged_with(list);
        }
        options
    }

    fn overlay_scalars(&mut self, layer: &PartialPs315Options) {
        if let Some(v) = layer.clean_descriptors_option {
            self.clean_descriptors_option = v;
        }
        if let Some(v) = layer.retain_longitudinal_temporal_information_options {
            self.retain_longitudinal_temporal_information_options = v;
        }
        if let Some(v) = layer.retain_device_identity_option {
            self.retain_device_identity_option = v;
        }
        if let Some(v) = layer.retain_uids_option {
            self.retain_uids_option = v;
        }
        if let Some(v) = layer.retain_safe_private_option {
            self.retain_safe_private_option = v;
        }
        if let Some(v) = layer.retain_institution_identity_option {
            self.retain_institution_identity_option = v;
        }
    }
}

#[derive(Serialize, Deserialize)]
enum OffMarker {
    Off,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DeidRepr<T> {
    Off(OffMarker),
    Options(T),
}

/// The de-identification setting of one specification layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeidRepr<PartialPs315Options>", into = "DeidRepr<PartialPs315Options>")]
pub enum DeidLayer {
    /// Turn de-identification off, whatever earlier layers said.
    Off,
    Options(PartialPs315Options),
}

impl From<DeidRepr<PartialPs315Options>> for DeidLayer {
    fn from(repr: DeidRepr<PartialPs315Options>) -> Self {
        match repr {
            DeidRepr::Off(_) => DeidLayer::Off,
            DeidRepr::Options(options) => DeidLayer::Options(options),
        }
    }
}

impl From<DeidLayer> for DeidRepr<PartialPs315Options> {
    fn from(layer: DeidLayer) -> Self {
        match layer {
            DeidLayer::Off => DeidRepr::Off(OffMarker::Off),
            DeidLayer::Options(options) => DeidRepr::Options(options),
        }
    }
}

/// The effective de-identification setting of a composed specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeidRepr<Ps315Options>", into = "DeidRepr<Ps315Options>")]
pub enum DeidOption {
    #[default]
    Off,
    Profile(Ps315Options),
}

impl From<DeidRepr<Ps315Options>> for DeidOption {
    fn from(repr: DeidRepr<Ps315Options>) -> Self {
        match repr {
            DeidRepr::Off(_) => DeidOption::Off,
            DeidRepr::Options(options) => DeidOption::Profile(options),
        }
    }
}

impl From<DeidOption> for DeidRepr<Ps315Options> {
    fn from(option: DeidOption) -> Self {
        match option {
            DeidOption::Off => DeidRepr::Off(OffMarker::Off),
            DeidOption::Profile(options) => DeidRepr::Options(options),
        }
    }
}

impl DeidOption {
    /// Fold one more layer into the accumulated setting.
    pub fn merge(&self, layer: &DeidLayer) -> DeidOption {
        match (self, layer) {
            (_, DeidLayer::Off) => DeidOption::Off,
            (DeidOption::Off, DeidLayer::Options(partial)) => {
                DeidOption::Profile(Ps315Options::from_layer(partial))
            }
            (DeidOption::Profile(prev), DeidLayer::Options(partial)) => {
                DeidOption::Profile(prev.merged_with(partial))
            }
        }
    }

    pub fn profile(&self) -> Option<&Ps315Options> {
        match self {
            DeidOption::Off => None,
            DeidOption::Profile(options) => Some(options),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DeidOption::Profile(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> RetainList {
        RetainList::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_off_then_options_starts_from_defaults() {
        let layer = PartialPs315Options::new().with_device_identity(true);
        let merged = DeidOption::Off.merge(&DeidLayer::Options(layer));

        let mut expected = Ps315Options::default();
        expected.retain_device_identity_option = true;
        assert_eq!(merged, DeidOption::Profile(expected));
    }

    #[test]
    fn test_off_layer_wins() {
        let acc = DeidOption::Profile(Ps315Options::default());
        assert_eq!(acc.merge(&DeidLayer::Off), DeidOption::Off);
    }

    #[test]
    fn test_first_layer_lists_taken_verbatim() {
        let layer = PartialPs315Options::new().with_patient_characteristics(list(&["PatientSex"]));
        let merged = DeidOption::Off.merge(&DeidLayer::Options(layer));
        assert_eq!(
            merged.profile().unwrap().retain_patient_characteristics_option,
            list(&["PatientSex"])
        );
    }

    #[test]
    fn test_lists_union_in_first_seen_order() {
        let first = PartialPs315Options::new().with_descriptor_exceptions(list(&["A", "B"]));
        let second = PartialPs315Options::new().with_descriptor_exceptions(list(&["B", "C"]));
        let merged = DeidOption::Off
            .merge(&DeidLayer::Options(first))
            .merge(&DeidLayer::Options(second));
        assert_eq!(
            merged.profile().unwrap().clean_descriptors_exceptions,
            list(&["A", "B", "C"])
        );
    }

    #[test]
    fn test_disabled_list_overrides() {
        let first = PartialPs315Options::new().with_patient_characteristics(list(&["PatientAge"]));
        let second = PartialPs315Options::new().with_patient_characteristics(RetainList::Disabled);
        let merged = DeidOption::Off
            .merge(&DeidLayer::Options(first))
            .merge(&DeidLayer::Options(second));
        assert_eq!(
            merged.profile().unwrap().retain_patient_characteristics_option,
            RetainList::Disabled
        );
    }

    #[test]
    fn test_json_forms() {
        let off: DeidLayer = serde_json::from_str("\"Off\"").unwrap();
        assert_eq!(off, DeidLayer::Off);

        let layer: DeidLayer = serde_json::from_str(
            r#"{"retainUIDsOption": "On", "retainPatientCharacteristicsOption": false}"#,
        )
        .unwrap();
        match layer {
            DeidLayer::Options(partial) => {
                assert_eq!(partial.retain_uids_option, Some(UidMode::On));
                assert_eq!(
                    partial.retain_patient_characteristics_option,
                    Some(RetainList::Disabled)
                );
            }
            DeidLayer::Off => panic!("expected options"),
        }

        assert!(serde_json::from_str::<RetainList>("true").is_err());
        assert_eq!(serde_json::to_string(&DeidOption::Off).unwrap(), "\"Off\"");
    }
}
