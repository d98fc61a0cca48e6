//! Attribute-level de-identification decisions.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::dataset::Tag;

use super::options::{LongitudinalMode, Ps315Options, UidMode};

/// Groups whose standard elements identify the patient, the visit or the
/// people around the study.
const IDENTIFYING_GROUPS: &[u16] = &[0x0010, 0x0032, 0x0038, 0x0040, 0x4008];

/// What to do with one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retain,
    /// Replace with an empty value.
    Clean,
    Remove,
    /// Replace the UID with its protected form.
    ReplaceUid,
    /// Shift the date by the run's offset.
    ShiftDate,
}

/// Decides how attributes are treated under a profile.
///
/// Implementations must be session-consistent: the same UID protected
/// twice within a run yields the same replacement.
pub trait DeidPolicy: Send + Sync + fmt::Debug {
    /// Decision for an attribute, by keyword.
    fn action(&self, keyword: &str, options: &Ps315Options) -> Action;

    /// Decision for a standard attribute the dictionary cannot name.
    ///
    /// Removes anything in an identifying group and retains the rest.
    fn action_for_tag(&self, tag: Tag, _options: &Ps315Options) -> Action {
        if IDENTIFYING_GROUPS.contains(&tag.group()) {
            Action::Remove
        } else {
            Action::Retain
        }
    }

    /// Protected form of a UID under the profile's UID mode.
    fn protect_uid(&self, uid: &str, options: &Ps315Options) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    /// Direct identifier blanked to an empty value.
    Identifier,
    /// Identifier removed outright.
    Removed,
    Uid,
    Date,
    Time,
    Descriptor,
    PatientCharacteristic,
    Device,
    Institution,
}

static RULES: Lazy<HashMap<&'static str, Category>> = Lazy::new(|| {
    use Category::*;
    [
        ("PatientName", Identifier),
        ("PatientID", Identifier),
        ("PatientBirthDate", Identifier),
        ("AccessionNumber", Identifier),
        ("ReferringPhysicianName", Identifier),
        ("StudyID", Identifier),
        ("PlacerOrderNumberImagingServiceRequest", Identifier),
        ("FillerOrderNumberImagingServiceRequest", Identifier),
        ("VerifyingObserverName", Identifier),
        ("ContentCreatorName", Identifier),
        ("PersonName", Identifier),
        ("PerformingPhysicianName", Removed),
        ("OperatorsName", Removed),
        ("RequestedProcedureID", Removed),
        ("AdditionalPatientHistory", Removed),
        ("PatientComments", Removed),
        ("RequestAttributesSequence", Removed),
        ("IssuerOfPatientID", Removed),
        ("TypeOfPatientID", Removed),
        ("PatientBirthTime", Removed),
        ("PatientInsurancePlanCodeSequence", Removed),
        ("PatientPrimaryLanguageCodeSequence", Removed),
        ("OtherPatientIDs", Removed),
        ("OtherPatientNames", Removed),
        ("OtherPatientIDsSequence", Removed),
        ("PatientBirthName", Removed),
        ("PatientAddress", Removed),
        ("PatientMotherBirthName", Removed),
        ("MilitaryRank", Removed),
        ("BranchOfService", Removed),
        ("MedicalRecordLocator", Removed),
        ("ReferencedPatientPhotoSequence", Removed),
        ("MedicalAlerts", Removed),
        ("Allergies", Removed),
        ("CountryOfResidence", Removed),
        ("RegionOfResidence", Removed),
        ("PatientTelephoneNumbers", Removed),
        ("Occupation", Removed),
        ("LastMenstrualDate", Removed),
        ("PatientReligiousPreference", Removed),
        ("ReferringPhysicianAddress", Removed),
        ("ReferringPhysicianTelephoneNumbers", Removed),
        ("ReferringPhysicianIdentificationSequence", Removed),
        ("ConsultingPhysicianName", Removed),
        ("PhysiciansOfRecord", Removed),
        ("PhysiciansOfRecordIdentificationSequence", Removed),
        ("PerformingPhysicianIdentificationSequence", Removed),
        ("NameOfPhysiciansReadingStudy", Removed),
        ("PhysiciansReadingStudyIdentificationSequence", Removed),
        ("OperatorIdentificationSequence", Removed),
        ("AdmittingDiagnosesCodeSequence", Removed),
        ("ReferencedPatientSequence", Removed),
        ("IdentifyingComments", Removed),
        ("StudyIDIssuer", Removed),
        ("ScheduledStudyLocation", Removed),
        ("ScheduledStudyLocationAETitle", Removed),
        ("ReasonForStudy", Removed),
        ("RequestingPhysician", Removed),
        ("RequestingService", Removed),
        ("RequestedContrastAgent", Removed),
        ("StudyComments", Removed),
        ("ReferencedPatientAliasSequence", Removed),
        ("AdmissionID", Removed),
        ("IssuerOfAdmissionID", Removed),
        ("ServiceEpisodeID", Removed),
        ("ServiceEpisodeDescription", Removed),
        ("CurrentPatientLocation", Removed),
        ("PatientInstitutionResidence", Removed),
        ("PatientState", Removed),
        ("VisitComments", Removed),
        ("ScheduledPerformingPhysicianName", Removed),
        ("ScheduledProcedureStepID", Removed),
        ("ScheduledProcedureStepLocation", Removed),
        ("PerformedLocation", Removed),
        ("PerformedProcedureStepID", Removed),
        ("ReasonForTheRequestedProcedure", Removed),
        ("PatientTransportArrangements", Removed),
        ("RequestedProcedureLocation", Removed),
        ("NamesOfIntendedRecipientsOfResults", Removed),
        ("PersonIdentificationCodeSequence", Removed),
        ("PersonAddress", Removed),
        ("PersonTelephoneNumbers", Removed),
        ("RequestedProcedureComments", Removed),
        ("OrderEnteredBy", Removed),
        ("OrderEntererLocation", Removed),
        ("OrderCallbackPhoneNumber", Removed),
        ("ImagingServiceRequestComments", Removed),
        ("VerifyingOrganization", Removed),
        ("VerifyingObserverIdentificationCodeSequence", Removed),
        ("ContentCreatorIdentificationCodeSequence", Removed),
        ("Arbitrary", Removed),
        ("TextComments", Removed),
        ("SOPInstanceUID", Uid),
        ("MediaStorageSOPInstanceUID", Uid),
        ("StudyInstanceUID", Uid),
        ("SeriesInstanceUID", Uid),
        ("FrameOfReferenceUID", Uid),
        ("ReferencedSOPInstanceUID", Uid),
        ("InstanceCreatorUID", Uid),
        ("AcquisitionUID", Uid),
        ("PyramidUID", Uid),
        ("FailedSOPInstanceUIDList", Uid),
        ("TransactionUID", Uid),
        ("IrradiationEventUID", Uid),
        ("CreatorVersionUID", Uid),
        ("DeviceUID", Uid),
        ("SynchronizationFrameOfReferenceUID", Uid),
        ("ConcatenationUID", Uid),
        ("DimensionOrganizationUID", Uid),
        ("UID", Uid),
        ("TemplateExtensionOrganizationUID", Uid),
        ("TemplateExtensionCreatorUID", Uid),
        ("StorageMediaFileSetUID", Uid),
        ("ReferencedFrameOfReferenceUID", Uid),
        ("RelatedFrameOfReferenceUID", Uid),
        ("StudyDate", Date),
        ("SeriesDate", Date),
        ("AcquisitionDate", Date),
        ("ContentDate", Date),
        ("InstanceCreationDate", Date),
        ("AcquisitionDateTime", Date),
        ("InstanceCoercionDateTime", Date),
        ("OverlayDate", Date),
        ("CurveDate", Date),
        ("DateOfSecondaryCapture", Date),
        ("DateOfLastCalibration", Date),
        ("ScheduledProcedureStepStartDate", Date),
        ("PerformedProcedureStepStartDate", Date),
        ("PerformedProcedureStepEndDate", Date),
        ("VerificationDateTime", Date),
        ("StudyTime", Time),
        ("SeriesTime", Time),
        ("AcquisitionTime", Time),
        ("ContentTime", Time),
        ("InstanceCreationTime", Time),
        ("OverlayTime", Time),
        ("CurveTime", Time),
        ("TimeOfSecondaryCapture", Time),
        ("TimeOfLastCalibration", Time),
        ("ScheduledProcedureStepStartTime", Time),
        ("PerformedProcedureStepStartTime", Time),
        ("PerformedProcedureStepEndTime", Time),
        ("StudyDescription", Descriptor),
        ("SeriesDescription", Descriptor),
        ("ProtocolName", Descriptor),
        ("ImageComments", Descriptor),
        ("AdmittingDiagnosesDescription", Descriptor),
        ("DerivationDescription", Descriptor),
        ("ContrastBolusAgent", Descriptor),
        ("AcquisitionDeviceProcessingDescription", Descriptor),
        ("AcquisitionComments", Descriptor),
        ("AcquisitionProtocolDescription", Descriptor),
        ("ContributionDescription", Descriptor),
        ("RequestedProcedureDescription", Descriptor),
        ("ScheduledProcedureStepDescription", Descriptor),
        ("PerformedProcedureStepDescription", Descriptor),
        ("CommentsOnThePerformedProcedureStep", Descriptor),
        ("PatientSex", PatientCharacteristic),
        ("PatientAge", PatientCharacteristic),
        ("PatientSize", PatientCharacteristic),
        ("PatientWeight", PatientCharacteristic),
        ("EthnicGroup", PatientCharacteristic),
        ("SmokingStatus", PatientCharacteristic),
        ("PregnancyStatus", PatientCharacteristic),
        ("PatientSexNeutered", PatientCharacteristic),
        ("DeviceSerialNumber", Device),
        ("StationName", Device),
        ("PlateID", Device),
        ("GeneratorID", Device),
        ("CassetteID", Device),
        ("GantryID", Device),
        ("DetectorID", Device),
        ("ScheduledStationAETitle", Device),
        ("ScheduledStationName", Device),
        ("PerformedStationAETitle", Device),
        ("PerformedStationName", Device),
        ("InstitutionName", Institution),
        ("InstitutionAddress", Institution),
        ("InstitutionalDepartmentName", Institution),
        ("InstitutionCodeSequence", Institution),
    ]
    .into_iter()
    .collect()
});

/// Rule table after the PS3.15 basic application level confidentiality
/// profile. Standard attributes outside the table are retained by keyword;
/// unnamed ones fall back to [`DeidPolicy::action_for_tag`].
#[derive(Debug, Clone, Default)]
pub struct BasicProfile {
    salt: String,
}

impl BasicProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile whose `Off` UID mode is salted with a value unique to this run.
    pub fn for_run() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        Self {
            salt: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }
}

/// Derive a `2.25.` UID from the SHA-256 of the input.
pub fn derived_uid(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    format!("2.25.{}", u128::from_be_bytes(bytes))
}

impl DeidPolicy for BasicProfile {
    fn action(&self, keyword: &str, options: &Ps315Options) -> Action {
        let Some(category) = RULES.get(keyword) else {
            return Action::Retain;
        };
        match category {
            Category::Identifier => Action::Clean,
            Category::Removed => Action::Remove,
            Category::Uid => match options.retain_uids_option {
                UidMode::On => Action::Retain,
                UidMode::Off | UidMode::Hashed => Action::ReplaceUid,
            },
            Category::Date => match options.retain_longitudinal_temporal_information_options {
                LongitudinalMode::Full => Action::Retain,
                LongitudinalMode::Off => Action::Clean,
                LongitudinalMode::Offset => Action::ShiftDate,
            },
            Category::Time => match options.retain_longitudinal_temporal_information_options {
                LongitudinalMode::Off => Action::Clean,
                LongitudinalMode::Full | LongitudinalMode::Offset => Action::Retain,
            },
            Category::Descriptor => {
                if options.clean_descriptors_exceptions.contains(keyword) {
                    Action::Retain
                } else if options.clean_descriptors_option {
                    Action::Clean
                } else {
                    Action::Remove
                }
            }
            Category::PatientCharacteristic => {
                if options.retain_patient_characteristics_option.contains(keyword) {
                    Action::Retain
                } else {
                    Action::Remove
                }
            }
            Category::Device if options.retain_device_identity_option => Action::Retain,
            Category::Institution if options.retain_institution_identity_option => Action::Retain,
            Category::Device | Category::Institution => Action::Remove,
        }
    }

    fn protect_uid(&self, uid: &str, options: &Ps315Options) -> String {
        match options.retain_uids_option {
            UidMode::On => uid.to_string(),
            UidMode::Hashed => derived_uid(uid),
            UidMode::Off => derived_uid(&format!("{}{}", self.salt, uid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::options::RetainList;

    #[test]
    fn test_hashed_uid_is_stable_and_valid() {
        let profile = BasicProfile::new();
        let options = Ps315Options::default();
        let a = profile.protect_uid("1.2.3.4", &options);
        let b = BasicProfile::for_run().protect_uid("1.2.3.4", &options);
        assert_eq!(a, b);
        assert!(a.starts_with("2.25."));
        assert!(a.len() <= 64);
        assert!(a[5..].chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, profile.protect_uid("1.2.3.5", &options));
    }

    #[test]
    fn test_salted_uids_differ_between_salts() {
        let options = Ps315Options {
            retain_uids_option: UidMode::Off,
            ..Ps315Options::default()
        };
        let first = BasicProfile::new().with_salt("a");
        let second = BasicProfile::new().with_salt("b");
        assert_eq!(
            first.protect_uid("1.2.3", &options),
            first.protect_uid("1.2.3", &options)
        );
        assert_ne!(
            first.protect_uid("1.2.3", &options),
            second.protect_uid("1.2.3", &options)
        );
    }

    #[test]
    fn test_retain_switches() {
        let profile = BasicProfile::new();
        let mut options = Ps315Options::default();
        assert_eq!(profile.action("PatientName", &options), Action::Clean);
        assert_eq!(profile.action("InstitutionName", &options), Action::Remove);
        assert_eq!(profile.action("PatientSex", &options), Action::Remove);
        assert_eq!(profile.action("StudyDate", &options), Action::Clean);
        assert_eq!(profile.action("Modality", &options), Action::Retain);

        options.retain_institution_identity_option = true;
        options.retain_patient_characteristics_option = RetainList::List(vec!["PatientSex".into()]);
        options.retain_longitudinal_temporal_information_options = LongitudinalMode::Offset;
        assert_eq!(profile.action("InstitutionName", &options), Action::Retain);
        assert_eq!(profile.action("PatientSex", &options), Action::Retain);
        assert_eq!(profile.action("PatientAge", &options), Action::Remove);
        assert_eq!(profile.action("StudyDate", &options), Action::ShiftDate);
        assert_eq!(profile.action("StudyTime", &options), Action::Retain);
    }

    #[test]
    fn test_unnamed_tags_in_identifying_groups_removed() {
        let profile = BasicProfile::new();
        let options = Ps315Options::default();
        assert_eq!(profile.action_for_tag(Tag::new(0x0010, 0x2297), &options), Action::Remove);
        assert_eq!(profile.action_for_tag(Tag::new(0x0038, 0x0050), &options), Action::Remove);
        assert_eq!(profile.action_for_tag(Tag::new(0x0018, 0x9004), &options), Action::Retain);
        assert_eq!(profile.action("OtherPatientIDs", &options), Action::Remove);
        assert_eq!(profile.action("PatientTelephoneNumbers", &options), Action::Remove);
    }

    #[test]
    fn test_every_rule_names_a_dictionary_keyword() {
        for keyword in RULES.keys() {
            assert!(
                crate::codec::dictionary::lookup_keyword(keyword).is_some(),
                "{} has a rule but no dictionary entry",
                keyword
            );
        }
    }

    #[test]
    fn test_descriptor_exceptions() {
        let profile = BasicProfile::new();
        let options = Ps315Options {
            clean_descriptors_exceptions: RetainList::List(vec!["SeriesDescription".into()]),
            ..Ps315Options::default()
        };
        assert_eq!(profile.action("SeriesDescription", &options), Action::Retain);
        assert_eq!(profile.action("StudyDescription", &options), Action::Clean);
    }
}
