//! Built-in attribute dictionary: keyword ↔ tag ↔ VR.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::dataset::{Tag, Vr};

/// One dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub tag: Tag,
    pub keyword: &'static str,
    pub vr: Vr,
}

const fn entry(group: u16, element: u16, keyword: &'static str, vr: Vr) -> DictionaryEntry {
    DictionaryEntry {
        tag: Tag(((group as u32) << 16) | element as u32),
        keyword,
        vr,
    }
}

static ENTRIES: &[DictionaryEntry] = &[
    // File meta information
    entry(0x0002, 0x0000, "FileMetaInformationGroupLength", Vr::UL),
    entry(0x0002, 0x0001, "FileMetaInformationVersion", Vr::OB),
    entry(0x0002, 0x0002, "MediaStorageSOPClassUID", Vr::UI),
    entry(0x0002, 0x0003, "MediaStorageSOPInstanceUID", Vr::UI),
    entry(0x0002, 0x0010, "TransferSyntaxUID", Vr::UI),
    entry(0x0002, 0x0012, "ImplementationClassUID", Vr::UI),
    entry(0x0002, 0x0013, "ImplementationVersionName", Vr::SH),
    entry(0x0002, 0x0016, "SourceApplicationEntityTitle", Vr::AE),
    entry(0x0002, 0x0100, "PrivateInformationCreatorUID", Vr::UI),
    entry(0x0002, 0x0102, "PrivateInformation", Vr::OB),
    // SOP common, study, series and equipment
    entry(0x0008, 0x0005, "SpecificCharacterSet", Vr::CS),
    entry(0x0008, 0x0008, "ImageType", Vr::CS),
    entry(0x0008, 0x0012, "InstanceCreationDate", Vr::DA),
    entry(0x0008, 0x0013, "InstanceCreationTime", Vr::TM),
    entry(0x0008, 0x0014, "InstanceCreatorUID", Vr::UI),
    entry(0x0008, 0x0015, "InstanceCoercionDateTime", Vr::DT),
    entry(0x0008, 0x0016, "SOPClassUID", Vr::UI),
    entry(0x0008, 0x0017, "AcquisitionUID", Vr::UI),
    entry(0x0008, 0x0018, "SOPInstanceUID", Vr::UI),
    entry(0x0008, 0x0019, "PyramidUID", Vr::UI),
    entry(0x0008, 0x0020, "StudyDate", Vr::DA),
    entry(0x0008, 0x0021, "SeriesDate", Vr::DA),
    entry(0x0008, 0x0022, "AcquisitionDate", Vr::DA),
    entry(0x0008, 0x0023, "ContentDate", Vr::DA),
    entry(0x0008, 0x0024, "OverlayDate", Vr::DA),
    entry(0x0008, 0x0025, "CurveDate", Vr::DA),
    entry(0x0008, 0x002A, "AcquisitionDateTime", Vr::DT),
    entry(0x0008, 0x0030, "StudyTime", Vr::TM),
    entry(0x0008, 0x0031, "SeriesTime", Vr::TM),
    entry(0x0008, 0x0032, "AcquisitionTime", Vr::TM),
    entry(0x0008, 0x0033, "ContentTime", Vr::TM),
    entry(0x0008, 0x0034, "OverlayTime", Vr::TM),
    entry(0x0008, 0x0035, "CurveTime", Vr::TM),
    entry(0x0008, 0x0050, "AccessionNumber", Vr::SH),
    entry(0x0008, 0x0058, "FailedSOPInstanceUIDList", Vr::UI),
    entry(0x0008, 0x0060, "Modality", Vr::CS),
    entry(0x0008, 0x0064, "ConversionType", Vr::CS),
    entry(0x0008, 0x0068, "PresentationIntentType", Vr::CS),
    entry(0x0008, 0x0070, "Manufacturer", Vr::LO),
    entry(0x0008, 0x0080, "InstitutionName", Vr::LO),
    entry(0x0008, 0x0081, "InstitutionAddress", Vr::ST),
    entry(0x0008, 0x0082, "InstitutionCodeSequence", Vr::SQ),
    entry(0x0008, 0x0090, "ReferringPhysicianName", Vr::PN),
    entry(0x0008, 0x0092, "ReferringPhysicianAddress", Vr::ST),
    entry(0x0008, 0x0094, "ReferringPhysicianTelephoneNumbers", Vr::SH),
    entry(0x0008, 0x0096, "ReferringPhysicianIdentificationSequence", Vr::SQ),
    entry(0x0008, 0x009C, "ConsultingPhysicianName", Vr::PN),
    entry(0x0008, 0x0100, "CodeValue", Vr::SH),
    entry(0x0008, 0x0102, "CodingSchemeDesignator", Vr::SH),
    entry(0x0008, 0x0104, "CodeMeaning", Vr::LO),
    entry(0x0008, 0x0201, "TimezoneOffsetFromUTC", Vr::SH),
    entry(0x0008, 0x1010, "StationName", Vr::SH),
    entry(0x0008, 0x1030, "StudyDescription", Vr::LO),
    entry(0x0008, 0x103E, "SeriesDescription", Vr::LO),
    entry(0x0008, 0x1040, "InstitutionalDepartmentName", Vr::LO),
    entry(0x0008, 0x1048, "PhysiciansOfRecord", Vr::PN),
    entry(0x0008, 0x1049, "PhysiciansOfRecordIdentificationSequence", Vr::SQ),
    entry(0x0008, 0x1050, "PerformingPhysicianName", Vr::PN),
    entry(0x0008, 0x1052, "PerformingPhysicianIdentificationSequence", Vr::SQ),
    entry(0x0008, 0x1060, "NameOfPhysiciansReadingStudy", Vr::PN),
    entry(0x0008, 0x1062, "PhysiciansReadingStudyIdentificationSequence", Vr::SQ),
    entry(0x0008, 0x1070, "OperatorsName", Vr::PN),
    entry(0x0008, 0x1072, "OperatorIdentificationSequence", Vr::SQ),
    entry(0x0008, 0x1080, "AdmittingDiagnosesDescription", Vr::LO),
    entry(0x0008, 0x1084, "AdmittingDiagnosesCodeSequence", Vr::SQ),
    entry(0x0008, 0x1090, "ManufacturerModelName", Vr::LO),
    entry(0x0008, 0x1110, "ReferencedStudySequence", Vr::SQ),
    entry(0x0008, 0x1111, "ReferencedPerformedProcedureStepSequence", Vr::SQ),
    entry(0x0008, 0x1115, "ReferencedSeriesSequence", Vr::SQ),
    entry(0x0008, 0x1120, "ReferencedPatientSequence", Vr::SQ),
    entry(0x0008, 0x1140, "ReferencedImageSequence", Vr::SQ),
    entry(0x0008, 0x1150, "ReferencedSOPClassUID", Vr::UI),
    entry(0x0008, 0x1155, "ReferencedSOPInstanceUID", Vr::UI),
    entry(0x0008, 0x1195, "TransactionUID", Vr::UI),
    entry(0x0008, 0x1250, "RelatedSeriesSequence", Vr::SQ),
    entry(0x0008, 0x2111, "DerivationDescription", Vr::ST),
    entry(0x0008, 0x2112, "SourceImageSequence", Vr::SQ),
    entry(0x0008, 0x3010, "IrradiationEventUID", Vr::UI),
    entry(0x0008, 0x4000, "IdentifyingComments", Vr::LT),
    entry(0x0008, 0x9123, "CreatorVersionUID", Vr::UI),
    // Patient
    entry(0x0010, 0x0010, "PatientName", Vr::PN),
    entry(0x0010, 0x0020, "PatientID", Vr::LO),
    entry(0x0010, 0x0021, "IssuerOfPatientID", Vr::LO),
    entry(0x0010, 0x0022, "TypeOfPatientID", Vr::CS),
    entry(0x0010, 0x0030, "PatientBirthDate", Vr::DA),
    entry(0x0010, 0x0032, "PatientBirthTime", Vr::TM),
    entry(0x0010, 0x0040, "PatientSex", Vr::CS),
    entry(0x0010, 0x0050, "PatientInsurancePlanCodeSequence", Vr::SQ),
    entry(0x0010, 0x0101, "PatientPrimaryLanguageCodeSequence", Vr::SQ),
    entry(0x0010, 0x1000, "OtherPatientIDs", Vr::LO),
    entry(0x0010, 0x1001, "OtherPatientNames", Vr::PN),
    entry(0x0010, 0x1002, "OtherPatientIDsSequence", Vr::SQ),
    entry(0x0010, 0x1005, "PatientBirthName", Vr::PN),
    entry(0x0010, 0x1010, "PatientAge", Vr::AS),
    entry(0x0010, 0x1020, "PatientSize", Vr::DS),
    entry(0x0010, 0x1030, "PatientWeight", Vr::DS),
    entry(0x0010, 0x1040, "PatientAddress", Vr::LO),
    entry(0x0010, 0x1060, "PatientMotherBirthName", Vr::PN),
    entry(0x0010, 0x1080, "MilitaryRank", Vr::LO),
    entry(0x0010, 0x1081, "BranchOfService", Vr::LO),
    entry(0x0010, 0x1090, "MedicalRecordLocator", Vr::LO),
    entry(0x0010, 0x1100, "ReferencedPatientPhotoSequence", Vr::SQ),
    entry(0x0010, 0x2000, "MedicalAlerts", Vr::LO),
    entry(0x0010, 0x2110, "Allergies", Vr::LO),
    entry(0x0010, 0x2150, "CountryOfResidence", Vr::LO),
    entry(0x0010, 0x2152, "RegionOfResidence", Vr::LO),
    entry(0x0010, 0x2154, "PatientTelephoneNumbers", Vr::SH),
    entry(0x0010, 0x2160, "EthnicGroup", Vr::SH),
    entry(0x0010, 0x2180, "Occupation", Vr::SH),
    entry(0x0010, 0x21A0, "SmokingStatus", Vr::CS),
    entry(0x0010, 0x21B0, "AdditionalPatientHistory", Vr::LT),
    entry(0x0010, 0x21C0, "PregnancyStatus", Vr::US),
    entry(0x0010, 0x21D0, "LastMenstrualDate", Vr::DA),
    entry(0x0010, 0x21F0, "PatientReligiousPreference", Vr::LO),
    entry(0x0010, 0x2203, "PatientSexNeutered", Vr::CS),
    entry(0x0010, 0x4000, "PatientComments", Vr::LT),
    // Clinical trial
    entry(0x0012, 0x0010, "ClinicalTrialSponsorName", Vr::LO),
    entry(0x0012, 0x0020, "ClinicalTrialProtocolID", Vr::LO),
    entry(0x0012, 0x0021, "ClinicalTrialProtocolName", Vr::LO),
    entry(0x0012, 0x0030, "ClinicalTrialSiteID", Vr::LO),
    entry(0x0012, 0x0031, "ClinicalTrialSiteName", Vr::LO),
    entry(0x0012, 0x0040, "ClinicalTrialSubjectID", Vr::LO),
    entry(0x0012, 0x0042, "ClinicalTrialSubjectReadingID", Vr::LO),
    entry(0x0012, 0x0050, "ClinicalTrialTimePointID", Vr::LO),
    entry(0x0012, 0x0051, "ClinicalTrialTimePointDescription", Vr::ST),
    entry(0x0012, 0x0062, "PatientIdentityRemoved", Vr::CS),
    entry(0x0012, 0x0063, "DeidentificationMethod", Vr::LO),
    entry(0x0012, 0x0064, "DeidentificationMethodCodeSequence", Vr::SQ),
    // Acquisition and device
    entry(0x0018, 0x0010, "ContrastBolusAgent", Vr::LO),
    entry(0x0018, 0x0015, "BodyPartExamined", Vr::CS),
    entry(0x0018, 0x0020, "ScanningSequence", Vr::CS),
    entry(0x0018, 0x0022, "ScanOptions", Vr::CS),
    entry(0x0018, 0x0050, "SliceThickness", Vr::DS),
    entry(0x0018, 0x0060, "KVP", Vr::DS),
    entry(0x0018, 0x0080, "RepetitionTime", Vr::DS),
    entry(0x0018, 0x0081, "EchoTime", Vr::DS),
    entry(0x0018, 0x0087, "MagneticFieldStrength", Vr::DS),
    entry(0x0018, 0x0088, "SpacingBetweenSlices", Vr::DS),
    entry(0x0018, 0x1000, "DeviceSerialNumber", Vr::LO),
    entry(0x0018, 0x1002, "DeviceUID", Vr::UI),
    entry(0x0018, 0x1004, "PlateID", Vr::LO),
    entry(0x0018, 0x1005, "GeneratorID", Vr::LO),
    entry(0x0018, 0x1007, "CassetteID", Vr::LO),
    entry(0x0018, 0x1008, "GantryID", Vr::LO),
    entry(0x0018, 0x1012, "DateOfSecondaryCapture", Vr::DA),
    entry(0x0018, 0x1014, "TimeOfSecondaryCapture", Vr::TM),
    entry(0x0018, 0x1016, "SecondaryCaptureDeviceManufacturer", Vr::LO),
    entry(0x0018, 0x1018, "SecondaryCaptureDeviceManufacturerModelName", Vr::LO),
    entry(0x0018, 0x1019, "SecondaryCaptureDeviceSoftwareVersions", Vr::LO),
    entry(0x0018, 0x1020, "SoftwareVersions", Vr::LO),
    entry(0x0018, 0x1030, "ProtocolName", Vr::LO),
    entry(0x0018, 0x1200, "DateOfLastCalibration", Vr::DA),
    entry(0x0018, 0x1201, "TimeOfLastCalibration", Vr::TM),
    entry(0x0018, 0x1400, "AcquisitionDeviceProcessingDescription", Vr::LO),
    entry(0x0018, 0x4000, "AcquisitionComments", Vr::LT),
    entry(0x0018, 0x5100, "PatientPosition", Vr::CS),
    entry(0x0018, 0x700A, "DetectorID", Vr::SH),
    entry(0x0018, 0x9424, "AcquisitionProtocolDescription", Vr::LT),
    entry(0x0018, 0xA003, "ContributionDescription", Vr::ST),
    // Relationship
    entry(0x0020, 0x000D, "StudyInstanceUID", Vr::UI),
    entry(0x0020, 0x000E, "SeriesInstanceUID", Vr::UI),
    entry(0x0020, 0x0010, "StudyID", Vr::SH),
    entry(0x0020, 0x0011, "SeriesNumber", Vr::IS),
    entry(0x0020, 0x0012, "AcquisitionNumber", Vr::IS),
    entry(0x0020, 0x0013, "InstanceNumber", Vr::IS),
    entry(0x0020, 0x0032, "ImagePositionPatient", Vr::DS),
    entry(0x0020, 0x0037, "ImageOrientationPatient", Vr::DS),
    entry(0x0020, 0x0052, "FrameOfReferenceUID", Vr::UI),
    entry(0x0020, 0x0200, "SynchronizationFrameOfReferenceUID", Vr::UI),
    entry(0x0020, 0x1040, "PositionReferenceIndicator", Vr::LO),
    entry(0x0020, 0x1041, "SliceLocation", Vr::DS),
    entry(0x0020, 0x4000, "ImageComments", Vr::LT),
    entry(0x0020, 0x9161, "ConcatenationUID", Vr::UI),
    entry(0x0020, 0x9164, "DimensionOrganizationUID", Vr::UI),
    // Image pixel
    entry(0x0028, 0x0002, "SamplesPerPixel", Vr::US),
    entry(0x0028, 0x0004, "PhotometricInterpretation", Vr::CS),
    entry(0x0028, 0x0008, "NumberOfFrames", Vr::IS),
    entry(0x0028, 0x0010, "Rows", Vr::US),
    entry(0x0028, 0x0011, "Columns", Vr::US),
    entry(0x0028, 0x0030, "PixelSpacing", Vr::DS),
    entry(0x0028, 0x0100, "BitsAllocated", Vr::US),
    entry(0x0028, 0x0101, "BitsStored", Vr::US),
    entry(0x0028, 0x0102, "HighBit", Vr::US),
    entry(0x0028, 0x0103, "PixelRepresentation", Vr::US),
    entry(0x0028, 0x0301, "BurnedInAnnotation", Vr::CS),
    entry(0x0028, 0x1050, "WindowCenter", Vr::DS),
    entry(0x0028, 0x1051, "WindowWidth", Vr::DS),
    entry(0x0028, 0x1052, "RescaleIntercept", Vr::DS),
    entry(0x0028, 0x1053, "RescaleSlope", Vr::DS),
    // Study scheduling
    entry(0x0032, 0x0012, "StudyIDIssuer", Vr::LO),
    entry(0x0032, 0x1020, "ScheduledStudyLocation", Vr::LO),
    entry(0x0032, 0x1021, "ScheduledStudyLocationAETitle", Vr::AE),
    entry(0x0032, 0x1030, "ReasonForStudy", Vr::LO),
    entry(0x0032, 0x1032, "RequestingPhysician", Vr::PN),
    entry(0x0032, 0x1033, "RequestingService", Vr::LO),
    entry(0x0032, 0x1060, "RequestedProcedureDescription", Vr::LO),
    entry(0x0032, 0x1070, "RequestedContrastAgent", Vr::LO),
    entry(0x0032, 0x4000, "StudyComments", Vr::LT),
    // Visit
    entry(0x0038, 0x0004, "ReferencedPatientAliasSequence", Vr::SQ),
    entry(0x0038, 0x0010, "AdmissionID", Vr::LO),
    entry(0x0038, 0x0011, "IssuerOfAdmissionID", Vr::LO),
    entry(0x0038, 0x0060, "ServiceEpisodeID", Vr::LO),
    entry(0x0038, 0x0062, "ServiceEpisodeDescription", Vr::LO),
    entry(0x0038, 0x0300, "CurrentPatientLocation", Vr::LO),
    entry(0x0038, 0x0400, "PatientInstitutionResidence", Vr::LO),
    entry(0x0038, 0x0500, "PatientState", Vr::LO),
    entry(0x0038, 0x4000, "VisitComments", Vr::LT),
    // Procedure steps, requests and structured reports
    entry(0x0040, 0x0001, "ScheduledStationAETitle", Vr::AE),
    entry(0x0040, 0x0002, "ScheduledProcedureStepStartDate", Vr::DA),
    entry(0x0040, 0x0003, "ScheduledProcedureStepStartTime", Vr::TM),
    entry(0x0040, 0x0006, "ScheduledPerformingPhysicianName", Vr::PN),
    entry(0x0040, 0x0007, "ScheduledProcedureStepDescription", Vr::LO),
    entry(0x0040, 0x0009, "ScheduledProcedureStepID", Vr::SH),
    entry(0x0040, 0x0010, "ScheduledStationName", Vr::SH),
    entry(0x0040, 0x0011, "ScheduledProcedureStepLocation", Vr::SH),
    entry(0x0040, 0x0100, "ScheduledProcedureStepSequence", Vr::SQ),
    entry(0x0040, 0x0241, "PerformedStationAETitle", Vr::AE),
    entry(0x0040, 0x0242, "PerformedStationName", Vr::SH),
    entry(0x0040, 0x0243, "PerformedLocation", Vr::SH),
    entry(0x0040, 0x0244, "PerformedProcedureStepStartDate", Vr::DA),
    entry(0x0040, 0x0245, "PerformedProcedureStepStartTime", Vr::TM),
    entry(0x0040, 0x0250, "PerformedProcedureStepEndDate", Vr::DA),
    entry(0x0040, 0x0251, "PerformedProcedureStepEndTime", Vr::TM),
    entry(0x0040, 0x0253, "PerformedProcedureStepID", Vr::SH),
    entry(0x0040, 0x0254, "PerformedProcedureStepDescription", Vr::LO),
    entry(0x0040, 0x0275, "RequestAttributesSequence", Vr::SQ),
    entry(0x0040, 0x0280, "CommentsOnThePerformedProcedureStep", Vr::ST),
    entry(0x0040, 0x0555, "AcquisitionContextSequence", Vr::SQ),
    entry(0x0040, 0x1001, "RequestedProcedureID", Vr::SH),
    entry(0x0040, 0x1002, "ReasonForTheRequestedProcedure", Vr::LO),
    entry(0x0040, 0x1004, "PatientTransportArrangements", Vr::LO),
    entry(0x0040, 0x1005, "RequestedProcedureLocation", Vr::LO),
    entry(0x0040, 0x1010, "NamesOfIntendedRecipientsOfResults", Vr::PN),
    entry(0x0040, 0x1101, "PersonIdentificationCodeSequence", Vr::SQ),
    entry(0x0040, 0x1102, "PersonAddress", Vr::ST),
    entry(0x0040, 0x1103, "PersonTelephoneNumbers", Vr::LO),
    entry(0x0040, 0x1400, "RequestedProcedureComments", Vr::LT),
    entry(0x0040, 0x2008, "OrderEnteredBy", Vr::PN),
    entry(0x0040, 0x2009, "OrderEntererLocation", Vr::SH),
    entry(0x0040, 0x2010, "OrderCallbackPhoneNumber", Vr::SH),
    entry(0x0040, 0x2016, "PlacerOrderNumberImagingServiceRequest", Vr::LO),
    entry(0x0040, 0x2017, "FillerOrderNumberImagingServiceRequest", Vr::LO),
    entry(0x0040, 0x2400, "ImagingServiceRequestComments", Vr::LT),
    entry(0x0040, 0xA027, "VerifyingOrganization", Vr::LO),
    entry(0x0040, 0xA030, "VerificationDateTime", Vr::DT),
    entry(0x0040, 0xA073, "VerifyingObserverSequence", Vr::SQ),
    entry(0x0040, 0xA075, "VerifyingObserverName", Vr::PN),
    entry(0x0040, 0xA078, "AuthorObserverSequence", Vr::SQ),
    entry(0x0040, 0xA088, "VerifyingObserverIdentificationCodeSequence", Vr::SQ),
    entry(0x0040, 0xA123, "PersonName", Vr::PN),
    entry(0x0040, 0xA124, "UID", Vr::UI),
    entry(0x0040, 0xA730, "ContentSequence", Vr::SQ),
    entry(0x0040, 0xDB0C, "TemplateExtensionOrganizationUID", Vr::UI),
    entry(0x0040, 0xDB0D, "TemplateExtensionCreatorUID", Vr::UI),
    // Nuclear medicine energy windows
    entry(0x0054, 0x0012, "EnergyWindowInformationSequence", Vr::SQ),
    entry(0x0054, 0x0013, "EnergyWindowRangeSequence", Vr::SQ),
    entry(0x0054, 0x0014, "EnergyWindowLowerLimit", Vr::DS),
    entry(0x0054, 0x0015, "EnergyWindowUpperLimit", Vr::DS),
    // Presentation state
    entry(0x0070, 0x0084, "ContentCreatorName", Vr::PN),
    entry(0x0070, 0x0086, "ContentCreatorIdentificationCodeSequence", Vr::SQ),
    // Storage
    entry(0x0088, 0x0140, "StorageMediaFileSetUID", Vr::UI),
    // Structure sets
    entry(0x3006, 0x0024, "ReferencedFrameOfReferenceUID", Vr::UI),
    entry(0x3006, 0x00C2, "RelatedFrameOfReferenceUID", Vr::UI),
    // Text
    entry(0x4000, 0x0010, "Arbitrary", Vr::LT),
    entry(0x4000, 0x4000, "TextComments", Vr::LT),
    // Pixel data
    entry(0x7FE0, 0x0010, "PixelData", Vr::OW),
];

static BY_TAG: Lazy<HashMap<Tag, &'static DictionaryEntry>> =
    Lazy::new(|| ENTRIES.iter().map(|e| (e.tag, e)).collect());

static BY_KEYWORD: Lazy<HashMap<&'static str, &'static DictionaryEntry>> =
    Lazy::new(|| ENTRIES.iter().map(|e| (e.keyword, e)).collect());

/// Look up an entry by tag.
pub fn lookup_tag(tag: Tag) -> Option<&'static DictionaryEntry> {
    BY_TAG.get(&tag).copied()
}

/// Look up an entry by keyword.
pub fn lookup_keyword(keyword: &str) -> Option<&'static DictionaryEntry> {
    BY_KEYWORD.get(keyword).copied()
}

/// Keyword for a tag, if the dictionary knows it.
pub fn name_for_tag(tag: Tag) -> Option<&'static str> {
    lookup_tag(tag).map(|e| e.keyword)
}

/// Tag for a keyword, if the dictionary knows it.
pub fn tag_for_name(keyword: &str) -> Option<Tag> {
    lookup_keyword(keyword).map(|e| e.tag)
}

/// Resolve a tag identifier (`(gggg,eeee)` or `ggggeeee`) to its keyword.
///
/// Returns `None` for anything that is not a recognized tag identifier,
/// including plain keywords.
pub fn keyword_for_identifier(identifier: &str) -> Option<&'static str> {
    Tag::parse(identifier).and_then(name_for_tag)
}

/// Natural-form key for a tag: the keyword when known, else the 8-digit tag.
pub fn natural_key(tag: Tag) -> String {
    match name_for_tag(tag) {
        Some(keyword) if !tag.is_private() => keyword.to_string(),
        _ => tag.to_string(),
    }
}
