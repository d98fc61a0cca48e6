//! File meta information for curated output.

use crate::codec::EXPLICIT_VR_LITTLE_ENDIAN;
use crate::dataset::{RawDataset, RawElement, RawValue, Tag, Vr};

const GROUP_LENGTH: Tag = Tag(0x0002_0000);
const VERSION: Tag = Tag(0x0002_0001);
const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002_0002);
const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002_0003);
const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002_0010);

fn ui(value: &str) -> RawElement {
    RawElement::new(Vr::UI, RawValue::Strings(vec![value.to_string()]))
}

/// Meta group for the mapped dataset.
///
/// The media storage identifiers follow the mapped SOP identifiers, so
/// UID protection reaches the meta group too. The group length is left
/// for the encoder to recompute.
pub fn map_metaheader(
    meta: &RawDataset,
    sop_class_uid: Option<&str>,
    sop_instance_uid: Option<&str>,
) -> RawDataset {
    let mut mapped = meta.clone();
    mapped.remove(&GROUP_LENGTH);
    mapped
        .entry(VERSION)
        .or_insert_with(|| RawElement::new(Vr::OB, RawValue::Bytes(vec![0x00, 0x01])));
    mapped
        .entry(TRANSFER_SYNTAX_UID)
        .or_insert_with(|| ui(EXPLICIT_VR_LITTLE_ENDIAN));

    if let Some(uid) = sop_class_uid.filter(|u| !u.is_empty()) {
        mapped.insert(MEDIA_STORAGE_SOP_CLASS_UID, ui(uid));
    }
    match sop_instance_uid.filter(|u| !u.is_empty()) {
        Some(uid) => {
            mapped.insert(MEDIA_STORAGE_SOP_INSTANCE_UID, ui(uid));
        }
        None => {
            mapped.remove(&MEDIA_STORAGE_SOP_INSTANCE_UID);
        }
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_uid_follows_dataset() {
        let mut meta = RawDataset::new();
        meta.insert(GROUP_LENGTH, RawElement::new(Vr::UL, RawValue::Ints(vec![90])));
        meta.insert(MEDIA_STORAGE_SOP_INSTANCE_UID, ui("1.2.3"));
        meta.insert(TRANSFER_SYNTAX_UID, ui("1.2.840.10008.1.2"));

        let mapped = map_metaheader(&meta, None, Some("2.25.42"));
        assert_eq!(mapped[&MEDIA_STORAGE_SOP_INSTANCE_UID], ui("2.25.42"));
        assert!(!mapped.contains_key(&GROUP_LENGTH));
        assert_eq!(mapped[&TRANSFER_SYNTAX_UID], ui("1.2.840.10008.1.2"));
        assert!(mapped.contains_key(&VERSION));
    }

    #[test]
    fn test_missing_instance_uid_removed() {
        let mut meta = RawDataset::new();
        meta.insert(MEDIA_STORAGE_SOP_INSTANCE_UID, ui("1.2.3"));
        let mapped = map_metaheader(&meta, None, Some(""));
        assert!(!mapped.contains_key(&MEDIA_STORAGE_SOP_INSTANCE_UID));
        assert_eq!(mapped[&TRANSFER_SYNTAX_UID], ui(EXPLICIT_VR_LITTLE_ENDIAN));
    }
}
