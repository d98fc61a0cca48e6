//! Raw element model: tag-keyed elements with an explicit VR.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CurateError;

/// A data element tag, `(group << 16) | element`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u32);

impl Tag {
    pub const ITEM: Tag = Tag(0xFFFE_E000);
    pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE_E00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE_E0DD);

    /// Build a tag from group and element numbers.
    pub fn new(group: u16, element: u16) -> Self {
        Tag(((group as u32) << 16) | element as u32)
    }

    pub fn group(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn element(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Odd groups hold private (vendor-specific) elements.
    pub fn is_private(&self) -> bool {
        self.group() % 2 == 1
    }

    /// Group 0002 elements belong to the file meta information.
    pub fn is_meta(&self) -> bool {
        self.group() == 0x0002
    }

    /// Parse `ggggeeee` or `(gggg,eeee)`.
    pub fn parse(s: &str) -> Option<Tag> {
        let cleaned: String = s
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | ','))
            .collect();
        if cleaned.len() != 8 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(&cleaned, 16).ok().map(Tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Tag::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid tag '{}'", s)))
    }
}

/// Value representation of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FL,
    FD,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

/// How the bytes of a VR are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrKind {
    /// Backslash-separated text values.
    Text,
    /// Single text value where backslash is literal.
    LongText,
    /// Little-endian integers of the given width, signed or not.
    Int { width: usize, signed: bool },
    /// Little-endian IEEE floats of the given width.
    Float { width: usize },
    /// Attribute tag pairs.
    AttributeTag,
    /// Opaque bytes.
    Binary,
    /// Nested items.
    Sequence,
}

impl Vr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::AT => "AT",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::FL => "FL",
            Vr::FD => "FD",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::OB => "OB",
            Vr::OD => "OD",
            Vr::OF => "OF",
            Vr::OL => "OL",
            Vr::OV => "OV",
            Vr::OW => "OW",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::SL => "SL",
            Vr::SQ => "SQ",
            Vr::SS => "SS",
            Vr::ST => "ST",
            Vr::SV => "SV",
            Vr::TM => "TM",
            Vr::UC => "UC",
            Vr::UI => "UI",
            Vr::UL => "UL",
            Vr::UN => "UN",
            Vr::UR => "UR",
            Vr::US => "US",
            Vr::UT => "UT",
            Vr::UV => "UV",
        }
    }

    /// Parse the two-byte VR code found in explicit-VR streams.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Vr> {
        std::str::from_utf8(&bytes).ok()?.parse().ok()
    }

    /// VRs encoded with a 2-byte reserved field and a 4-byte length.
    pub fn has_long_length(&self) -> bool {
        matches!(
            self,
            Vr::OB
                | Vr::OD
                | Vr::OF
                | Vr::OL
                | Vr::OV
                | Vr::OW
                | Vr::SQ
                | Vr::SV
                | Vr::UC
                | Vr::UN
                | Vr::UR
                | Vr::UT
                | Vr::UV
        )
    }

    pub fn kind(&self) -> VrKind {
        match self {
            Vr::AE | Vr::AS | Vr::CS | Vr::DA | Vr::DS | Vr::DT | Vr::IS | Vr::LO | Vr::PN
            | Vr::SH | Vr::TM | Vr::UC | Vr::UI => VrKind::Text,
            Vr::LT | Vr::ST | Vr::UR | Vr::UT => VrKind::LongText,
            Vr::US => VrKind::Int { width: 2, signed: false },
            Vr::SS => VrKind::Int { width: 2, signed: true },
            Vr::UL => VrKind::Int { width: 4, signed: false },
            Vr::SL => VrKind::Int { width: 4, signed: true },
            Vr::UV => VrKind::Int { width: 8, signed: false },
            Vr::SV => VrKind::Int { width: 8, signed: true },
            Vr::FL => VrKind::Float { width: 4 },
            Vr::FD => VrKind::Float { width: 8 },
            Vr::AT => VrKind::AttributeTag,
            Vr::OB | Vr::OD | Vr::OF | Vr::OL | Vr::OV | Vr::OW | Vr::UN => VrKind::Binary,
            Vr::SQ => VrKind::Sequence,
        }
    }

    /// Byte used to pad text values to an even length.
    pub fn padding(&self) -> u8 {
        match self {
            Vr::UI => 0,
            _ if matches!(self.kind(), VrKind::Text | VrKind::LongText) => b' ',
            _ => 0,
        }
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vr = match s {
            "AE" => Vr::AE,
            "AS" => Vr::AS,
            "AT" => Vr::AT,
            "CS" => Vr::CS,
            "DA" => Vr::DA,
            "DS" => Vr::DS,
            "DT" => Vr::DT,
            "FL" => Vr::FL,
            "FD" => Vr::FD,
            "IS" => Vr::IS,
            "LO" => Vr::LO,
            "LT" => Vr::LT,
            "OB" => Vr::OB,
            "OD" => Vr::OD,
            "OF" => Vr::OF,
            "OL" => Vr::OL,
            "OV" => Vr::OV,
            "OW" => Vr::OW,
            "PN" => Vr::PN,
            "SH" => Vr::SH,
            "SL" => Vr::SL,
            "SQ" => Vr::SQ,
            "SS" => Vr::SS,
            "ST" => Vr::ST,
            "SV" => Vr::SV,
            "TM" => Vr::TM,
            "UC" => Vr::UC,
            "UI" => Vr::UI,
            "UL" => Vr::UL,
            "UN" => Vr::UN,
            "UR" => Vr::UR,
            "US" => Vr::US,
            "UT" => Vr::UT,
            "UV" => Vr::UV,
            other => return Err(CurateError::Decode(format!("Unknown VR '{}'", other))),
        };
        Ok(vr)
    }
}

/// Decoded payload of a raw element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawValue {
    /// Zero-length value.
    Empty,
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Bytes(Vec<u8>),
    /// Encapsulated pixel data, kept verbatim (basic offset table + fragments).
    Fragments(Vec<Vec<u8>>),
    Items(Vec<RawDataset>),
}

/// A raw element: VR plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub vr: Vr,
    pub value: RawValue,
}

impl RawElement {
    pub fn new(vr: Vr, value: RawValue) -> Self {
        Self { vr, value }
    }

    /// An empty sequence.
    pub fn sequence(items: Vec<RawDataset>) -> Self {
        Self::new(Vr::SQ, RawValue::Items(items))
    }

    /// First text value, if the element holds text.
    pub fn first_string(&self) -> Option<&str> {
        match &self.value {
            RawValue::Strings(values) => values.first().map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Elements ordered by tag, as they are encoded.
pub type RawDataset = BTreeMap<Tag, RawElement>;

/// A decoded Part 10 file: meta group plus main dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomFile {
    pub meta: RawDataset,
    pub dict: RawDataset,
}

impl DicomFile {
    pub fn new(meta: RawDataset, dict: RawDataset) -> Self {
        Self { meta, dict }
    }

    /// Transfer syntax UID declared in the meta group.
    pub fn transfer_syntax(&self) -> Option<&str> {
        self.meta
            .get(&Tag::new(0x0002, 0x0010))
            .and_then(|e| e.first_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parse_forms() {
        assert_eq!(Tag::parse("00100010"), Some(Tag::new(0x0010, 0x0010)));
        assert_eq!(Tag::parse("(0010,0010)"), Some(Tag::new(0x0010, 0x0010)));
        assert_eq!(Tag::parse("PatientName"), None);
        assert_eq!(Tag::parse("0010001"), None);
    }

    #[test]
    fn test_tag_display_and_private() {
        let tag = Tag::new(0x0029, 0x1010);
        assert_eq!(tag.to_string(), "00291010");
        assert!(tag.is_private());
        assert!(!Tag::new(0x0010, 0x0010).is_private());
    }

    #[test]
    fn test_vr_roundtrip() {
        assert_eq!(Vr::from_bytes(*b"SQ"), Some(Vr::SQ));
        assert_eq!(Vr::from_bytes(*b"ZZ"), None);
        assert!(Vr::OB.has_long_length());
        assert!(!Vr::PN.has_long_length());
        assert_eq!(Vr::UI.padding(), 0);
        assert_eq!(Vr::LO.padding(), b' ');
    }
}
