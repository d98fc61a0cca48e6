//! DICOM Part 10 reader and writer (little-endian transfer syntaxes).

use crate::dataset::{DicomFile, RawDataset, RawElement, RawValue, Tag, Vr, VrKind};
use crate::error::{CurateError, Result};

use super::dictionary;
use super::DicomCodec;

/// Length of the file preamble.
pub const PREAMBLE_LEN: usize = 128;

/// Smallest possible Part 10 file: preamble plus `DICM` signature.
pub const MIN_PART10_SIZE: u64 = 132;

/// Signature found right after the preamble.
pub const MAGIC: &[u8; 4] = b"DICM";

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Part 10 codec for explicit and implicit VR little endian files.
///
/// Encapsulated (compressed) pixel data is carried through verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct Part10Codec;

impl Part10Codec {
    pub fn new() -> Self {
        Self
    }
}

impl DicomCodec for Part10Codec {
    fn decode(&self, bytes: &[u8]) -> Result<DicomFile> {
        if (bytes.len() as u64) < MIN_PART10_SIZE {
            return Err(CurateError::Decode(format!(
                "File too small for Part 10 ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] != MAGIC {
            return Err(CurateError::Decode("Missing DICM signature".to_string()));
        }

        let mut reader = Reader::new(bytes, PREAMBLE_LEN + 4, true);
        let meta = reader.read_meta()?;

        let transfer_syntax = meta
            .get(&Tag::new(0x0002, 0x0010))
            .and_then(|e| e.first_string())
            .unwrap_or(EXPLICIT_VR_LITTLE_ENDIAN)
            .to_string();

        match transfer_syntax.as_str() {
            EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => {
                return Err(CurateError::Decode(format!(
                    "Unsupported transfer syntax {}",
                    transfer_syntax
                )));
            }
            _ => {}
        }

        reader.explicit = transfer_syntax != IMPLICIT_VR_LITTLE_ENDIAN;
        let dict = reader.read_dataset(None)?;

        Ok(DicomFile::new(meta, dict))
    }

    fn encode(&self, file: &DicomFile) -> Result<Vec<u8>> {
        let mut out = vec![0u8; PREAMBLE_LEN];
        out.extend_from_slice(MAGIC);

        // Meta group is always explicit VR little endian with a fresh group length.
        let mut meta = Vec::new();
        for (tag, element) in file.meta.iter() {
            if *tag == Tag::new(0x0002, 0x0000) {
                continue;
            }
            write_element(&mut meta, *tag, element, true)?;
        }
        let group_length = RawElement::new(Vr::UL, RawValue::Ints(vec![meta.len() as i64]));
        write_element(&mut out, Tag::new(0x0002, 0x0000), &group_length, true)?;
        out.extend_from_slice(&meta);

        let explicit = file.transfer_syntax() != Some(IMPLICIT_VR_LITTLE_ENDIAN);
        write_dataset(&mut out, &file.dict, explicit)?;

        Ok(out)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize, explicit: bool) -> Self {
        Self { data, pos, explicit }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CurateError::Decode(format!(
                "Unexpected end of data at offset {} (wanted {} bytes)",
                self.pos, len
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn tag(&mut self) -> Result<Tag> {
        let group = self.u16()?;
        let element = self.u16()?;
        Ok(Tag::new(group, element))
    }

    fn peek_group(&self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]))
    }

    fn read_meta(&mut self) -> Result<RawDataset> {
        let mut meta = RawDataset::new();
        while self.peek_group() == Some(0x0002) {
            let tag = self.tag()?;
            let (vr, len) = self.header(tag)?;
            let element = self.value(tag, vr, len)?;
            meta.insert(tag, element);
        }
        Ok(meta)
    }

    /// Read elements until `end`, an item delimiter, or the end of data.
    fn read_dataset(&mut self, end: Option<usize>) -> Result<RawDataset> {
        let mut dataset = RawDataset::new();
        loop {
            match end {
                Some(end) if self.pos >= end => break,
                None if self.remaining() == 0 => break,
                _ => {}
            }
            let tag = self.tag()?;
            if tag == Tag::ITEM_DELIMITATION {
                self.u32()?;
                break;
            }
            let (vr, len) = self.header(tag)?;
            let element = self.value(tag, vr, len)?;
            dataset.insert(tag, element);
        }
        Ok(dataset)
    }

    fn header(&mut self, tag: Tag) -> Result<(Vr, u32)> {
        if self.explicit || tag.is_meta() {
            let code = self.take(2)?;
            let vr = Vr::from_bytes([code[0], code[1]]).ok_or_else(|| {
                CurateError::Decode(format!(
                    "Invalid VR '{}' for tag {}",
                    String::from_utf8_lossy(code),
                    tag
                ))
            })?;
            let len = if vr.has_long_length() {
                self.take(2)?;
                self.u32()?
            } else {
                self.u16()? as u32
            };
            Ok((vr, len))
        } else {
            let len = self.u32()?;
            let vr = if tag.element() == 0x0000 {
                Vr::UL
            } else if let Some(entry) = dictionary::lookup_tag(tag) {
                entry.vr
            } else if len == UNDEFINED_LENGTH {
                Vr::SQ
            } else {
                Vr::UN
            };
            Ok((vr, len))
        }
    }

    fn value(&mut self, tag: Tag, vr: Vr, len: u32) -> Result<RawElement> {
        if vr == Vr::SQ || (vr == Vr::UN && len == UNDEFINED_LENGTH) {
            // Undefined-length UN content is implicit VR little endian.
            let explicit = self.explicit;
            if vr == Vr::UN {
                self.explicit = false;
            }
            let items = self.read_sequence(len);
            self.explicit = explicit;
            return Ok(RawElement::sequence(items?));
        }

        if len == UNDEFINED_LENGTH {
            if matches!(vr, Vr::OB | Vr::OW) {
                return Ok(RawElement::new(vr, RawValue::Fragments(self.read_fragments()?)));
            }
            return Err(CurateError::Decode(format!(
                "Undefined length on non-sequence element {} ({})",
                tag, vr
            )));
        }

        let bytes = self.take(len as usize)?;
        Ok(RawElement::new(vr, parse_value(vr, bytes)))
    }

    fn read_sequence(&mut self, len: u32) -> Result<Vec<RawDataset>> {
        let end = if len == UNDEFINED_LENGTH {
            None
        } else {
            Some(self.pos + len as usize)
        };
        let mut items = Vec::new();
        loop {
            if let Some(end) = end {
                if self.pos >= end {
                    break;
                }
            }
            let tag = self.tag()?;
            let item_len = self.u32()?;
            if tag == Tag::SEQUENCE_DELIMITATION {
                break;
            }
            if tag != Tag::ITEM {
                return Err(CurateError::Decode(format!(
                    "Expected item tag in sequence, found {}",
                    tag
                )));
            }
            let item = if item_len == UNDEFINED_LENGTH {
                self.read_dataset_until_delimiter()?
            } else {
                let item_end = self.pos + item_len as usize;
                self.read_dataset(Some(item_end))?
            };
            items.push(item);
        }
        Ok(items)
    }

    fn read_dataset_until_delimiter(&mut self) -> Result<RawDataset> {
        let mut dataset = RawDataset::new();
        loop {
            if self.remaining() == 0 {
                return Err(CurateError::Decode("Unterminated sequence item".to_string()));
            }
            let tag = self.tag()?;
            if tag == Tag::ITEM_DELIMITATION {
                self.u32()?;
                return Ok(dataset);
            }
            let (vr, len) = self.header(tag)?;
            let element = self.value(tag, vr, len)?;
            dataset.insert(tag, element);
        }
    }

    fn read_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut fragments = Vec::new();
        loop {
            let tag = self.tag()?;
            let len = self.u32()?;
            if tag == Tag::SEQUENCE_DELIMITATION {
                return Ok(fragments);
            }
            if tag != Tag::ITEM {
                return Err(CurateError::Decode(format!(
                    "Expected fragment item, found {}",
                    tag
                )));
            }
            fragments.push(self.take(len as usize)?.to_vec());
        }
    }
}

fn parse_value(vr: Vr, bytes: &[u8]) -> RawValue {
    if bytes.is_empty() {
        return RawValue::Empty;
    }
    match vr.kind() {
        VrKind::Text => {
            let text = String::from_utf8_lossy(bytes);
            let trimmed = text.trim_end_matches(['\0', ' ']);
            RawValue::Strings(trimmed.split('\\').map(|s| s.to_string()).collect())
        }
        VrKind::LongText => {
            let text = String::from_utf8_lossy(bytes);
            RawValue::Strings(vec![text.trim_end_matches(['\0', ' ']).to_string()])
        }
        VrKind::Int { width, signed } if bytes.len() % width == 0 => RawValue::Ints(
            bytes
                .chunks_exact(width)
                .map(|c| read_int(c, signed))
                .collect(),
        ),
        VrKind::Float { width: 4 } if bytes.len() % 4 == 0 => RawValue::Floats(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
        ),
        VrKind::Float { .. } if bytes.len() % 8 == 0 => RawValue::Floats(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    f64::from_le_bytes(b)
                })
                .collect(),
        ),
        VrKind::AttributeTag if bytes.len() % 4 == 0 => RawValue::Ints(
            bytes
                .chunks_exact(4)
                .map(|c| {
                    let group = u16::from_le_bytes([c[0], c[1]]);
                    let element = u16::from_le_bytes([c[2], c[3]]);
                    Tag::new(group, element).0 as i64
                })
                .collect(),
        ),
        _ => RawValue::Bytes(bytes.to_vec()),
    }
}

fn read_int(chunk: &[u8], signed: bool) -> i64 {
    match (chunk.len(), signed) {
        (2, false) => u16::from_le_bytes([chunk[0], chunk[1]]) as i64,
        (2, true) => i16::from_le_bytes([chunk[0], chunk[1]]) as i64,
        (4, false) => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64,
        (4, true) => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64,
        _ => {
            let mut b = [0u8; 8];
            b.copy_from_slice(chunk);
            i64::from_le_bytes(b)
        }
    }
}

fn write_dataset(out: &mut Vec<u8>, dataset: &RawDataset, explicit: bool) -> Result<()> {
    for (tag, element) in dataset.iter() {
        write_element(out, *tag, element, explicit)?;
    }
    Ok(())
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.group().to_le_bytes());
    out.extend_from_slice(&tag.element().to_le_bytes());
}

fn write_header(out: &mut Vec<u8>, tag: Tag, vr: Vr, len: u32, explicit: bool) -> Result<()> {
    write_tag(out, tag);
    if !explicit {
        out.extend_from_slice(&len.to_le_bytes());
        return Ok(());
    }
    out.extend_from_slice(vr.as_str().as_bytes());
    if vr.has_long_length() {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&len.to_le_bytes());
    } else {
        let short = u16::try_from(len).map_err(|_| {
            CurateError::Encode(format!("Value of {} too long for VR {}", tag, vr))
        })?;
        out.extend_from_slice(&short.to_le_bytes());
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, tag: Tag, element: &RawElement, explicit: bool) -> Result<()> {
    match &element.value {
        RawValue::Items(items) => {
            write_header(out, tag, Vr::SQ, UNDEFINED_LENGTH, explicit)?;
            for item in items {
                write_tag(out, Tag::ITEM);
                out.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
                write_dataset(out, item, explicit)?;
                write_tag(out, Tag::ITEM_DELIMITATION);
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            write_tag(out, Tag::SEQUENCE_DELIMITATION);
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        RawValue::Fragments(fragments) => {
            write_header(out, tag, element.vr, UNDEFINED_LENGTH, explicit)?;
            for fragment in fragments {
                write_tag(out, Tag::ITEM);
                let mut bytes = fragment.clone();
                if bytes.len() % 2 == 1 {
                    bytes.push(0);
                }
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&bytes);
            }
            write_tag(out, Tag::SEQUENCE_DELIMITATION);
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        value => {
            let mut bytes = encode_value(tag, element.vr, value)?;
            if bytes.len() % 2 == 1 {
                bytes.push(element.vr.padding());
            }
            write_header(out, tag, element.vr, bytes.len() as u32, explicit)?;
            out.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

fn encode_value(tag: Tag, vr: Vr, value: &RawValue) -> Result<Vec<u8>> {
    let mismatch = || CurateError::Encode(format!("Value of {} does not fit VR {}", tag, vr));
    let bytes = match (vr.kind(), value) {
        (_, RawValue::Empty) => Vec::new(),
        (_, RawValue::Bytes(bytes)) => bytes.clone(),
        (VrKind::Text | VrKind::LongText, RawValue::Strings(values)) => {
            values.join("\\").into_bytes()
        }
        (VrKind::Text, RawValue::Ints(values)) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\\")
            .into_bytes(),
        (VrKind::Text, RawValue::Floats(values)) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\\")
            .into_bytes(),
        (VrKind::Int { width, .. }, RawValue::Ints(values)) => {
            let mut out = Vec::with_capacity(values.len() * width);
            for v in values {
                out.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            out
        }
        (VrKind::Float { width: 4 }, RawValue::Floats(values)) => values
            .iter()
            .flat_map(|v| (*v as f32).to_le_bytes())
            .collect(),
        (VrKind::Float { .. }, RawValue::Floats(values)) => {
            values.iter().flat_map(|v| v.to_le_bytes()).collect()
        }
        (VrKind::AttributeTag, RawValue::Ints(values)) => {
            let mut out = Vec::with_capacity(values.len() * 4);
            for v in values {
                let t = Tag(*v as u32);
                out.extend_from_slice(&t.group().to_le_bytes());
                out.extend_from_slice(&t.element().to_le_bytes());
            }
            out
        }
        _ => return Err(mismatch()),
    };
    Ok(bytes)
}
