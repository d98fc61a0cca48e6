//! Conversions between the raw and natural dataset models.

use tracing::debug;

use crate::dataset::{NaturalDataset, RawDataset, RawElement, RawValue, Tag, Value, Vr, VrKind};

use super::dictionary;

/// Convert a raw dataset to keyword-keyed form.
///
/// Elements the dictionary cannot name keep their raw element under the
/// 8-digit tag key. Unnamed standard sequences are naturalized item by
/// item under that key so their contents can still be mapped.
pub fn naturalize(raw: &RawDataset) -> NaturalDataset {
    let mut natural = NaturalDataset::with_capacity(raw.len());
    for (tag, element) in raw.iter() {
        let keyword = match dictionary::name_for_tag(*tag) {
            Some(keyword) if !tag.is_private() => keyword,
            _ => {
                let value = match &element.value {
                    RawValue::Items(_) if !tag.is_private() => natural_value(element),
                    _ => Value::Raw(element.clone()),
                };
                natural.insert(tag.to_string(), value);
                continue;
            }
        };
        natural.insert(keyword.to_string(), natural_value(element));
    }
    natural
}

fn natural_value(element: &RawElement) -> Value {
    match &element.value {
        RawValue::Empty => match element.vr.kind() {
            VrKind::Sequence => Value::Sequence(Vec::new()),
            VrKind::Text | VrKind::LongText => Value::Text(String::new()),
            VrKind::Binary => Value::Bytes(Vec::new()),
            _ => Value::Multi(Vec::new()),
        },
        RawValue::Strings(values) => collapse(values.iter().cloned().map(Value::Text).collect()),
        RawValue::Ints(values) => collapse(values.iter().copied().map(Value::Int).collect()),
        RawValue::Floats(values) => collapse(values.iter().copied().map(Value::Float).collect()),
        RawValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        RawValue::Fragments(_) => Value::Raw(element.clone()),
        RawValue::Items(items) => Value::Sequence(items.iter().map(naturalize).collect()),
    }
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Multi(values)
    }
}

/// Convert a natural dataset back to raw form.
///
/// Returns the dataset plus one message per attribute that could not be
/// converted. Private elements are never carried through this path; they
/// come back only via the quarantine restore.
pub fn denaturalize(natural: &NaturalDataset) -> (RawDataset, Vec<String>) {
    let mut problems = Vec::new();
    let raw = denaturalize_into(natural, &mut problems);
    (raw, problems)
}

fn denaturalize_into(natural: &NaturalDataset, problems: &mut Vec<String>) -> RawDataset {
    let mut raw = RawDataset::new();
    for (key, value) in natural.iter() {
        if let Some(entry) = dictionary::lookup_keyword(key) {
            match raw_element(value, entry.vr, problems) {
                Some(element) => {
                    raw.insert(entry.tag, element);
                }
                None => problems.push(format!(
                    "Value of {} cannot be written as {}",
                    key, entry.vr
                )),
            }
            continue;
        }

        match Tag::parse(key) {
            Some(tag) if tag.is_private() => {
                debug!(tag = %tag, "dropping private element during denaturalize");
            }
            Some(tag) => match value {
                Value::Raw(element) => {
                    raw.insert(tag, element.clone());
                }
                other => match raw_element(other, unnamed_vr(other), problems) {
                    Some(element) => {
                        raw.insert(tag, element);
                    }
                    None => problems.push(format!("Value of {} cannot be written", key)),
                },
            },
            None => problems.push(format!("Unknown attribute '{}' dropped", key)),
        }
    }
    raw
}

fn unnamed_vr(value: &Value) -> Vr {
    match value {
        Value::Sequence(_) => Vr::SQ,
        _ => Vr::UN,
    }
}

/// Convert a natural value to a raw element of the given VR.
///
/// Nested sequence problems are dropped; use [`denaturalize`] to see them.
pub fn value_to_element(value: &Value, vr: Vr) -> Option<RawElement> {
    raw_element(value, vr, &mut Vec::new())
}

fn raw_element(value: &Value, vr: Vr, problems: &mut Vec<String>) -> Option<RawElement> {
    if let Value::Raw(element) = value {
        return Some(element.clone());
    }
    let raw = match (vr.kind(), value) {
        (VrKind::Sequence, Value::Sequence(items)) => RawValue::Items(
            items
                .iter()
                .map(|item| denaturalize_into(item, problems))
                .collect(),
        ),
        (_, v) if v.is_empty() => RawValue::Empty,
        (VrKind::Text | VrKind::LongText, Value::Multi(values)) => {
            RawValue::Strings(values.iter().map(|v| v.to_string()).collect())
        }
        (VrKind::Text | VrKind::LongText, Value::Text(_) | Value::Int(_) | Value::Float(_)) => {
            RawValue::Strings(vec![value.to_string()])
        }
        (VrKind::Int { .. } | VrKind::AttributeTag, v) => RawValue::Ints(ints(v)?),
        (VrKind::Float { .. }, v) => RawValue::Floats(floats(v)?),
        (VrKind::Binary, Value::Bytes(bytes)) => RawValue::Bytes(bytes.clone()),
        (VrKind::Binary, Value::Text(s)) => RawValue::Bytes(s.clone().into_bytes()),
        _ => return None,
    };
    Some(RawElement::new(vr, raw))
}

fn ints(value: &Value) -> Option<Vec<i64>> {
    match value {
        Value::Int(n) => Some(vec![*n]),
        Value::Float(x) if x.fract() == 0.0 => Some(vec![*x as i64]),
        Value::Text(s) => s.split('\\').map(|p| p.trim().parse().ok()).collect(),
        Value::Multi(values) => values
            .iter()
            .map(|v| ints(v).and_then(|mut n| if n.len() == 1 { n.pop() } else { None }))
            .collect(),
        _ => None,
    }
}

fn floats(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Float(x) => Some(vec![*x]),
        Value::Int(n) => Some(vec![*n as f64]),
        Value::Text(s) => s.split('\\').map(|p| p.trim().parse().ok()).collect(),
        Value::Multi(values) => values
            .iter()
            .map(|v| floats(v).and_then(|mut n| if n.len() == 1 { n.pop() } else { None }))
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_text(vr: Vr, values: &[&str]) -> RawElement {
        RawElement::new(vr, RawValue::Strings(values.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_naturalize_keys_and_values() {
        let mut raw = RawDataset::new();
        raw.insert(Tag::new(0x0010, 0x0010), raw_text(Vr::PN, &["Doe^Jane"]));
        raw.insert(Tag::new(0x0028, 0x0030), raw_text(Vr::DS, &["0.5", "0.5"]));
        raw.insert(Tag::new(0x0028, 0x0010), RawElement::new(Vr::US, RawValue::Ints(vec![256])));
        raw.insert(
            Tag::new(0x0029, 0x1010),
            RawElement::new(Vr::OB, RawValue::Bytes(vec![9, 9])),
        );

        let natural = naturalize(&raw);
        assert_eq!(natural.get("PatientName"), Some(&Value::from("Doe^Jane")));
        assert_eq!(
            natural.get("PixelSpacing"),
            Some(&Value::Multi(vec![Value::from("0.5"), Value::from("0.5")]))
        );
        assert_eq!(natural.get("Rows"), Some(&Value::Int(256)));
        assert!(matches!(natural.get("00291010"), Some(Value::Raw(_))));
    }

    #[test]
    fn test_denaturalize_drops_private_elements() {
        let mut natural = NaturalDataset::new();
        natural.insert("PatientID".into(), Value::from("P1"));
        natural.insert(
            "00291010".into(),
            Value::Raw(RawElement::new(Vr::OB, RawValue::Bytes(vec![1, 2]))),
        );
        let (raw, problems) = denaturalize(&natural);
        assert!(problems.is_empty());
        assert_eq!(raw.len(), 1);
        assert!(raw.contains_key(&Tag::new(0x0010, 0x0020)));
    }

    #[test]
    fn test_denaturalize_keeps_unknown_standard_elements() {
        let mut natural = NaturalDataset::new();
        let element = raw_text(Vr::LO, &["kept"]);
        natural.insert("00331000".into(), Value::Raw(element.clone()));
        let (raw, _) = denaturalize(&natural);
        assert_eq!(raw.get(&Tag::new(0x0033, 0x1000)), None);

        let mut natural = NaturalDataset::new();
        natural.insert("00321000".into(), Value::Raw(element.clone()));
        let (raw, _) = denaturalize(&natural);
        assert_eq!(raw.get(&Tag::new(0x0032, 0x1000)), Some(&element));
    }

    #[test]
    fn test_denaturalize_coerces_numbers() {
        let mut natural = NaturalDataset::new();
        natural.insert("SeriesNumber".into(), Value::Int(3));
        natural.insert("Rows".into(), Value::from("512"));
        natural.insert("PatientWeight".into(), Value::Float(70.5));
        let (raw, problems) = denaturalize(&natural);
        assert!(problems.is_empty());
        assert_eq!(
            raw.get(&Tag::new(0x0020, 0x0011)).unwrap().value,
            RawValue::Strings(vec!["3".into()])
        );
        assert_eq!(raw.get(&Tag::new(0x0028, 0x0010)).unwrap().value, RawValue::Ints(vec![512]));
        assert_eq!(
            raw.get(&Tag::new(0x0010, 0x1030)).unwrap().value,
            RawValue::Strings(vec!["70.5".into()])
        );
    }

    #[test]
    fn test_denaturalize_reports_bad_values() {
        let mut natural = NaturalDataset::new();
        natural.insert("Rows".into(), Value::from("many"));
        natural.insert("NotAKeyword".into(), Value::from("x"));
        let (raw, problems) = denaturalize(&natural);
        assert!(raw.is_empty());
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_unnamed_standard_sequence_stays_walkable() {
        let mut item = RawDataset::new();
        item.insert(Tag::new(0x0010, 0x0010), raw_text(Vr::PN, &["Doe^Jane"]));
        item.insert(Tag::new(0x0009, 0x1010), raw_text(Vr::LO, &["vendor"]));
        let mut raw = RawDataset::new();
        raw.insert(Tag::new(0x0018, 0x9346), RawElement::sequence(vec![item]));

        let natural = naturalize(&raw);
        let items = natural.get("00189346").and_then(|v| v.as_sequence()).unwrap();
        assert_eq!(items[0].get("PatientName"), Some(&Value::from("Doe^Jane")));
        assert!(matches!(items[0].get("00091010"), Some(Value::Raw(_))));

        let (back, problems) = denaturalize(&natural);
        assert!(problems.is_empty());
        let RawValue::Items(items) = &back[&Tag::new(0x0018, 0x9346)].value else {
            panic!("expected a sequence");
        };
        assert_eq!(back[&Tag::new(0x0018, 0x9346)].vr, Vr::SQ);
        assert!(items[0].contains_key(&Tag::new(0x0010, 0x0010)));
        assert!(!items[0].contains_key(&Tag::new(0x0009, 0x1010)));
    }

    #[test]
    fn test_value_to_element_uses_given_vr() {
        let element = value_to_element(&Value::from("MRN-1"), Vr::LO).unwrap();
        assert_eq!(element, raw_text(Vr::LO, &["MRN-1"]));
        assert!(value_to_element(&Value::from("x"), Vr::US).is_none());
    }

    #[test]
    fn test_sequences_convert_both_ways() {
        let mut item = RawDataset::new();
        item.insert(Tag::new(0x0008, 0x1155), raw_text(Vr::UI, &["1.2.3"]));
        let mut raw = RawDataset::new();
        raw.insert(Tag::new(0x0008, 0x1115), RawElement::sequence(vec![item]));

        let natural = naturalize(&raw);
        let items = natural.get("ReferencedSeriesSequence").and_then(|v| v.as_sequence()).unwrap();
        assert_eq!(items[0].get("ReferencedSOPInstanceUID"), Some(&Value::from("1.2.3")));

        let (back, problems) = denaturalize(&natural);
        assert!(problems.is_empty());
        assert_eq!(back, raw);
    }
}
