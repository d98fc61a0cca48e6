//! Reinserting quarantined private elements into the raw dataset.

use tracing::warn;

use crate::codec::dictionary;
use crate::dataset::{RawDataset, RawElement, RawValue, Tag};
use crate::resolve::{AttrPath, Segment};

use super::decision::Quarantine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Tag(Tag),
    Index(usize),
}

/// Translate a keyword path into tag steps.
fn tag_path(path: &str) -> Option<Vec<Step>> {
    let attr = AttrPath::parse(path)?;
    attr.segments()
        .iter()
        .map(|segment| match segment {
            Segment::Key(key) => Tag::parse(key)
                .or_else(|| dictionary::tag_for_name(key))
                .map(Step::Tag),
            Segment::Index(i) => Some(Step::Index(*i)),
        })
        .collect()
}

fn insert_at(ds: &mut RawDataset, steps: &[Step], element: RawElement) -> bool {
    match steps {
        [Step::Tag(tag)] => {
            ds.insert(*tag, element);
            true
        }
        [Step::Tag(tag), Step::Index(i), rest @ ..] if !rest.is_empty() => {
            let sequence = ds.entry(*tag).or_insert_with(|| RawElement::sequence(Vec::new()));
            if sequence.value == RawValue::Empty {
                *sequence = RawElement::sequence(Vec::new());
            }
            let RawValue::Items(items) = &mut sequence.value else {
                return false;
            };
            while items.len() <= *i {
                items.push(RawDataset::new());
            }
            insert_at(&mut items[*i], rest, element)
        }
        _ => false,
    }
}

/// Put every quarantined element back at its tag path, creating the
/// enclosing sequence and padding items when they no longer exist.
///
/// Returns one anomaly per element that could not be placed.
pub fn restore_quarantine(dict: &mut RawDataset, quarantine: &Quarantine) -> Vec<String> {
    let mut anomalies = Vec::new();
    for (path, element) in quarantine {
        let placed = match tag_path(path) {
            Some(steps) => insert_at(dict, &steps, element.clone()),
            None => false,
        };
        if !placed {
            warn!(path = %path, "could not restore quarantined element");
            anomalies.push(format!("Could not restore private element at {}", path));
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Vr;

    fn private() -> RawElement {
        RawElement::new(Vr::LO, RawValue::Strings(vec!["vendor".into()]))
    }

    #[test]
    fn test_tag_path_translation() {
        assert_eq!(
            tag_path("ReferencedSeriesSequence[1].00091010"),
            Some(vec![
                Step::Tag(Tag::new(0x0008, 0x1115)),
                Step::Index(1),
                Step::Tag(Tag::new(0x0009, 0x1010)),
            ])
        );
        assert_eq!(tag_path("NoSuchKeyword"), None);
    }

    #[test]
    fn test_restore_top_level() {
        let mut dict = RawDataset::new();
        let mut q = Quarantine::new();
        q.insert("00291010".into(), private());
        assert!(restore_quarantine(&mut dict, &q).is_empty());
        assert_eq!(dict.get(&Tag::new(0x0029, 0x1010)), Some(&private()));
    }

    #[test]
    fn test_restore_creates_sequence_and_pads() {
        let mut dict = RawDataset::new();
        let mut q = Quarantine::new();
        q.insert("ReferencedSeriesSequence[2].00091010".into(), private());
        assert!(restore_quarantine(&mut dict, &q).is_empty());

        let seq = dict.get(&Tag::new(0x0008, 0x1115)).unwrap();
        match &seq.value {
            RawValue::Items(items) => {
                assert_eq!(items.len(), 3);
                assert!(items[0].is_empty());
                assert_eq!(items[2].get(&Tag::new(0x0009, 0x1010)), Some(&private()));
            }
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_into_existing_item() {
        let mut item = RawDataset::new();
        item.insert(
            Tag::new(0x0008, 0x1155),
            RawElement::new(Vr::UI, RawValue::Strings(vec!["1.2".into()])),
        );
        let mut dict = RawDataset::new();
        dict.insert(Tag::new(0x0008, 0x1115), RawElement::sequence(vec![item]));

        let mut q = Quarantine::new();
        q.insert("ReferencedSeriesSequence[0].00091010".into(), private());
        restore_quarantine(&mut dict, &q);

        match &dict[&Tag::new(0x0008, 0x1115)].value {
            RawValue::Items(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].len(), 2);
            }
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn test_unplaceable_path_is_reported() {
        let mut dict = RawDataset::new();
        dict.insert(
            Tag::new(0x0008, 0x1115),
            RawElement::new(Vr::LO, RawValue::Strings(vec!["not a sequence".into()])),
        );
        let mut q = Quarantine::new();
        q.insert("ReferencedSeriesSequence[0].00091010".into(), private());
        assert_eq!(restore_quarantine(&mut dict, &q).len(), 1);
    }
}
