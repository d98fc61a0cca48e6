//! Attribute paths such as `ReferencedSeriesSequence[0].SeriesInstanceUID`.
//!
//! A path is a dot-separated list of keys, each optionally followed by one
//! or more bracketed sequence indices. Evaluation never fails: anything
//! that does not resolve yields `None`.

use std::fmt;

use crate::dataset::{NaturalDataset, Value};

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath {
    segments: Vec<Segment>,
}

impl AttrPath {
    /// Parse a path. Returns `None` for malformed input.
    pub fn parse(path: &str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for part in path.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if key.is_empty() || key.contains(']') {
                return None;
            }
            segments.push(Segment::Key(key.to_string()));
            while !rest.is_empty() {
                let inner = rest.strip_prefix('[')?;
                let close = inner.find(']')?;
                let index = inner[..close].parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &inner[close + 1..];
            }
        }
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First key of the path.
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// The same path with the implicit `[0]` written out wherever a key
    /// steps straight into a sequence, so `A.B` and `A[0].B` compare equal.
    pub fn with_explicit_indices(&self) -> AttrPath {
        let mut segments = Vec::with_capacity(self.segments.len());
        for (i, segment) in self.segments.iter().enumerate() {
            segments.push(segment.clone());
            let steps_into_key = matches!(self.segments.get(i + 1), Some(Segment::Key(_)));
            if matches!(segment, Segment::Key(_)) && steps_into_key {
                segments.push(Segment::Index(0));
            }
        }
        AttrPath { segments }
    }

    /// Rewrite every key with `f`, keeping indices.
    pub fn map_keys(&self, mut f: impl FnMut(&str) -> String) -> AttrPath {
        let segments = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => Segment::Key(f(k)),
                Segment::Index(i) => Segment::Index(*i),
            })
            .collect();
        AttrPath { segments }
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

enum Cursor<'a> {
    Dataset(&'a NaturalDataset),
    Value(&'a Value),
}

/// Resolve a path against a dataset.
///
/// A key applied to a single-item sequence reads from that item.
pub fn get<'a>(dataset: &'a NaturalDataset, path: &AttrPath) -> Option<&'a Value> {
    let mut cursor = Cursor::Dataset(dataset);
    for segment in &path.segments {
        cursor = match (cursor, segment) {
            (Cursor::Dataset(ds), Segment::Key(key)) => Cursor::Value(ds.get(key)?),
            (Cursor::Value(Value::Sequence(items)), Segment::Key(key)) if items.len() == 1 => {
                Cursor::Value(items[0].get(key)?)
            }
            (Cursor::Value(Value::Sequence(items)), Segment::Index(i)) => {
                Cursor::Dataset(items.get(*i)?)
            }
            (Cursor::Value(Value::Multi(values)), Segment::Index(i)) => {
                Cursor::Value(values.get(*i)?)
            }
            _ => return None,
        };
    }
    match cursor {
        Cursor::Value(value) => Some(value),
        Cursor::Dataset(_) => None,
    }
}

/// Write `value` at `path`, creating sequences and padding items as needed.
///
/// Returns `false` when the path runs through a non-sequence value.
pub fn set(dataset: &mut NaturalDataset, path: &AttrPath, value: Value) -> bool {
    set_in(dataset, &path.segments, value)
}

fn set_in(dataset: &mut NaturalDataset, segments: &[Segment], value: Value) -> bool {
    let Some((Segment::Key(key), rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        dataset.insert(key.clone(), value);
        return true;
    }

    let slot = dataset
        .entry(key.clone())
        .or_insert_with(|| Value::Sequence(Vec::new()));
    let Some(items) = slot.as_sequence_mut() else {
        return false;
    };

    match rest.split_first() {
        Some((Segment::Index(i), tail)) => {
            while items.len() <= *i {
                items.push(NaturalDataset::new());
            }
            set_in(&mut items[*i], tail, value)
        }
        Some((Segment::Key(_), _)) => {
            if items.is_empty() {
                items.push(NaturalDataset::new());
            }
            if items.len() != 1 {
                return false;
            }
            set_in(&mut items[0], rest, value)
        }
        None => false,
    }
}

/// Remove the attribute at `path`. Returns the removed value.
pub fn unset(dataset: &mut NaturalDataset, path: &AttrPath) -> Option<Value> {
    unset_in(dataset, &path.segments)
}

fn unset_in(dataset: &mut NaturalDataset, segments: &[Segment]) -> Option<Value> {
    let (Segment::Key(key), rest) = segments.split_first()? else {
        return None;
    };
    if rest.is_empty() {
        return dataset.shift_remove(key);
    }
    let items = dataset.get_mut(key)?.as_sequence_mut()?;
    match rest.split_first()? {
        (Segment::Index(i), tail) => unset_in(items.get_mut(*i)?, tail),
        (Segment::Key(_), _) if items.len() == 1 => unset_in(&mut items[0], rest),
        _ => None,
    }
}
