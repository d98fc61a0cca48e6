//! Mapping decisions and the quarantine table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::{RawElement, Value};

/// What happens to one attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingOperation {
    Keep,
    Replace,
    Delete,
    /// An operation this version does not know; skipped when applied.
    #[serde(other)]
    Unknown,
}

/// One entry of the mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDecision {
    pub operation: MappingOperation,
    /// Value before mapping, if the attribute existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
    /// Value after mapping; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl MappingDecision {
    pub fn replace(previous: Option<Value>, value: Value) -> Self {
        Self {
            operation: MappingOperation::Replace,
            previous,
            value: Some(value),
        }
    }

    pub fn delete(previous: Option<Value>) -> Self {
        Self {
            operation: MappingOperation::Delete,
            previous,
            value: None,
        }
    }
}

/// Decisions keyed by attribute path, in decision order.
pub type MappingTable = IndexMap<String, MappingDecision>;

/// Private elements set aside during mapping, keyed by keyword path
/// (for example `ReferencedSeriesSequence[0].00091010`).
pub type Quarantine = IndexMap<String, RawElement>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serde() {
        assert_eq!(serde_json::to_string(&MappingOperation::Replace).unwrap(), "\"replace\"");
        let op: MappingOperation = serde_json::from_str("\"rename\"").unwrap();
        assert_eq!(op, MappingOperation::Unknown);
    }

    #[test]
    fn test_decision_json_shape() {
        let d = MappingDecision::replace(Some(Value::from("a")), Value::from("b"));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json, serde_json::json!({"operation": "replace", "previous": "a", "value": "b"}));
    }
}
