//! The six-slot ISTVON schema.
//!
//! Every slot is always present when serialized (keys `I`, `S`, `T`, `V`, `O`, `N`); an
//! unresolved slot is an empty container, never null.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Slot identifiers, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "I")]
    Instructions,
    #[serde(rename = "S")]
    Sources,
    #[serde(rename = "T")]
    Tools,
    #[serde(rename = "V")]
    Variables,
    #[serde(rename = "O")]
    Outcome,
    #[serde(rename = "N")]
    Notifications,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::Instructions,
        Slot::Sources,
        Slot::Tools,
        Slot::Variables,
        Slot::Outcome,
        Slot::Notifications,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Slot::Instructions => "I",
            Slot::Sources => "S",
            Slot::Tools => "T",
            Slot::Variables => "V",
            Slot::Outcome => "O",
            Slot::Notifications => "N",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Milestone status in the `N` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    /// Asked for in the prompt.
    Requested,
    /// Suggested by a domain template.
    Planned,
}

/// The `O` slot. Keys other than `format` and `success_criteria` (e.g. `delivery`) live in
/// `details` and serialize inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcome {
    pub format: String,
    pub success_criteria: Vec<String>,
    #[serde(flatten)]
    pub details: BTreeMap<String, String>,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        self.format.is_empty() && self.success_criteria.is_empty() && self.details.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IstvonMap {
    #[serde(rename = "I", default)]
    pub instructions: Vec<String>,
    #[serde(rename = "S", default)]
    pub sources: BTreeMap<String, Vec<String>>,
    #[serde(rename = "T", default)]
    pub tools: Vec<String>,
    #[serde(rename = "V", default)]
    pub variables: BTreeMap<String, String>,
    #[serde(rename = "O", default)]
    pub outcome: Outcome,
    #[serde(rename = "N", default)]
    pub notifications: BTreeMap<String, MilestoneStatus>,
}

impl IstvonMap {
    pub fn is_slot_empty(&self, slot: Slot) -> bool {
        match slot {
            Slot::Instructions => self.instructions.is_empty(),
            Slot::Sources => self.sources.values().all(Vec::is_empty),
            Slot::Tools => self.tools.is_empty(),
            Slot::Variables => self.variables.is_empty(),
            Slot::Outcome => self.outcome.is_empty(),
            Slot::Notifications => self.notifications.is_empty(),
        }
    }

    /// Build a map from loosely-typed JSON, such as a model response. Missing or wrongly
    /// typed slots become empty containers; scalar values are stringified where a string is
    /// expected. Never fails.
    pub fn from_value_lenient(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let slot = |key: &str| object.get(key).unwrap_or(&Value::Null);

        Self {
            instructions: string_list(slot("I")),
            sources: slot("S")
                .as_object()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.clone(), string_list(v)))
                        .filter(|(_, v)| !v.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            tools: string_list(slot("T")),
            variables: scalar_map(slot("V")),
            outcome: lenient_outcome(slot("O")),
            notifications: slot("N")
                .as_object()
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| milestone(v).map(|s| (k.clone(), s)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}

fn scalar_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| scalar(v).map(|s| (k.clone(), s)))
                .collect()
        })
        .unwrap_or_default()
}

fn lenient_outcome(value: &Value) -> Outcome {
    let Some(object) = value.as_object() else {
        return Outcome::default();
    };
    Outcome {
        format: object.get("format").and_then(scalar).unwrap_or_default(),
        success_criteria: object
            .get("success_criteria")
            .map(string_list)
            .unwrap_or_default(),
        details: object
            .iter()
            .filter(|(k, _)| k.as_str() != "format" && k.as_str() != "success_criteria")
            .filter_map(|(k, v)| scalar(v).map(|s| (k.clone(), s)))
            .collect(),
    }
}

fn milestone(value: &Value) -> Option<MilestoneStatus> {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("planned") => Some(MilestoneStatus::Planned),
        Value::String(s) if !s.trim().is_empty() => Some(MilestoneStatus::Requested),
        Value::Bool(true) => Some(MilestoneStatus::Requested),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_map_serializes_all_six_slots() {
        let value = serde_json::to_value(IstvonMap::default()).expect("serialize");
        let object = value.as_object().expect("object");
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["I", "N", "O", "S", "T", "V"]);
        assert_eq!(value["O"], json!({"format": "", "success_criteria": []}));
        assert!(object.values().all(|v| !v.is_null()));
    }

    #[test]
    fn outcome_details_flatten() {
        let outcome = Outcome {
            format: "Email".to_string(),
            success_criteria: vec!["Clear".to_string()],
            details: [("delivery".to_string(), "Inline".to_string())].into(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).expect("serialize"),
            json!({"format": "Email", "success_criteria": ["Clear"], "delivery": "Inline"})
        );
    }

    #[test]
    fn lenient_parse_coerces_bad_types() {
        let map = IstvonMap::from_value_lenient(&json!({
            "I": "Write the thing",
            "S": {"urls": ["https://example.com"], "bad": {"nested": true}},
            "T": [1, "Markdown", null],
            "V": {"tone": "formal", "length": 300, "nested": []},
            "O": {"format": ["wrong"], "delivery": "email", "success_criteria": "Clear"},
            "N": {"done": true, "review": "planned", "off": false}
        }));
        assert_eq!(map.instructions, vec!["Write the thing"]);
        assert_eq!(map.sources.len(), 1);
        assert_eq!(map.tools, vec!["1", "Markdown"]);
        assert_eq!(map.variables.get("length").map(String::as_str), Some("300"));
        assert!(!map.variables.contains_key("nested"));
        assert_eq!(map.outcome.format, "");
        assert_eq!(map.outcome.success_criteria, vec!["Clear"]);
        assert_eq!(map.outcome.details.get("delivery").map(String::as_str), Some("email"));
        assert_eq!(map.notifications.get("done"), Some(&MilestoneStatus::Requested));
        assert_eq!(map.notifications.get("review"), Some(&MilestoneStatus::Planned));
        assert!(!map.notifications.contains_key("off"));
    }

    #[test]
    fn lenient_parse_of_non_object_is_empty() {
        assert_eq!(IstvonMap::from_value_lenient(&json!([1, 2])), IstvonMap::default());
        assert_eq!(IstvonMap::from_value_lenient(&json!({})), IstvonMap::default());
    }

    #[test]
    fn strict_parse_accepts_partial_maps() {
        let map: IstvonMap =
            serde_json::from_value(json!({"I": ["Go"], "O": {"format": "Memo"}})).expect("parse");
        assert_eq!(map.outcome.format, "Memo");
        assert!(map.is_slot_empty(Slot::Tools));
        assert!(!map.is_slot_empty(Slot::Outcome));
    }
}
