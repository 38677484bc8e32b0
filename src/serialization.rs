//! Cycle-tolerant JSON serialization for analysis results
//!
//! Analyzer output can contain reference markers: objects tagged with `"$id"`
//! and back-references of the form `{"$ref": <id>}`. A back-reference to an
//! object that is currently being written (an ancestor, or the object itself)
//! is a cycle. Such references are elided: the member is dropped from its
//! object, or the element is skipped in its array. References to objects that
//! are not ancestors are shared references and are written verbatim.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

pub const ID_KEY: &str = "$id";
pub const REF_KEY: &str = "$ref";

/// Serializes a JSON value while skipping self-references
pub struct Acyclic<'a> {
    value: &'a Value,
    parent: Option<&'a Acyclic<'a>>,
}

impl<'a> Acyclic<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self {
            value,
            parent: None,
        }
    }

    fn id(&self) -> Option<&'a Value> {
        self.value.as_object()?.get(ID_KEY)
    }

    /// True when `reference` names this node or one of its ancestors
    fn on_path(&self, reference: &Value) -> bool {
        let mut node = Some(self);
        while let Some(current) = node {
            if current.id() == Some(reference) {
                return true;
            }
            node = current.parent;
        }
        false
    }

    fn is_cycle(&self, child: &Value) -> bool {
        child
            .as_object()
            .and_then(|o| o.get(REF_KEY))
            .is_some_and(|reference| self.on_path(reference))
    }
}

impl Serialize for Acyclic<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Object(map) => {
                let mut out = serializer.serialize_map(None)?;
                for (key, child) in map {
                    if self.is_cycle(child) {
                        continue;
                    }
                    out.serialize_entry(
                        key,
                        &Acyclic {
                            value: child,
                            parent: Some(self),
                        },
                    )?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(None)?;
                for child in items {
                    if self.is_cycle(child) {
                        continue;
                    }
                    out.serialize_element(&Acyclic {
                        value: child,
                        parent: Some(self),
                    })?;
                }
                out.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}

/// Serialize `value` to a JSON string with self-references elided
pub fn to_acyclic_string(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&Acyclic::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: &Value) -> Value {
        serde_json::from_str(&to_acyclic_string(value).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_values_unchanged() {
        let value = json!({"a": [1, 2, {"b": null}], "c": "text"});
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_self_reference_member_elided() {
        let value = json!({"$id": "1", "name": "root", "self": {"$ref": "1"}});
        assert_eq!(roundtrip(&value), json!({"$id": "1", "name": "root"}));
    }

    #[test]
    fn test_ancestor_reference_in_array_elided() {
        let value = json!({
            "$id": "1",
            "threads": [
                {"$id": "2", "owner": {"$ref": "1"}, "me": {"$ref": "2"}},
                {"$ref": "1"}
            ]
        });
        assert_eq!(
            roundtrip(&value),
            json!({"$id": "1", "threads": [{"$id": "2"}]})
        );
    }

    #[test]
    fn test_shared_reference_kept() {
        let value = json!({
            "modules": [{"$id": "7", "name": "ntdll"}],
            "faulting": {"$ref": "7"}
        });
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_numeric_ids() {
        let value = json!({"$id": 3, "loop": {"$ref": 3}, "keep": {"$ref": "3"}});
        assert_eq!(roundtrip(&value), json!({"$id": 3, "keep": {"$ref": "3"}}));
    }
}
