//! Canonical record model.
//!
//! A [`Record`] maps field names to typed values with insertion order
//! preserved, so serialization and content hashing are deterministic.
//! Empty and null values are rejected at insertion time rather than stored.

pub mod coerce;
pub mod key;
pub mod normalize;

use serde::Serialize;
use serde_json::{Map, Value};

/// A normalized record: ordered field name to typed value mapping.
///
/// Fields whose value is null or the empty string are dropped on insert;
/// zero, false, and whitespace-only strings are data and are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, dropping null and empty-string values.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        match &value {
            Value::Null => {}
            Value::String(s) if s.is_empty() => {}
            _ => {
                self.fields.insert(name.into(), value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Serialize to a single JSON line.
    ///
    /// Field order is insertion order, so identical records always produce
    /// identical lines.
    pub fn to_line(&self) -> String {
        // A map of JSON primitives cannot fail to serialize.
        serde_json::to_string(&self.fields).unwrap_or_default()
    }

    /// String form of each value in insertion order, for content hashing.
    ///
    /// Strings are used verbatim; other primitives use their JSON form.
    pub fn value_strings(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.values().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_drops_null_and_empty() {
        let mut record = Record::new();
        record.insert("a", json!("x"));
        record.insert("b", Value::Null);
        record.insert("c", json!(""));
        record.insert("d", json!(0));
        record.insert("e", json!(false));

        assert_eq!(record.len(), 3);
        assert!(record.get("b").is_none());
        assert!(record.get("c").is_none());
        assert_eq!(record.get("d"), Some(&json!(0)));
        assert_eq!(record.get("e"), Some(&json!(false)));
    }

    #[test]
    fn test_to_line_preserves_insertion_order() {
        let mut record = Record::new();
        record.insert("z", json!(1));
        record.insert("a", json!(2));
        assert_eq!(record.to_line(), r#"{"z":1,"a":2}"#);
    }
}
