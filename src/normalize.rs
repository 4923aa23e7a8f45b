//! Entity normalization: converts raw store snapshots into the uniform
//! result shape the cache holds.
//!
//! Every produced entity carries an `id` field populated from the remote
//! identifier. Absence of a backing document is represented as `Value::Null`,
//! never as a missing key.

use serde_json::{Map, Value};

use crate::store::{DocSnapshot, QuerySnapshot};

/// Normalize a single-document snapshot.
///
/// Existing document → its field mapping plus `id` (an `id` field already in
/// the payload is overwritten by the document identifier). Absent → `Null`.
pub fn normalize_doc(snapshot: &DocSnapshot) -> Value {
    match &snapshot.data {
        Some(data) => entity(&snapshot.id, data),
        None => Value::Null,
    }
}

/// Normalize a collection snapshot into an ordered entity array.
pub fn normalize_query(snapshot: &QuerySnapshot) -> Value {
    Value::Array(snapshot.docs.iter().map(normalize_doc).collect())
}

fn entity(id: &str, data: &Value) -> Value {
    let mut fields = match data {
        Value::Object(map) => map.clone(),
        // Non-object payloads are wrapped so the id tag can be attached.
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    fields.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(fields)
}
