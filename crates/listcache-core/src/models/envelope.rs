//! Response envelope normalization.
//!
//! Collections arrive as `{ "value": [...] }`. Single records arrive either
//! bare or wrapped as `{ "d": {...} }`. Read paths never fail on an
//! unexpected shape: they log a warning and return an empty result.

use serde_json::Value;
use tracing::warn;

use super::Record;

/// Extract the records of a `{ "value": [...] }` envelope.
pub fn collection(body: Value, target: &str) -> Vec<Record> {
    let items = match body {
        Value::Object(mut fields) => match fields.remove("value") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!(endpoint = target, "Unexpected collection envelope, expected {{value: [...]}}");
                return Vec::new();
            }
        },
        _ => {
            warn!(endpoint = target, "Collection response is not a JSON object");
            return Vec::new();
        }
    };

    let total = items.len();
    let records: Vec<Record> = items.into_iter().filter_map(Record::from_value).collect();
    if records.len() != total {
        warn!(
            endpoint = target,
            skipped = total - records.len(),
            "Skipped non-object entries in collection"
        );
    }
    records
}

/// Extract a single record from a bare or `{ "d": {...} }` response.
pub fn item(body: Value, target: &str) -> Record {
    match body {
        Value::Object(mut fields) => match fields.remove("d") {
            Some(Value::Object(inner)) => Record::new(inner),
            Some(other) => {
                // `d` present but not an object: treat the payload as bare.
                fields.insert("d".to_string(), other);
                Record::new(fields)
            }
            None => Record::new(fields),
        },
        _ => {
            warn!(endpoint = target, "Item response is not a JSON object");
            Record::default()
        }
    }
}
