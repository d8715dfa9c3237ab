use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the item identifier on every list item.
pub const ID_FIELD: &str = "Id";

/// A single list item or user.
///
/// The backend schema is open, so a record is a plain field map. The only
/// field the library relies on is `Id` (plus the configured parent-link
/// field on requirement records).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convert a JSON value into a record. Only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Item identifier, if present and integral.
    pub fn id(&self) -> Option<i64> {
        self.get_i64(ID_FIELD)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Read an integer field. Numeric strings are accepted because lookup
    /// columns come back as strings from some list templates; blank strings
    /// and nulls read as absent.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Display title, falling back to the item id.
    pub fn title(&self) -> String {
        self.get_str("Title")
            .map(str::to_string)
            .or_else(|| self.id().map(|id| format!("#{}", id)))
            .unwrap_or_else(|| "(untitled)".to_string())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}
