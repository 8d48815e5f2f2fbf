use crate::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// One unit of work handed out by the queue.
///
/// Items are opaque JSON values. A worker must hand the exact same item back
/// in `done`/`error`, so equality is structural. `null` is reserved for the
/// end-of-work sentinel and is never a valid item.
///
/// On the wire an item travels as its canonical JSON text, which keeps the
/// binary framing independent of the value's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem(Value);

impl WorkItem {
    pub fn new(value: Value) -> Result<Self> {
        if value.is_null() {
            return Err(CoreError::NullItem);
        }
        Ok(WorkItem(value))
    }

    /// Parse an item from JSON text
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(serde_json::from_str(text)?)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Value> for WorkItem {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self> {
        WorkItem::new(value)
    }
}

impl From<i64> for WorkItem {
    fn from(value: i64) -> Self {
        WorkItem(Value::from(value))
    }
}

impl From<&str> for WorkItem {
    fn from(value: &str) -> Self {
        WorkItem(Value::from(value))
    }
}

impl From<String> for WorkItem {
    fn from(value: String) -> Self {
        WorkItem(Value::from(value))
    }
}

impl Serialize for WorkItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for WorkItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        WorkItem::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_rejected() {
        assert!(matches!(WorkItem::new(Value::Null), Err(CoreError::NullItem)));
        assert!(matches!(WorkItem::parse("null"), Err(CoreError::NullItem)));
        assert!(matches!(WorkItem::parse("{oops"), Err(CoreError::InvalidJson(_))));
    }

    #[test]
    fn test_structured_item_survives_binary_encoding() {
        let item = WorkItem::new(json!({"path": "/data/shard-7", "retries": [1, 2]})).unwrap();

        let bytes = bincode::serialize(&item).unwrap();
        let decoded: WorkItem = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, item);
        assert_eq!(decoded.value()["path"], "/data/shard-7");
    }

    #[test]
    fn test_display_is_json_text() {
        assert_eq!(WorkItem::from("a").to_string(), "\"a\"");
        assert_eq!(WorkItem::from(5).to_string(), "5");
    }
}
