//! Date serializer: `{"javaClass": "Date", "time": <epoch-millis>}`.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::{json, Value as JsonValue};

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

/// Class-name discriminator in the date wire shape.
pub const DATE_CLASS: &str = "Date";

pub struct DateSerializer;

impl Serializer for DateSerializer {
    fn name(&self) -> &'static str {
        "date"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Date) && shape == JsonShape::Object
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let time = node.get("time").and_then(JsonValue::as_i64);
        let class = node.get("javaClass").and_then(JsonValue::as_str);
        match (class, time) {
            (Some(DATE_CLASS), Some(_)) => Ok(ObjectMatch::EXACT),
            (None, Some(_)) => Ok(ObjectMatch::COMPATIBLE),
            _ => Err(UnmarshalError::mismatch(target.to_string(), "object")),
        }
    }

    fn unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        let time = node
            .get("time")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| {
                UnmarshalError::bad_value(target.to_string(), "missing numeric time member")
            })?;
        Ok(Value::Date(time))
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        match value {
            Value::Date(millis) => Ok(json!({"javaClass": DATE_CLASS, "time": millis})),
            other => Err(MarshalError::unsupported(other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_date_round_trip() {
        let serializer = DateSerializer;
        let registry = SerializerRegistry::new(
            Default::default(),
            Arc::new(crate::types::TypeRegistry::new()),
        );
        let mut state = SerializerState::new();

        let wire = serializer
            .marshal(&registry, &mut state, &Value::Date(1_234_567))
            .unwrap();
        assert_eq!(wire, json!({"javaClass": "Date", "time": 1234567}));

        let back = serializer
            .unmarshal(&registry, &mut state, &TypeDesc::Date, &wire)
            .unwrap();
        assert_eq!(back, Value::Date(1_234_567));
    }

    #[test]
    fn test_try_scores() {
        let serializer = DateSerializer;
        let registry = SerializerRegistry::new(
            Default::default(),
            Arc::new(crate::types::TypeRegistry::new()),
        );
        let mut state = SerializerState::new();
        assert_eq!(
            serializer
                .try_unmarshal(
                    &registry,
                    &mut state,
                    &TypeDesc::Date,
                    &json!({"javaClass": "Date", "time": 0})
                )
                .unwrap(),
            ObjectMatch::EXACT
        );
        assert_eq!(
            serializer
                .try_unmarshal(&registry, &mut state, &TypeDesc::Date, &json!({"time": 0}))
                .unwrap(),
            ObjectMatch::COMPATIBLE
        );
        assert!(serializer
            .try_unmarshal(&registry, &mut state, &TypeDesc::Date, &json!({"x": 1}))
            .is_err());
    }
}
