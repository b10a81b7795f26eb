//! String serializer. JSON numbers coerce to string targets so numeric
//! object keys survive a round trip.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::Value as JsonValue;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn name(&self) -> &'static str {
        "string"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::String(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::String)
            && matches!(shape, JsonShape::String | JsonShape::Number)
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        match node {
            JsonValue::String(_) => Ok(ObjectMatch::EXACT),
            // Weaker than a numeric coercion, so a numeric overload wins
            // numbers and a string overload wins numeric strings.
            JsonValue::Number(_) => Ok(ObjectMatch::new(1)),
            _ => Err(UnmarshalError::mismatch(
                target.to_string(),
                JsonShape::of(node).to_string(),
            )),
        }
    }

    fn unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        match node {
            JsonValue::String(text) => Ok(Value::String(text.clone())),
            JsonValue::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(UnmarshalError::mismatch(
                target.to_string(),
                JsonShape::of(node).to_string(),
            )),
        }
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        match value {
            Value::String(text) => Ok(JsonValue::String(text.clone())),
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
    fn test_string_exact_number_compatible() {
        let serializer = StringSerializer;
        let registry = SerializerRegistry::new(
            Default::default(),
            Arc::new(crate::types::TypeRegistry::new()),
        );
        let mut state = SerializerState::new();
        assert_eq!(
            serializer
                .try_unmarshal(&registry, &mut state, &TypeDesc::String, &json!("hi"))
                .unwrap(),
            ObjectMatch::EXACT
        );
        assert_eq!(
            serializer
                .try_unmarshal(&registry, &mut state, &TypeDesc::String, &json!(12))
                .unwrap(),
            ObjectMatch::new(1)
        );
        assert_eq!(
            serializer
                .unmarshal(&registry, &mut state, &TypeDesc::String, &json!(12))
                .unwrap(),
            Value::string("12")
        );
    }
}
