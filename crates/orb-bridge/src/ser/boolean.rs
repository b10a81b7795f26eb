//! Boolean serializer.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::Value as JsonValue;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct BooleanSerializer;

impl Serializer for BooleanSerializer {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Bool(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Bool) && matches!(shape, JsonShape::Bool | JsonShape::String)
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        match node {
            JsonValue::Bool(_) => Ok(ObjectMatch::EXACT),
            JsonValue::String(text)
                if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") =>
            {
                Ok(ObjectMatch::COMPATIBLE)
            }
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
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::String(text) if text.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            JsonValue::String(text) if text.eq_ignore_ascii_case("false") => {
                Ok(Value::Bool(false))
            }
            JsonValue::String(text) => Err(UnmarshalError::bad_value(
                target.to_string(),
                format!("\"{}\" is not a boolean", text),
            )),
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
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            other => Err(MarshalError::unsupported(other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> SerializerRegistry {
        SerializerRegistry::new(Default::default(), Arc::new(crate::types::TypeRegistry::new()))
    }

    #[test]
    fn test_bool_exact_string_compatible() {
        let serializer = BooleanSerializer;
        let registry = registry();
        let mut state = SerializerState::new();
        assert_eq!(
            serializer
                .try_unmarshal(&registry, &mut state, &TypeDesc::Bool, &json!(true))
                .unwrap(),
            ObjectMatch::EXACT
        );
        assert_eq!(
            serializer
                .try_unmarshal(&registry, &mut state, &TypeDesc::Bool, &json!("True"))
                .unwrap(),
            ObjectMatch::COMPATIBLE
        );
        assert!(serializer
            .try_unmarshal(&registry, &mut state, &TypeDesc::Bool, &json!("yes"))
            .is_err());
    }

    #[test]
    fn test_unmarshal_values() {
        let serializer = BooleanSerializer;
        let registry = registry();
        let mut state = SerializerState::new();
        assert_eq!(
            serializer
                .unmarshal(&registry, &mut state, &TypeDesc::Bool, &json!("false"))
                .unwrap(),
            Value::Bool(false)
        );
    }
}
