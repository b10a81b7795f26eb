//! Enum-by-name serializer. An enum constant crosses the wire as a plain
//! string; the declared variant list validates it on the way in.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::Value as JsonValue;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct EnumSerializer;

impl EnumSerializer {
    fn check(
        registry: &SerializerRegistry,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<(String, String), UnmarshalError> {
        let TypeDesc::Enum(class) = target else {
            return Err(UnmarshalError::mismatch(
                target.to_string(),
                JsonShape::of(node).to_string(),
            ));
        };
        let name = node.as_str().ok_or_else(|| {
            UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
        })?;
        let variants = registry.types().enum_variants(class).ok_or_else(|| {
            UnmarshalError::bad_value(target.to_string(), "enum class is not registered")
        })?;
        if !variants.iter().any(|v| v == name) {
            return Err(UnmarshalError::bad_value(
                target.to_string(),
                format!("\"{}\" is not a variant", name),
            ));
        }
        Ok((class.clone(), name.to_string()))
    }
}

impl Serializer for EnumSerializer {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Enum { .. })
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Enum(_)) && shape == JsonShape::String
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        Self::check(registry, target, node).map(|_| ObjectMatch::EXACT)
    }

    fn unmarshal(
        &self,
        registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        let (class, name) = Self::check(registry, target, node)?;
        Ok(Value::Enum { class, name })
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        match value {
            Value::Enum { name, .. } => Ok(JsonValue::String(name.clone())),
            other => Err(MarshalError::unsupported(other.type_name())),
        }
    }
}
