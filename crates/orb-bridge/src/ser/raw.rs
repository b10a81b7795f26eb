//! Raw JSON pass-through serializer.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::Value as JsonValue;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct RawSerializer;

impl Serializer for RawSerializer {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Raw(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, _shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Raw)
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        _target: &TypeDesc,
        _node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        Ok(ObjectMatch::EXACT)
    }

    fn unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        _target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        Ok(Value::Raw(node.clone()))
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        match value {
            Value::Raw(node) => Ok(node.clone()),
            other => Err(MarshalError::unsupported(other.type_name())),
        }
    }
}
