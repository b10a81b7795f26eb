//! Array serializer: a native array marshals as a bare JSON array,
//! element by element through the generic dispatcher.

use orb_common::protocol::{MarshalError, PathToken, UnmarshalError};
use serde_json::Value as JsonValue;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct ArraySerializer;

impl Serializer for ArraySerializer {
    fn name(&self) -> &'static str {
        "array"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Array(_)) && shape == JsonShape::Array
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let (element_type, items) = parts(target, node)?;
        let mut combined = ObjectMatch::EXACT;
        for (i, item) in items.iter().enumerate() {
            let score = registry
                .try_unmarshal(state, element_type, item)
                .map_err(|e| UnmarshalError::element(i, e))?;
            combined = combined.max(score);
        }
        Ok(combined)
    }

    fn unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        let (element_type, items) = parts(target, node)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let value = registry
                .unmarshal_child(state, &[PathToken::Index(i)], element_type, item)
                .map_err(|e| UnmarshalError::element(i, e))?;
            out.push(value);
        }
        Ok(Value::array(out))
    }

    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let items = match value {
            Value::Array(cell) => cell.read().unwrap().clone(),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let node = registry
                .marshal_child(state, &[PathToken::Index(i)], item)
                .map_err(|e| MarshalError::element(i, e))?;
            out.push(node);
        }
        Ok(JsonValue::Array(out))
    }
}

fn parts<'a>(
    target: &'a TypeDesc,
    node: &'a JsonValue,
) -> Result<(&'a TypeDesc, &'a Vec<JsonValue>), UnmarshalError> {
    match (target, node) {
        (TypeDesc::Array(element_type), JsonValue::Array(items)) => Ok((element_type, items)),
        _ => Err(UnmarshalError::mismatch(
            target.to_string(),
            JsonShape::of(node).to_string(),
        )),
    }
}
