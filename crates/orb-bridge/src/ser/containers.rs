//! Container serializers.
//!
//! Lists, sets, and maps cross the wire wrapped in a discriminated
//! object: `{"javaClass": "<type>", "list"|"set"|"map": <payload>}`. The
//! payload is a JSON array for lists and sets, a string-keyed JSON object
//! for maps. A declared `javaClass` matching the concrete type scores an
//! exact match; any other hint still unmarshals into the default concrete
//! type for the requested interface.

use std::collections::BTreeMap;

use orb_common::protocol::{MarshalError, PathToken, UnmarshalError};
use serde_json::{json, Map, Value as JsonValue};

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub const LIST_CLASS: &str = "List";
pub const SET_CLASS: &str = "Set";
pub const MAP_CLASS: &str = "Map";

fn payload<'a>(
    node: &'a JsonValue,
    member: &str,
    target: &TypeDesc,
) -> Result<&'a JsonValue, UnmarshalError> {
    node.get(member).ok_or_else(|| {
        UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
    })
}

/// Exact when the wire names the concrete class we decode to, compatible
/// for any other resolvable hint.
fn class_hint_score(node: &JsonValue, concrete: &str) -> ObjectMatch {
    match node.get("javaClass").and_then(JsonValue::as_str) {
        Some(name) if name == concrete => ObjectMatch::EXACT,
        _ => ObjectMatch::COMPATIBLE,
    }
}

pub struct ListSerializer;

impl Serializer for ListSerializer {
    fn name(&self) -> &'static str {
        "list"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, node: &JsonValue) -> bool {
        matches!(target, TypeDesc::List(_))
            && shape == JsonShape::Object
            && node.get("list").is_some()
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let TypeDesc::List(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let items = payload(node, "list", target)?
            .as_array()
            .ok_or_else(|| UnmarshalError::mismatch(target.to_string(), "object"))?;
        let mut combined = class_hint_score(node, LIST_CLASS);
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
        let TypeDesc::List(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let items = payload(node, "list", target)?
            .as_array()
            .ok_or_else(|| UnmarshalError::bad_value(target.to_string(), "list member is not an array"))?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let value = registry
                .unmarshal_child(
                    state,
                    &[PathToken::key("list"), PathToken::Index(i)],
                    element_type,
                    item,
                )
                .map_err(|e| UnmarshalError::element(i, e))?;
            out.push(value);
        }
        Ok(Value::list(out))
    }

    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let items = match value {
            Value::List(cell) => cell.read().unwrap().clone(),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let node = registry
                .marshal_child(state, &[PathToken::key("list"), PathToken::Index(i)], item)
                .map_err(|e| MarshalError::element(i, e))?;
            out.push(node);
        }
        Ok(json!({"javaClass": LIST_CLASS, "list": out}))
    }
}

pub struct SetSerializer;

impl Serializer for SetSerializer {
    fn name(&self) -> &'static str {
        "set"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Set(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Set(_))
            && shape == JsonShape::Object
            && node.get("set").is_some()
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let TypeDesc::Set(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let items = payload(node, "set", target)?
            .as_array()
            .ok_or_else(|| UnmarshalError::mismatch(target.to_string(), "object"))?;
        let mut combined = class_hint_score(node, SET_CLASS);
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
        let TypeDesc::Set(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let items = payload(node, "set", target)?
            .as_array()
            .ok_or_else(|| UnmarshalError::bad_value(target.to_string(), "set member is not an array"))?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let value = registry
                .unmarshal_child(
                    state,
                    &[PathToken::key("set"), PathToken::Index(i)],
                    element_type,
                    item,
                )
                .map_err(|e| UnmarshalError::element(i, e))?;
            out.push(value);
        }
        Ok(Value::set(out))
    }

    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let items = match value {
            Value::Set(cell) => cell.read().unwrap().clone(),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let node = registry
                .marshal_child(state, &[PathToken::key("set"), PathToken::Index(i)], item)
                .map_err(|e| MarshalError::element(i, e))?;
            out.push(node);
        }
        Ok(json!({"javaClass": SET_CLASS, "set": out}))
    }
}

pub struct MapSerializer;

impl Serializer for MapSerializer {
    fn name(&self) -> &'static str {
        "map"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Map(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Map(_))
            && shape == JsonShape::Object
            && (node.get("map").is_some() || node.get("javaClass").is_none())
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let TypeDesc::Map(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let (entries, combined) = map_entries(node, target)?;
        let mut combined = combined;
        for (key, item) in entries {
            let score = registry
                .try_unmarshal(state, element_type, item)
                .map_err(|e| UnmarshalError::field(key.clone(), e))?;
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
        let TypeDesc::Map(element_type) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let wrapped = node.get("map").is_some();
        let (entries, _) = map_entries(node, target)?;
        let mut out = BTreeMap::new();
        for (key, item) in entries {
            let tokens: Vec<PathToken> = if wrapped {
                vec![PathToken::key("map"), PathToken::key(key.clone())]
            } else {
                vec![PathToken::key(key.clone())]
            };
            let value = registry
                .unmarshal_child(state, &tokens, element_type, item)
                .map_err(|e| UnmarshalError::field(key.clone(), e))?;
            out.insert(key.clone(), value);
        }
        Ok(Value::map(out))
    }

    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let entries = match value {
            Value::Map(cell) => cell.read().unwrap().clone(),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        let mut out = Map::new();
        for (key, item) in &entries {
            let node = registry
                .marshal_child(
                    state,
                    &[PathToken::key("map"), PathToken::key(key.clone())],
                    item,
                )
                .map_err(|e| MarshalError::field(key.clone(), e))?;
            out.insert(key.clone(), node);
        }
        Ok(json!({"javaClass": MAP_CLASS, "map": out}))
    }
}

/// The entries of a map node, wrapped or bare, with the base score for the
/// wrapping.
fn map_entries<'a>(
    node: &'a JsonValue,
    target: &TypeDesc,
) -> Result<(&'a Map<String, JsonValue>, ObjectMatch), UnmarshalError> {
    if let Some(wrapped) = node.get("map") {
        let entries = wrapped.as_object().ok_or_else(|| {
            UnmarshalError::bad_value(target.to_string(), "map member is not an object")
        })?;
        Ok((entries, class_hint_score(node, MAP_CLASS)))
    } else {
        let entries = node.as_object().ok_or_else(|| {
            UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
        })?;
        // A bare object decodes as a map, one step weaker than the
        // discriminated form.
        Ok((entries, ObjectMatch::COMPATIBLE))
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
    fn test_list_round_trip() {
        let registry = registry();
        let mut state = SerializerState::new();
        let target = TypeDesc::list(TypeDesc::String);
        let node = json!({"javaClass": "List", "list": ["a", "b"]});
        let value = registry
            .unmarshal(
                &mut state,
                vec![PathToken::ident("params"), PathToken::Index(0)],
                &target,
                &node,
            )
            .unwrap();
        assert_eq!(value, Value::list(vec![Value::string("a"), Value::string("b")]));

        let mut out_state = SerializerState::new();
        assert_eq!(registry.marshal(&mut out_state, "result", &value).unwrap(), node);
    }

    #[test]
    fn test_unknown_concrete_class_falls_back() {
        let registry = registry();
        let mut state = SerializerState::new();
        let target = TypeDesc::list(TypeDesc::Int);
        let node = json!({"javaClass": "LinkedList", "list": [1]});
        let value = registry
            .unmarshal(
                &mut state,
                vec![PathToken::ident("params"), PathToken::Index(0)],
                &target,
                &node,
            )
            .unwrap();
        assert_eq!(value, Value::list(vec![Value::Int(1)]));
        let score = registry.try_unmarshal(&mut state, &target, &node).unwrap();
        assert_eq!(score, ObjectMatch::COMPATIBLE);
    }

    #[test]
    fn test_map_round_trip() {
        let registry = registry();
        let mut state = SerializerState::new();
        let target = TypeDesc::map(TypeDesc::Int);
        let node = json!({"javaClass": "Map", "map": {"a": 1, "b": 2}});
        let value = registry
            .unmarshal(
                &mut state,
                vec![PathToken::ident("params"), PathToken::Index(0)],
                &target,
                &node,
            )
            .unwrap();
        let expected = Value::map(BTreeMap::from([
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
        ]));
        assert_eq!(value, expected);

        let mut out_state = SerializerState::new();
        assert_eq!(registry.marshal(&mut out_state, "result", &value).unwrap(), node);
    }

    #[test]
    fn test_bare_object_decodes_as_map() {
        let registry = registry();
        let mut state = SerializerState::new();
        let value = registry
            .unmarshal(
                &mut state,
                vec![PathToken::ident("params"), PathToken::Index(0)],
                &TypeDesc::map(TypeDesc::Any),
                &json!({"x": 1}),
            )
            .unwrap();
        assert_eq!(
            value,
            Value::map(BTreeMap::from([("x".to_string(), Value::Long(1))]))
        );
    }

    #[test]
    fn test_set_round_trip() {
        let registry = registry();
        let mut state = SerializerState::new();
        let node = json!({"javaClass": "Set", "set": [1, 2]});
        let value = registry
            .unmarshal(
                &mut state,
                vec![PathToken::ident("params"), PathToken::Index(0)],
                &TypeDesc::set(TypeDesc::Long),
                &node,
            )
            .unwrap();
        assert_eq!(value, Value::set(vec![Value::Long(1), Value::Long(2)]));
        let mut out_state = SerializerState::new();
        assert_eq!(registry.marshal(&mut out_state, "result", &value).unwrap(), node);
    }
}
