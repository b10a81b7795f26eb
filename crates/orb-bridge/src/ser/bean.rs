//! Bean serializer.
//!
//! A bean marshals as a JSON object with a `javaClass` discriminator and
//! one member per non-null property. Unmarshalling instantiates the
//! declared class and assigns the properties it knows about; unknown JSON
//! members are ignored, and a resolvable `javaClass` hint may override
//! the statically declared target.

use std::collections::BTreeMap;

use orb_common::protocol::{MarshalError, PathToken, UnmarshalError};
use serde_json::{Map, Value as JsonValue};

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct BeanSerializer;

fn object_members(node: &JsonValue) -> Vec<(&String, &JsonValue)> {
    match node.as_object() {
        Some(map) => map
            .iter()
            .filter(|(key, _)| key.as_str() != "javaClass")
            .collect(),
        None => Vec::new(),
    }
}

/// The class to decode as: the wire hint wins when a bean of that name is
/// declared, otherwise the static target stands.
fn effective_class(registry: &SerializerRegistry, target_name: &str, node: &JsonValue) -> String {
    match node.get("javaClass").and_then(JsonValue::as_str) {
        Some(hint) if hint == target_name || registry.types().bean(hint).is_some() => {
            hint.to_string()
        }
        _ => target_name.to_string(),
    }
}

impl Serializer for BeanSerializer {
    fn name(&self) -> &'static str {
        "bean"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(value, Value::Object(_))
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        matches!(target, TypeDesc::Bean(_)) && shape == JsonShape::Object
    }

    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        let TypeDesc::Bean(target_name) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let class = effective_class(registry, target_name, node);
        let mut combined = if node.get("javaClass").and_then(JsonValue::as_str) == Some(class.as_str()) {
            ObjectMatch::EXACT
        } else {
            ObjectMatch::COMPATIBLE
        };
        if let Some(descriptor) = registry.types().bean(&class) {
            // Members without a declared property weaken the match; known
            // members are scored recursively.
            let mut unknown = 0;
            for (key, member) in object_members(node) {
                match descriptor.field_type(key) {
                    Some(field_type) => {
                        let score = registry
                            .try_unmarshal(state, field_type, member)
                            .map_err(|e| UnmarshalError::field(key.clone(), e))?;
                        combined = combined.max(score);
                    }
                    None => unknown += 1,
                }
            }
            if unknown > 0 {
                combined = combined.max(ObjectMatch::new(unknown));
            }
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
        let TypeDesc::Bean(target_name) = target else {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        };
        let class = effective_class(registry, target_name, node);
        let mut fields = BTreeMap::new();
        match registry.types().bean(&class) {
            Some(descriptor) => {
                for (name, field_type) in &descriptor.fields {
                    let value = match node.get(name) {
                        Some(member) => registry
                            .unmarshal_child(
                                state,
                                &[PathToken::key(name.clone())],
                                field_type,
                                member,
                            )
                            .map_err(|e| UnmarshalError::field(name.clone(), e))?,
                        None => Value::Null,
                    };
                    fields.insert(name.clone(), value);
                }
            }
            None => {
                // No declared shape: take every member dynamically.
                for (key, member) in object_members(node) {
                    let value = registry
                        .unmarshal_child(
                            state,
                            &[PathToken::key(key.clone())],
                            &TypeDesc::Any,
                            member,
                        )
                        .map_err(|e| UnmarshalError::field(key.clone(), e))?;
                    fields.insert(key.clone(), value);
                }
            }
        }
        Ok(Value::object(class, fields))
    }

    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let body = match value {
            Value::Object(cell) => cell.read().unwrap().clone(),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        let mut out = Map::new();
        out.insert("javaClass".to_string(), JsonValue::String(body.class.clone()));
        for (name, member) in &body.fields {
            // Null properties are skipped to keep the wire compact; falsy
            // values are transmitted faithfully.
            if member.is_null() {
                continue;
            }
            let node = registry
                .marshal_child(state, &[PathToken::key(name.clone())], member)
                .map_err(|e| MarshalError::field(name.clone(), e))?;
            out.insert(name.clone(), node);
        }
        Ok(JsonValue::Object(out))
    }
}
