//! Reference and callable-reference serializer.
//!
//! Instances of classes registered as references never expand on the
//! wire. The serializer assigns (or reuses) an integer handle and emits
//!
//! ```json
//! { "javaClass": "Horse", "objectID": 5, "JSONRPCType": "Reference" }
//! ```
//!
//! with `"CallableReference"` for classes whose handle is itself
//! invocable through the `.obj#N.method` form. Unmarshalling the same
//! shape substitutes the original instance back; an unknown handle is
//! stale and fails the argument.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::bridge::{BridgeTables, ObjectInstance, ObjectKey};
use crate::types::{JsonShape, TypeDesc};
use crate::value::{Exported, Value};

pub const REFERENCE_TYPE: &str = "Reference";
pub const CALLABLE_REFERENCE_TYPE: &str = "CallableReference";

pub struct ReferenceSerializer {
    tables: Arc<Mutex<BridgeTables>>,
    next_handle: Arc<AtomicI64>,
}

impl ReferenceSerializer {
    pub(crate) fn new(tables: Arc<Mutex<BridgeTables>>, next_handle: Arc<AtomicI64>) -> Self {
        ReferenceSerializer {
            tables,
            next_handle,
        }
    }

    /// The exported class name and instance handle of a referenceable
    /// value: an opaque export, or a bean whose class was registered.
    fn class_and_object(value: &Value) -> Option<(String, crate::reflect::Receiver)> {
        match value {
            Value::Opaque(exported) => {
                Some((exported.class.clone(), exported.object.clone()))
            }
            Value::Object(cell) => Some((
                cell.read().unwrap().class.clone(),
                Arc::new(value.clone()) as crate::reflect::Receiver,
            )),
            _ => None,
        }
    }
}

impl Serializer for ReferenceSerializer {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        let Some((class, _)) = Self::class_and_object(value) else {
            return false;
        };
        let tables = self.tables.lock().unwrap();
        tables.reference_classes.contains_key(&class)
            || tables.callable_reference_classes.contains_key(&class)
    }

    fn can_unmarshal(&self, _target: &TypeDesc, shape: JsonShape, node: &JsonValue) -> bool {
        shape == JsonShape::Object
            && matches!(
                node.get("JSONRPCType").and_then(JsonValue::as_str),
                Some(REFERENCE_TYPE) | Some(CALLABLE_REFERENCE_TYPE)
            )
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        if node.get("objectID").and_then(JsonValue::as_i64).is_none() {
            return Err(UnmarshalError::mismatch(target.to_string(), "object"));
        }
        Ok(ObjectMatch::EXACT)
    }

    fn unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        let handle = node
            .get("objectID")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| {
                UnmarshalError::bad_value(target.to_string(), "missing numeric objectID")
            })?;
        let tables = self.tables.lock().unwrap();
        let instance = tables
            .reference_map
            .get(&handle)
            .ok_or(UnmarshalError::StaleHandle(handle))?;
        // A referenced bean comes back as the original value, regaining
        // its cell identity; anything else stays an opaque export.
        if let Some(original) = instance.object.downcast_ref::<Value>() {
            Ok(original.clone())
        } else {
            Ok(Value::Opaque(Exported::new(
                instance.class.name(),
                instance.object.clone(),
            )))
        }
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let (class, object) = Self::class_and_object(value)
            .ok_or_else(|| MarshalError::unsupported(value.type_name()))?;
        let identity = value
            .identity()
            .ok_or_else(|| MarshalError::unsupported(value.type_name()))?;

        let mut tables = self.tables.lock().unwrap();
        let (rpc_type, descriptor) =
            if let Some(descriptor) = tables.callable_reference_classes.get(&class) {
                (CALLABLE_REFERENCE_TYPE, descriptor.clone())
            } else if let Some(descriptor) = tables.reference_classes.get(&class) {
                (REFERENCE_TYPE, descriptor.clone())
            } else {
                return Err(MarshalError::unsupported(value.type_name()));
            };

        let handle = match tables.handle_by_identity.get(&identity) {
            Some(handle) => *handle,
            None => {
                let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
                let instance = ObjectInstance {
                    object,
                    class: descriptor,
                };
                tables.reference_map.insert(handle, instance.clone());
                tables
                    .object_map
                    .insert(ObjectKey::Handle(handle), instance);
                tables.handle_by_identity.insert(identity, handle);
                debug!(class = %class, handle, "issued object handle");
                handle
            }
        };

        Ok(json!({
            "javaClass": class,
            "objectID": handle,
            "JSONRPCType": rpc_type,
        }))
    }
}
