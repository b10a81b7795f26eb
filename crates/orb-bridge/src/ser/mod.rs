//! The type codec framework.
//!
//! A [`Serializer`] converts between native [`Value`]s and JSON nodes for
//! one family of types. The [`SerializerRegistry`] indexes serializers in
//! both directions and owns the recursive dispatch, including the
//! per-call graph tracking that detects duplicate and circular references
//! during marshalling and re-links them during unmarshalling.
//!
//! Three operations exist per serializer:
//!
//! - `try_unmarshal` - a cheap compatibility check used by overload
//!   resolution; it must not materialize heavyweight values
//! - `unmarshal` - actually construct the native value
//! - `marshal` - produce the JSON node

pub mod array;
pub mod bean;
pub mod boolean;
pub mod containers;
pub mod date;
pub mod enums;
pub mod primitive;
pub mod raw;
pub mod reference;
pub mod state;
pub mod string;

use std::sync::Arc;

use orb_common::protocol::{MarshalError, PathToken, UnmarshalError};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::types::{JsonShape, TypeDesc, TypeRegistry};
use crate::value::Value;

pub use state::SerializerState;

/// Quality of a type-coercion match during overload resolution; lower is
/// better. The `max` of two matches is the worse of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectMatch(i32);

impl ObjectMatch {
    /// The value is exactly the declared type.
    pub const EXACT: ObjectMatch = ObjectMatch(-1);

    /// The value can be coerced to the declared type.
    pub const COMPATIBLE: ObjectMatch = ObjectMatch(0);

    pub fn new(mismatch: i32) -> Self {
        ObjectMatch(mismatch)
    }

    pub fn mismatch(self) -> i32 {
        self.0
    }

    /// The worse of the two matches.
    pub fn max(self, other: ObjectMatch) -> ObjectMatch {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

/// A pluggable type codec.
pub trait Serializer: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this serializer can marshal the given native value.
    fn can_marshal(&self, value: &Value) -> bool;

    /// Whether this serializer can unmarshal a node of `shape` into
    /// `target`. `node` is available for shape probing (wire-format
    /// discriminators like `javaClass`); implementations must not walk it
    /// deeply here.
    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, node: &JsonValue) -> bool;

    /// Scores the compatibility of `node` against `target` without
    /// building the value. Fails with a mismatch when inapplicable.
    fn try_unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError>;

    /// Constructs the native value.
    fn unmarshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError>;

    /// Produces the JSON node for `value`.
    fn marshal(
        &self,
        registry: &SerializerRegistry,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError>;
}

/// Options governing graph marshalling.
#[derive(Debug, Clone, Copy)]
pub struct SerializerOptions {
    /// Emit fixups for circular references instead of failing.
    pub fixup_circ_refs: bool,
    /// Emit fixups for duplicate references instead of expanding copies.
    pub fixup_duplicates: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            fixup_circ_refs: true,
            fixup_duplicates: true,
        }
    }
}

/// The codec registry and recursive dispatcher. Populated at bridge
/// construction and immutable afterwards; reads are lock-free.
pub struct SerializerRegistry {
    serializers: Vec<Arc<dyn Serializer>>,
    options: SerializerOptions,
    types: Arc<TypeRegistry>,
}

impl SerializerRegistry {
    /// Creates a registry with the built-in serializers.
    pub fn new(options: SerializerOptions, types: Arc<TypeRegistry>) -> Self {
        let mut registry = SerializerRegistry {
            serializers: Vec::new(),
            options,
            types,
        };
        registry.register(Arc::new(bean::BeanSerializer));
        registry.register(Arc::new(enums::EnumSerializer));
        registry.register(Arc::new(containers::MapSerializer));
        registry.register(Arc::new(containers::SetSerializer));
        registry.register(Arc::new(containers::ListSerializer));
        registry.register(Arc::new(array::ArraySerializer));
        registry.register(Arc::new(raw::RawSerializer));
        registry.register(Arc::new(date::DateSerializer));
        registry.register(Arc::new(string::StringSerializer));
        registry.register(Arc::new(boolean::BooleanSerializer));
        registry.register(Arc::new(primitive::PrimitiveSerializer));
        registry
    }

    /// Registers a serializer. Serializers registered later take
    /// precedence over earlier ones.
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(0, serializer);
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Marshals a root value. `root` names the envelope field the value
    /// lands in (`result` on responses), which becomes the leading token
    /// of any fixup paths.
    pub fn marshal(
        &self,
        state: &mut SerializerState,
        root: &str,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        state.set_path(vec![PathToken::ident(root)]);
        self.marshal_inner(state, value)
    }

    /// Marshals a child value reached through `tokens` from the current
    /// path. Serializers use this to recurse so fixup paths stay aligned
    /// with the JSON tree they emit.
    pub fn marshal_child(
        &self,
        state: &mut SerializerState,
        tokens: &[PathToken],
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let depth = state.path_len();
        state.extend_path(tokens);
        let result = self.marshal_inner(state, value);
        state.truncate_path(depth);
        result
    }

    fn marshal_inner(
        &self,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        if let Some(id) = value.identity() {
            if let Some(original) = state.first_occurrence(id) {
                let is_circular = state.is_ancestor(id);
                if is_circular && !self.options.fixup_circ_refs {
                    return Err(MarshalError::CircularReference);
                }
                if is_circular || self.options.fixup_duplicates {
                    let kind = if is_circular { "circular" } else { "duplicate" };
                    trace!(kind, "emitting fixup placeholder");
                    let target = state.current_path().to_vec();
                    state.add_fixup(target, original);
                    return Ok(JsonValue::Null);
                }
                // Duplicate fixups disabled: fall through and expand a copy.
            } else {
                state.record_first_occurrence(id);
            }
            state.push_ancestor(id);
            let result = self.marshal_with_serializer(state, value);
            state.pop_ancestor();
            result
        } else {
            self.marshal_with_serializer(state, value)
        }
    }

    fn marshal_with_serializer(
        &self,
        state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }
        let serializer = self
            .serializers
            .iter()
            .find(|s| s.can_marshal(value))
            .ok_or_else(|| MarshalError::unsupported(value.type_name()))?;
        serializer.marshal(self, state, value)
    }

    /// Unmarshals a root node whose position in the envelope is `path`
    /// (for an argument, `params` plus its index). The path anchors the
    /// identity records consumed by the native fixup pass.
    pub fn unmarshal(
        &self,
        state: &mut SerializerState,
        path: Vec<PathToken>,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        state.set_path(path);
        self.unmarshal_inner(state, target, node)
    }

    /// Unmarshals a child node reached through `tokens` from the current
    /// path.
    pub fn unmarshal_child(
        &self,
        state: &mut SerializerState,
        tokens: &[PathToken],
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        let depth = state.path_len();
        state.extend_path(tokens);
        let result = self.unmarshal_inner(state, target, node);
        state.truncate_path(depth);
        result
    }

    fn unmarshal_inner(
        &self,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        if node.is_null() {
            return if target.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(UnmarshalError::mismatch(target.to_string(), "null"))
            };
        }
        let resolved = self.resolve_target(target, node);
        let serializer = self.find_unmarshal(&resolved, node).ok_or_else(|| {
            UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
        })?;
        let value = serializer.unmarshal(self, state, &resolved, node)?;
        if value.identity().is_some() {
            state.record_unmarshalled(value.clone());
            if let Some(member) = wire_wrapper(&value) {
                state.record_unmarshalled_below(PathToken::key(member), value.clone());
            }
        }
        Ok(value)
    }

    /// Scores `node` against `target` the way `unmarshal` would convert
    /// it. Coercion through `Any` is never better than compatible.
    pub fn try_unmarshal(
        &self,
        state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        if node.is_null() {
            return if target.accepts_null() {
                Ok(ObjectMatch::COMPATIBLE)
            } else {
                Err(UnmarshalError::mismatch(target.to_string(), "null"))
            };
        }
        let resolved = self.resolve_target(target, node);
        let serializer = self.find_unmarshal(&resolved, node).ok_or_else(|| {
            UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
        })?;
        let score = serializer.try_unmarshal(self, state, &resolved, node)?;
        if matches!(target, TypeDesc::Any) {
            Ok(score.max(ObjectMatch::COMPATIBLE))
        } else {
            Ok(score)
        }
    }

    fn find_unmarshal(&self, target: &TypeDesc, node: &JsonValue) -> Option<&Arc<dyn Serializer>> {
        let shape = JsonShape::of(node);
        self.serializers
            .iter()
            .find(|s| s.can_unmarshal(target, shape, node))
    }

    /// Rewrites the declared target into the concrete type the node will
    /// be decoded as: `Nullable` unwraps (null was handled by the caller)
    /// and `Any` picks the natural dynamic type for the node's shape.
    fn resolve_target(&self, target: &TypeDesc, node: &JsonValue) -> TypeDesc {
        match target {
            TypeDesc::Nullable(inner) => self.resolve_target(inner, node),
            TypeDesc::Any => self.resolve_any(node),
            other => other.clone(),
        }
    }

    fn resolve_any(&self, node: &JsonValue) -> TypeDesc {
        match node {
            JsonValue::Null => TypeDesc::Any,
            JsonValue::Bool(_) => TypeDesc::Bool,
            JsonValue::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    TypeDesc::Long
                } else {
                    TypeDesc::Double
                }
            }
            JsonValue::String(_) => TypeDesc::String,
            JsonValue::Array(_) => TypeDesc::array(TypeDesc::Any),
            JsonValue::Object(map) => {
                if map.contains_key("JSONRPCType") {
                    // The reference serializer claims these by node shape.
                    return TypeDesc::Any;
                }
                let hint = map.get("javaClass").and_then(JsonValue::as_str);
                match hint {
                    Some("Date") => TypeDesc::Date,
                    Some(_) if map.contains_key("list") => TypeDesc::list(TypeDesc::Any),
                    Some(_) if map.contains_key("set") => TypeDesc::set(TypeDesc::Any),
                    Some(_) if map.contains_key("map") => TypeDesc::map(TypeDesc::Any),
                    Some(name) => TypeDesc::bean(name),
                    None => TypeDesc::map(TypeDesc::Any),
                }
            }
        }
    }
}

/// The payload member a value's wire form nests its children under, for
/// container shapes that wrap their payload in a discriminated object.
fn wire_wrapper(value: &Value) -> Option<&'static str> {
    match value {
        Value::List(_) => Some("list"),
        Value::Set(_) => Some("set"),
        Value::Map(_) => Some("map"),
        _ => None,
    }
}
