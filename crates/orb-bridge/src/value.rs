//! The native dynamic value model.
//!
//! Codecs convert between [`Value`] and `serde_json::Value`. Scalars are
//! stored inline; containers, beans, and opaque exports are `Arc`-backed
//! cells so a value graph can alias and cycle, and so the graph tracker
//! can key its identity maps on cell addresses. Cloning a `Value` is
//! shallow: the clone shares the same cells.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use orb_common::protocol::PathToken;
use serde_json::Value as JsonValue;

/// An identity-bearing cell.
pub type Shared<T> = Arc<RwLock<T>>;

/// Address-based identity of a cell, the key of the graph tracker's maps.
pub type ValueId = usize;

/// A native instance exported across the bridge, tagged with the class
/// name it was exported as.
#[derive(Clone)]
pub struct Exported {
    pub class: String,
    pub object: Arc<dyn Any + Send + Sync>,
}

impl Exported {
    pub fn new(class: impl Into<String>, object: Arc<dyn Any + Send + Sync>) -> Self {
        Exported {
            class: class.into(),
            object,
        }
    }
}

impl fmt::Debug for Exported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exported").field("class", &self.class).finish()
    }
}

/// The state of a bean instance: its class name and property values.
#[derive(Debug, Clone, Default)]
pub struct ObjectBody {
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

/// A dynamically typed native value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Raw JSON carried through the codecs untouched.
    Raw(JsonValue),
    Array(Shared<Vec<Value>>),
    List(Shared<Vec<Value>>),
    Set(Shared<Vec<Value>>),
    Map(Shared<BTreeMap<String, Value>>),
    /// A bean instance.
    Object(Shared<ObjectBody>),
    /// An enum constant, transmitted by name.
    Enum { class: String, name: String },
    /// An exported instance marshalled by reference.
    Opaque(Exported),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn set(items: Vec<Value>) -> Value {
        Value::Set(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn object(class: impl Into<String>, fields: BTreeMap<String, Value>) -> Value {
        Value::Object(Arc::new(RwLock::new(ObjectBody {
            class: class.into(),
            fields,
        })))
    }

    pub fn enumeration(class: impl Into<String>, name: impl Into<String>) -> Value {
        Value::Enum {
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn opaque(class: impl Into<String>, object: Arc<dyn Any + Send + Sync>) -> Value {
        Value::Opaque(Exported::new(class, object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The pointer identity of the backing cell, for values that have one.
    /// Scalars and strings are identity-free and never deduplicated.
    pub fn identity(&self) -> Option<ValueId> {
        match self {
            Value::Array(cell) | Value::List(cell) | Value::Set(cell) => {
                Some(Arc::as_ptr(cell) as *const () as ValueId)
            }
            Value::Map(cell) => Some(Arc::as_ptr(cell) as *const () as ValueId),
            Value::Object(cell) => Some(Arc::as_ptr(cell) as *const () as ValueId),
            Value::Opaque(exported) => {
                Some(Arc::as_ptr(&exported.object) as *const () as ValueId)
            }
            _ => None,
        }
    }

    /// Whether both values share the same backing cell.
    pub fn same_cell(a: &Value, b: &Value) -> bool {
        match (a.identity(), b.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Name of the value's runtime type, for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Byte(_) => "byte".into(),
            Value::Short(_) => "short".into(),
            Value::Int(_) => "int".into(),
            Value::Long(_) => "long".into(),
            Value::Float(_) => "float".into(),
            Value::Double(_) => "double".into(),
            Value::String(_) => "string".into(),
            Value::Date(_) => "date".into(),
            Value::Raw(_) => "raw".into(),
            Value::Array(_) => "array".into(),
            Value::List(_) => "list".into(),
            Value::Set(_) => "set".into(),
            Value::Map(_) => "map".into(),
            Value::Object(cell) => cell.read().unwrap().class.clone(),
            Value::Enum { class, .. } => class.clone(),
            Value::Opaque(exported) => format!("opaque {}", exported.class),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(n) => Some(i64::from(*n)),
            Value::Short(n) => Some(i64::from(*n)),
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(f64::from(*n)),
            Value::Double(n) => Some(*n),
            _ => self.as_i64().map(|n| n as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Replaces the child slot named by `token` with `value`, sharing the
    /// assigned cell. Used by the native fixup pass to re-link duplicate
    /// and circular references after unmarshalling. Returns false when the
    /// slot does not exist.
    pub fn assign_child(&self, token: &PathToken, value: Value) -> bool {
        match (self, token) {
            (Value::Array(cell) | Value::List(cell) | Value::Set(cell), PathToken::Index(i)) => {
                let mut items = cell.write().unwrap();
                if *i < items.len() {
                    items[*i] = value;
                    true
                } else {
                    false
                }
            }
            (Value::Map(cell), PathToken::Key(k) | PathToken::Ident(k)) => {
                cell.write().unwrap().insert(k.clone(), value);
                true
            }
            (Value::Object(cell), PathToken::Key(k) | PathToken::Ident(k)) => {
                cell.write().unwrap().fields.insert(k.clone(), value);
                true
            }
            _ => false,
        }
    }
}

/// Deep structural equality. Cells that are the same allocation compare
/// equal without reading; distinct cells compare by content, so this must
/// only be used on acyclic graphs (cyclic graphs are compared by shape
/// with [`Value::same_cell`]).
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if Value::same_cell(self, other) {
            return true;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Array(a), Value::Array(b))
            | (Value::List(a), Value::List(b))
            | (Value::Set(a), Value::Set(b)) => *a.read().unwrap() == *b.read().unwrap(),
            (Value::Map(a), Value::Map(b)) => *a.read().unwrap() == *b.read().unwrap(),
            (Value::Object(a), Value::Object(b)) => {
                let a = a.read().unwrap();
                let b = b.read().unwrap();
                a.class == b.class && a.fields == b.fields
            }
            (
                Value::Enum { class: ac, name: an },
                Value::Enum { class: bc, name: bn },
            ) => ac == bc && an == bn,
            (Value::Opaque(_), Value::Opaque(_)) => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_cells() {
        let original = Value::list(vec![Value::Int(1)]);
        let clone = original.clone();
        assert!(Value::same_cell(&original, &clone));
        assert_eq!(original.identity(), clone.identity());

        let rebuilt = Value::list(vec![Value::Int(1)]);
        assert!(!Value::same_cell(&original, &rebuilt));
        assert_eq!(original, rebuilt);
    }

    #[test]
    fn test_scalars_have_no_identity() {
        assert!(Value::Int(4).identity().is_none());
        assert!(Value::string("x").identity().is_none());
        assert!(Value::Null.identity().is_none());
    }

    #[test]
    fn test_deep_equality() {
        let a = Value::object(
            "Point",
            BTreeMap::from([
                ("x".to_string(), Value::Int(1)),
                ("y".to_string(), Value::Int(2)),
            ]),
        );
        let b = Value::object(
            "Point",
            BTreeMap::from([
                ("x".to_string(), Value::Int(1)),
                ("y".to_string(), Value::Int(2)),
            ]),
        );
        assert_eq!(a, b);

        let c = Value::object("Point", BTreeMap::from([("x".to_string(), Value::Int(9))]));
        assert_ne!(a, c);
        assert_ne!(Value::Int(1), Value::Long(1));
    }

    #[test]
    fn test_assign_child() {
        let list = Value::list(vec![Value::Null, Value::Int(2)]);
        assert!(list.assign_child(&PathToken::Index(0), Value::Int(7)));
        assert!(!list.assign_child(&PathToken::Index(9), Value::Int(7)));
        assert_eq!(list, Value::list(vec![Value::Int(7), Value::Int(2)]));

        let object = Value::object("Node", BTreeMap::new());
        assert!(object.assign_child(&PathToken::key("next"), Value::Int(1)));
        assert!(!object.assign_child(&PathToken::Index(0), Value::Int(1)));
    }

    #[test]
    fn test_cyclic_assignment() {
        let node = Value::object("Node", BTreeMap::new());
        assert!(node.assign_child(&PathToken::key("next"), node.clone()));
        let cell = match &node {
            Value::Object(cell) => cell.clone(),
            _ => unreachable!(),
        };
        let next = cell.read().unwrap().fields.get("next").cloned().expect("next");
        assert!(Value::same_cell(&node, &next));
    }
}
