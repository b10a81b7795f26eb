//! Type descriptors.
//!
//! Rust has no runtime method enumeration, so registered classes declare
//! their signatures with [`TypeDesc`] values. A descriptor plays the role
//! a class object plays in a reflective runtime: overload resolution
//! scores JSON arguments against it, and the serializer registry picks a
//! codec from it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

/// The declared type of a method parameter or container element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    /// Matches any JSON value; unmarshals to the natural dynamic value.
    Any,
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Milliseconds since the Unix epoch, wrapped in the date wire shape.
    Date,
    /// Raw JSON passed through untouched.
    Raw,
    /// The boxed analog of the inner type: additionally accepts JSON null.
    Nullable(Box<TypeDesc>),
    /// A native array, marshalled as a bare JSON array.
    Array(Box<TypeDesc>),
    List(Box<TypeDesc>),
    Set(Box<TypeDesc>),
    /// A string-keyed map.
    Map(Box<TypeDesc>),
    /// A declared bean class (public-property object).
    Bean(String),
    /// A declared enum class, transmitted by variant name.
    Enum(String),
    /// An exported class whose instances cross the wire as opaque
    /// references.
    Opaque(String),
}

impl TypeDesc {
    pub fn nullable(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Nullable(Box::new(inner))
    }

    pub fn array(element: TypeDesc) -> TypeDesc {
        TypeDesc::Array(Box::new(element))
    }

    pub fn list(element: TypeDesc) -> TypeDesc {
        TypeDesc::List(Box::new(element))
    }

    pub fn set(element: TypeDesc) -> TypeDesc {
        TypeDesc::Set(Box::new(element))
    }

    pub fn map(element: TypeDesc) -> TypeDesc {
        TypeDesc::Map(Box::new(element))
    }

    pub fn bean(name: impl Into<String>) -> TypeDesc {
        TypeDesc::Bean(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> TypeDesc {
        TypeDesc::Enum(name.into())
    }

    pub fn opaque(name: impl Into<String>) -> TypeDesc {
        TypeDesc::Opaque(name.into())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeDesc::Byte
                | TypeDesc::Short
                | TypeDesc::Int
                | TypeDesc::Long
                | TypeDesc::Float
                | TypeDesc::Double
        )
    }

    /// Whether JSON null is an acceptable value. Unboxed primitives reject
    /// it; every reference-like type accepts it.
    pub fn accepts_null(&self) -> bool {
        !matches!(self, TypeDesc::Bool) && !self.is_numeric()
    }

    /// The specificity partial order used by the overload tie-break:
    /// `self` is assignable from `other` when a value of type `other` can
    /// stand wherever `self` is expected.
    pub fn is_assignable_from(&self, other: &TypeDesc) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (TypeDesc::Any, _) => true,
            (TypeDesc::Nullable(inner), TypeDesc::Nullable(other_inner)) => {
                inner.is_assignable_from(other_inner)
            }
            (TypeDesc::Nullable(inner), other) => inner.is_assignable_from(other),
            (TypeDesc::Array(a), TypeDesc::Array(b))
            | (TypeDesc::List(a), TypeDesc::List(b))
            | (TypeDesc::Set(a), TypeDesc::Set(b))
            | (TypeDesc::Map(a), TypeDesc::Map(b)) => a.is_assignable_from(b),
            _ => false,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Any => write!(f, "any"),
            TypeDesc::Bool => write!(f, "bool"),
            TypeDesc::Byte => write!(f, "byte"),
            TypeDesc::Short => write!(f, "short"),
            TypeDesc::Int => write!(f, "int"),
            TypeDesc::Long => write!(f, "long"),
            TypeDesc::Float => write!(f, "float"),
            TypeDesc::Double => write!(f, "double"),
            TypeDesc::String => write!(f, "string"),
            TypeDesc::Date => write!(f, "date"),
            TypeDesc::Raw => write!(f, "raw"),
            TypeDesc::Nullable(inner) => write!(f, "{}?", inner),
            TypeDesc::Array(element) => write!(f, "{}[]", element),
            TypeDesc::List(element) => write!(f, "list<{}>", element),
            TypeDesc::Set(element) => write!(f, "set<{}>", element),
            TypeDesc::Map(element) => write!(f, "map<{}>", element),
            TypeDesc::Bean(name) | TypeDesc::Enum(name) | TypeDesc::Opaque(name) => {
                write!(f, "{}", name)
            }
        }
    }
}

/// The shape class of a JSON node, the unmarshal-side half of codec
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonShape {
    pub fn of(node: &JsonValue) -> Self {
        match node {
            JsonValue::Null => JsonShape::Null,
            JsonValue::Bool(_) => JsonShape::Bool,
            JsonValue::Number(_) => JsonShape::Number,
            JsonValue::String(_) => JsonShape::String,
            JsonValue::Array(_) => JsonShape::Array,
            JsonValue::Object(_) => JsonShape::Object,
        }
    }
}

impl fmt::Display for JsonShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonShape::Null => "null",
            JsonShape::Bool => "boolean",
            JsonShape::Number => "number",
            JsonShape::String => "string",
            JsonShape::Array => "array",
            JsonShape::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// Declared shape of a bean class: the field names and types its codec
/// reads and writes. Stands in for bean-property reflection.
#[derive(Debug, Clone)]
pub struct BeanDescriptor {
    pub name: String,
    pub fields: Vec<(String, TypeDesc)>,
}

impl BeanDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        BeanDescriptor {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    pub fn field_type(&self, name: &str) -> Option<&TypeDesc> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }
}

/// Declared bean and enum shapes, shared between a global bridge and its
/// session bridges.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    beans: RwLock<HashMap<String, Arc<BeanDescriptor>>>,
    enums: RwLock<HashMap<String, Vec<String>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bean(&self, bean: BeanDescriptor) {
        self.beans
            .write()
            .unwrap()
            .insert(bean.name.clone(), Arc::new(bean));
    }

    pub fn bean(&self, name: &str) -> Option<Arc<BeanDescriptor>> {
        self.beans.read().unwrap().get(name).cloned()
    }

    pub fn register_enum(
        &self,
        name: impl Into<String>,
        variants: Vec<String>,
    ) {
        self.enums.write().unwrap().insert(name.into(), variants);
    }

    pub fn enum_variants(&self, name: &str) -> Option<Vec<String>> {
        self.enums.read().unwrap().get(name).cloned()
    }
}
