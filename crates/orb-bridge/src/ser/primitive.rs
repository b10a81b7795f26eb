//! Numeric serializer.
//!
//! A JSON number is compatible with every native numeric type: exact when
//! the widths line up, compatible otherwise. A JSON string that parses as
//! the target numeric is also compatible, which lets clients transmit
//! 64-bit values without precision anxiety.

use orb_common::protocol::{MarshalError, UnmarshalError};
use serde_json::{Number, Value as JsonValue};

use super::{ObjectMatch, Serializer, SerializerRegistry, SerializerState};
use crate::types::{JsonShape, TypeDesc};
use crate::value::Value;

pub struct PrimitiveSerializer;

impl PrimitiveSerializer {
    /// Converts and scores in one pass; `try_unmarshal` discards the
    /// value, `unmarshal` discards the score.
    fn convert(
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<(Value, ObjectMatch), UnmarshalError> {
        let mismatch = || {
            UnmarshalError::mismatch(target.to_string(), JsonShape::of(node).to_string())
        };
        match node {
            JsonValue::Number(n) => {
                if let Some(int) = n.as_i64() {
                    Self::from_integer(target, int).ok_or_else(mismatch)
                } else if n.as_u64().is_some() {
                    Err(UnmarshalError::bad_value(
                        target.to_string(),
                        "number out of range",
                    ))
                } else {
                    let float = n.as_f64().unwrap_or(f64::NAN);
                    Self::from_float(target, float).ok_or_else(mismatch)
                }
            }
            JsonValue::String(text) => {
                let value = Self::from_text(target, text).ok_or_else(|| {
                    UnmarshalError::bad_value(
                        target.to_string(),
                        format!("\"{}\" is not a number", text),
                    )
                })?;
                Ok((value, ObjectMatch::COMPATIBLE))
            }
            _ => Err(mismatch()),
        }
    }

    fn from_integer(target: &TypeDesc, int: i64) -> Option<(Value, ObjectMatch)> {
        match target {
            TypeDesc::Long => Some((Value::Long(int), ObjectMatch::EXACT)),
            TypeDesc::Int => narrowed(i32::try_from(int).ok().map(Value::Int)),
            TypeDesc::Short => narrowed(i16::try_from(int).ok().map(Value::Short)),
            TypeDesc::Byte => narrowed(i8::try_from(int).ok().map(Value::Byte)),
            TypeDesc::Float => Some((Value::Float(int as f32), ObjectMatch::COMPATIBLE)),
            TypeDesc::Double => Some((Value::Double(int as f64), ObjectMatch::COMPATIBLE)),
            _ => None,
        }
    }

    fn from_float(target: &TypeDesc, float: f64) -> Option<(Value, ObjectMatch)> {
        match target {
            TypeDesc::Double => Some((Value::Double(float), ObjectMatch::EXACT)),
            TypeDesc::Float => Some((Value::Float(float as f32), ObjectMatch::COMPATIBLE)),
            // A fractional number does not narrow to an integer target.
            _ => None,
        }
    }

    fn from_text(target: &TypeDesc, text: &str) -> Option<Value> {
        match target {
            TypeDesc::Byte => text.parse().ok().map(Value::Byte),
            TypeDesc::Short => text.parse().ok().map(Value::Short),
            TypeDesc::Int => text.parse().ok().map(Value::Int),
            TypeDesc::Long => text.parse().ok().map(Value::Long),
            TypeDesc::Float => text.parse().ok().map(Value::Float),
            TypeDesc::Double => text.parse().ok().map(Value::Double),
            _ => None,
        }
    }
}

/// Narrowing integer conversions are compatible when in range.
fn narrowed(converted: Option<Value>) -> Option<(Value, ObjectMatch)> {
    converted.map(|value| (value, ObjectMatch::COMPATIBLE))
}

impl Serializer for PrimitiveSerializer {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn can_marshal(&self, value: &Value) -> bool {
        matches!(
            value,
            Value::Byte(_)
                | Value::Short(_)
                | Value::Int(_)
                | Value::Long(_)
                | Value::Float(_)
                | Value::Double(_)
        )
    }

    fn can_unmarshal(&self, target: &TypeDesc, shape: JsonShape, _node: &JsonValue) -> bool {
        target.is_numeric() && matches!(shape, JsonShape::Number | JsonShape::String)
    }

    fn try_unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<ObjectMatch, UnmarshalError> {
        Self::convert(target, node).map(|(_, score)| score)
    }

    fn unmarshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        target: &TypeDesc,
        node: &JsonValue,
    ) -> Result<Value, UnmarshalError> {
        Self::convert(target, node).map(|(value, _)| value)
    }

    fn marshal(
        &self,
        _registry: &SerializerRegistry,
        _state: &mut SerializerState,
        value: &Value,
    ) -> Result<JsonValue, MarshalError> {
        let node = match value {
            Value::Byte(n) => JsonValue::from(*n),
            Value::Short(n) => JsonValue::from(*n),
            Value::Int(n) => JsonValue::from(*n),
            Value::Long(n) => JsonValue::from(*n),
            Value::Float(n) => JsonValue::Number(
                Number::from_f64(f64::from(*n)).ok_or_else(|| {
                    MarshalError::bad_value("float", "not a finite number")
                })?,
            ),
            Value::Double(n) => JsonValue::Number(Number::from_f64(*n).ok_or_else(|| {
                MarshalError::bad_value("double", "not a finite number")
            })?),
            other => return Err(MarshalError::unsupported(other.type_name())),
        };
        Ok(node)
    }
}
