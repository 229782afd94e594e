//! Runtime values carried by channels, ports and memory words.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;
use weft_ir::Type;

/// A simulated value.
///
/// Bit vectors are limited to 64 bits per leaf; wider payloads are expressed
/// as structs, whose fields are stored in declaration order.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimValue {
    /// An unsigned bit vector.
    Bits(u64),
    /// Struct fields in declaration order.
    Struct(Vec<SimValue>),
}

impl SimValue {
    /// Returns the all-zero value of `ty`.
    pub fn zero(ty: &Type) -> Self {
        match ty {
            Type::Struct(fields) => {
                SimValue::Struct(fields.iter().map(|(_, t)| SimValue::zero(t)).collect())
            }
            _ => SimValue::Bits(0),
        }
    }

    /// Returns the bit vector, or `None` for structs.
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            SimValue::Bits(v) => Some(*v),
            SimValue::Struct(_) => None,
        }
    }

    /// Returns `true` if the value is a bit vector with its lowest bit set.
    pub fn is_true(&self) -> bool {
        matches!(self, SimValue::Bits(v) if v & 1 == 1)
    }

    /// Returns field `index` of a struct.
    pub fn field(&self, index: usize) -> Option<&SimValue> {
        match self {
            SimValue::Struct(fields) => fields.get(index),
            SimValue::Bits(_) => None,
        }
    }

    /// Returns `true` if the value has the shape of `ty` and every bit vector
    /// fits its width.
    pub fn conforms(&self, ty: &Type) -> bool {
        match (self, ty) {
            (SimValue::Bits(v), Type::Bits(w)) => *w >= 64 || v >> w == 0,
            (SimValue::Bits(v), Type::Clock) => *v <= 1,
            (SimValue::Struct(values), Type::Struct(fields)) => {
                values.len() == fields.len()
                    && values.iter().zip(fields).all(|(v, (_, t))| v.conforms(t))
            }
            _ => false,
        }
    }

    /// Parses a value of type `ty` from JSON text.
    ///
    /// Bit vectors are JSON numbers; structs are either arrays in field order
    /// or objects keyed by field name.
    pub fn parse(text: &str, ty: &Type) -> Result<Self, SimError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| SimError::InvalidValue {
                value: text.to_string(),
                ty: ty.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(&json, ty).ok_or_else(|| SimError::InvalidValue {
            value: text.to_string(),
            ty: ty.to_string(),
            reason: "shape or width does not match".to_string(),
        })
    }

    fn from_json(json: &serde_json::Value, ty: &Type) -> Option<Self> {
        let value = match (json, ty) {
            (serde_json::Value::Number(n), Type::Bits(_) | Type::Clock) => {
                SimValue::Bits(n.as_u64()?)
            }
            (serde_json::Value::Bool(b), Type::Bits(1) | Type::Clock) => {
                SimValue::Bits(u64::from(*b))
            }
            (serde_json::Value::Array(items), Type::Struct(fields)) => {
                if items.len() != fields.len() {
                    return None;
                }
                SimValue::Struct(
                    items
                        .iter()
                        .zip(fields)
                        .map(|(item, (_, t))| Self::from_json(item, t))
                        .collect::<Option<_>>()?,
                )
            }
            (serde_json::Value::Object(map), Type::Struct(fields)) => {
                if map.len() != fields.len() {
                    return None;
                }
                SimValue::Struct(
                    fields
                        .iter()
                        .map(|(name, t)| Self::from_json(map.get(name)?, t))
                        .collect::<Option<_>>()?,
                )
            }
            _ => return None,
        };
        value.conforms(ty).then_some(value)
    }
}

impl From<u64> for SimValue {
    fn from(v: u64) -> Self {
        SimValue::Bits(v)
    }
}

impl From<bool> for SimValue {
    fn from(b: bool) -> Self {
        SimValue::Bits(u64::from(b))
    }
}

impl fmt::Display for SimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimValue::Bits(v) => write!(f, "{v}"),
            SimValue::Struct(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> Type {
        Type::struct_of(&[("address", Type::Bits(3)), ("data", Type::Bits(64))])
    }

    #[test]
    fn zero_follows_shape() {
        assert_eq!(SimValue::zero(&Type::Bits(8)), SimValue::Bits(0));
        assert_eq!(
            SimValue::zero(&req()),
            SimValue::Struct(vec![SimValue::Bits(0), SimValue::Bits(0)])
        );
    }

    #[test]
    fn conformance_checks_width() {
        assert!(SimValue::Bits(7).conforms(&Type::Bits(3)));
        assert!(!SimValue::Bits(8).conforms(&Type::Bits(3)));
        assert!(SimValue::Bits(u64::MAX).conforms(&Type::Bits(64)));
        assert!(SimValue::Bits(0).conforms(&Type::Bits(0)));
        assert!(!SimValue::Bits(1).conforms(&Type::Bits(0)));
        assert!(!SimValue::Bits(1).conforms(&req()));
    }

    #[test]
    fn parse_numbers_arrays_and_objects() {
        assert_eq!(
            SimValue::parse("42", &Type::Bits(64)).unwrap(),
            SimValue::Bits(42)
        );
        let expected = SimValue::Struct(vec![SimValue::Bits(5), SimValue::Bits(99)]);
        assert_eq!(SimValue::parse("[5, 99]", &req()).unwrap(), expected);
        assert_eq!(
            SimValue::parse(r#"{"data": 99, "address": 5}"#, &req()).unwrap(),
            expected
        );
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(SimValue::parse("8", &Type::Bits(3)).is_err());
        assert!(SimValue::parse("[1]", &req()).is_err());
        assert!(SimValue::parse("not json", &Type::Bits(3)).is_err());
        assert!(SimValue::parse(r#"{"address": 1, "x": 2}"#, &req()).is_err());
    }

    #[test]
    fn truthiness_and_display() {
        assert!(SimValue::Bits(1).is_true());
        assert!(!SimValue::Bits(2).is_true());
        assert!(!SimValue::Struct(vec![]).is_true());
        assert_eq!(
            SimValue::Struct(vec![SimValue::Bits(5), SimValue::Bits(99)]).to_string(),
            "{5, 99}"
        );
    }
}
