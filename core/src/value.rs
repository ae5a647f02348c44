//! Typed values: every value carries its own type tag.

use crate::error::{ConfigError, EvalError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Integer,
    Float,
    Boolean,
    String,
}

impl PropertyType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Whether a value of type `other` may be stored in a slot of this type.
    /// Integer widens into Float; nothing else converts.
    pub fn accepts(&self, other: PropertyType) -> bool {
        *self == other || (*self == Self::Float && other == Self::Integer)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl Value {
    /// Parse a literal, trying Integer, Float, Boolean, then String.
    pub fn parse_literal(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Boolean(false);
        }
        Self::String(text.to_string())
    }

    /// Parse `text` as a value of exactly `ty` (Integer text is accepted
    /// for Float).
    pub fn parse_as(text: &str, ty: PropertyType) -> Option<Self> {
        let trimmed = text.trim();
        match ty {
            PropertyType::Integer => trimmed.parse().ok().map(Self::Integer),
            PropertyType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Self::Float),
            PropertyType::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(Self::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(Self::Boolean(false))
                } else {
                    None
                }
            }
            PropertyType::String => Some(Self::String(text.to_string())),
        }
    }

    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Integer(_) => PropertyType::Integer,
            Self::Float(_) => PropertyType::Float,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::String(_) => PropertyType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view, or `NonNumericOperand` naming the caller.
    pub fn numeric(&self, context: &'static str) -> Result<f64, EvalError> {
        self.as_f64().ok_or(EvalError::NonNumericOperand {
            context,
            actual: self.property_type(),
        })
    }

    /// Convert into a slot of type `ty`, widening Integer to Float.
    pub fn coerce_to(self, ty: PropertyType, context: &'static str) -> Result<Self, EvalError> {
        match (ty, self) {
            (PropertyType::Float, Self::Integer(i)) => Ok(Self::Float(i as f64)),
            (ty, v) if v.property_type() == ty => Ok(v),
            (ty, v) => Err(EvalError::TypeMismatch {
                context,
                expected: ty,
                actual: v.property_type(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            // Keep a fractional part so the text re-parses as a Float.
            Self::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Inclusive numeric bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    low: f64,
    high: f64,
}

impl Range {
    /// Whether at least one integer lies inside the range.
    pub fn holds_integer(&self) -> bool {
        self.low.ceil() <= self.high.floor()
    }

    pub fn new(low: f64, high: f64) -> Result<Self, ConfigError> {
        if !(low <= high) {
            return Err(ConfigError::InvalidRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.low && v <= self.high
    }

    /// Clamp a numeric value into the range, keeping its type.
    /// Integer bounds are rounded inward.
    pub fn clamp(&self, value: Value) -> Value {
        match value {
            Value::Integer(i) => {
                let lo = self.low.ceil() as i64;
                let hi = self.high.floor() as i64;
                Value::Integer(i.clamp(lo, hi.max(lo)))
            }
            Value::Float(f) => Value::Float(f.clamp(self.low, self.high)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_parse_order() {
        assert_eq!(Value::parse_literal("42"), Value::Integer(42));
        assert_eq!(Value::parse_literal("3.5"), Value::Float(3.5));
        assert_eq!(Value::parse_literal("TRUE"), Value::Boolean(true));
        assert_eq!(Value::parse_literal("False"), Value::Boolean(false));
        assert_eq!(Value::parse_literal("hello"), Value::String("hello".into()));
    }

    #[test]
    fn literal_stringify_is_idempotent() {
        for text in ["42", "3.5", "true", "hello"] {
            let once = Value::parse_literal(text);
            let again = Value::parse_literal(&once.to_string());
            assert_eq!(once.to_string(), text);
            assert_eq!(once, again, "round trip changed {text}");
        }
    }

    #[test]
    fn whole_float_keeps_its_type_through_display() {
        let v = Value::Float(3.0);
        assert_eq!(v.to_string(), "3.0");
        assert_eq!(Value::parse_literal(&v.to_string()), v);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            Range::new(5.0, 1.0),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert!(Range::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn integer_free_range() {
        assert!(!Range::new(0.2, 0.8).unwrap().holds_integer());
        assert!(Range::new(0.2, 1.0).unwrap().holds_integer());
        assert!(Range::new(-3.0, -3.0).unwrap().holds_integer());
    }

    #[test]
    fn clamp_keeps_type() {
        let r = Range::new(0.0, 10.0).unwrap();
        assert_eq!(r.clamp(Value::Integer(12)), Value::Integer(10));
        assert_eq!(r.clamp(Value::Integer(-3)), Value::Integer(0));
        assert_eq!(r.clamp(Value::Float(10.5)), Value::Float(10.0));
        assert_eq!(r.clamp(Value::Float(4.2)), Value::Float(4.2));
    }

    #[test]
    fn integer_widens_into_float_only() {
        assert!(PropertyType::Float.accepts(PropertyType::Integer));
        assert!(!PropertyType::Integer.accepts(PropertyType::Float));
        assert!(!PropertyType::String.accepts(PropertyType::Boolean));
        assert_eq!(
            Value::Integer(2).coerce_to(PropertyType::Float, "test"),
            Ok(Value::Float(2.0))
        );
    }
}
