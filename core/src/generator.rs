//! Value generators: where every property's initial value comes from.

use crate::{
    error::ConfigError,
    rng::SimRng,
    value::{PropertyType, Range, Value},
};
use serde::{Deserialize, Serialize};

/// Upper bound on the length of randomly generated string values.
pub const RANDOM_STRING_MAX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Fixed,
    Random,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueGenerator {
    Fixed(Value),
    Random { ty: PropertyType, range: Option<Range> },
}

impl ValueGenerator {
    /// A fixed generator. The value must fit the declared type and range.
    pub fn fixed(
        property: &str,
        ty: PropertyType,
        range: Option<Range>,
        value: Value,
    ) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            property: property.to_string(),
            ty,
            value: value.to_string(),
        };
        let value = value.clone().coerce_to(ty, "fixed value").map_err(|_| invalid())?;
        if let (Some(r), Some(v)) = (range, value.as_f64()) {
            if !r.contains(v) {
                return Err(invalid());
            }
        }
        Ok(Self::Fixed(value))
    }

    /// A random generator. Numeric types draw from their range, so one is
    /// required.
    pub fn random(
        property: &str,
        ty: PropertyType,
        range: Option<Range>,
    ) -> Result<Self, ConfigError> {
        if ty.is_numeric() && range.is_none() {
            return Err(ConfigError::RandomWithoutRange {
                property: property.to_string(),
                ty,
            });
        }
        Ok(Self::Random { ty, range })
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            Self::Fixed(_) => GenerationMode::Fixed,
            Self::Random { .. } => GenerationMode::Random,
        }
    }

    pub fn generate(&self, rng: &mut SimRng) -> Value {
        match self {
            Self::Fixed(v) => v.clone(),
            Self::Random { ty, range } => match (ty, range) {
                (PropertyType::Integer, Some(r)) => {
                    let lo = r.low().ceil() as i64;
                    let hi = (r.high().floor() as i64).max(lo);
                    Value::Integer(rng.int_inclusive(lo, hi))
                }
                (PropertyType::Float, Some(r)) => {
                    Value::Float(rng.float_inclusive(r.low(), r.high()))
                }
                (PropertyType::Boolean, _) => Value::Boolean(rng.chance(0.5)),
                (PropertyType::String, _) => Value::String(rng.token(RANDOM_STRING_MAX_LEN)),
                // Construction rejects numeric generators without a range.
                (PropertyType::Integer, None) => Value::Integer(0),
                (PropertyType::Float, None) => Value::Float(0.0),
            },
        }
    }
}
