//! World-level environment variables. Same slot semantics as entity
//! properties; values are fixed for the run unless an action writes them.

use crate::{
    error::{ConfigError, EvalError},
    property::{Property, PropertyDefinition},
    rng::SimRng,
    types::Tick,
    value::Value,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    definitions: BTreeMap<String, PropertyDefinition>,
    overrides: BTreeMap<String, Value>,
    values: BTreeMap<String, Property>,
}

impl Environment {
    pub fn new(definitions: Vec<PropertyDefinition>) -> Result<Self, ConfigError> {
        let mut by_name = BTreeMap::new();
        for def in definitions {
            if by_name.contains_key(&def.name) {
                return Err(ConfigError::DuplicateName {
                    kind: "environment variable",
                    name: def.name,
                });
            }
            by_name.insert(def.name.clone(), def);
        }
        Ok(Self {
            definitions: by_name,
            overrides: BTreeMap::new(),
            values: BTreeMap::new(),
        })
    }

    pub fn definition(&self, name: &str) -> Option<&PropertyDefinition> {
        self.definitions.get(name)
    }

    /// Pin a variable to `value` for the next initialisation. The value must
    /// match the declared type (Integer widens to Float) and range.
    pub fn set_override(&mut self, name: &str, value: Value) -> Result<(), ConfigError> {
        let def = self
            .definitions
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProperty {
                entity: "environment".into(),
                property: name.to_string(),
            })?;
        let invalid = || ConfigError::InvalidValue {
            property: name.to_string(),
            ty: def.ty,
            value: value.to_string(),
        };
        let coerced = value.clone().coerce_to(def.ty, "environment").map_err(|_| invalid())?;
        if let (Some(range), Some(v)) = (def.range, coerced.as_f64()) {
            if !range.contains(v) {
                return Err(invalid());
            }
        }
        self.overrides.insert(name.to_string(), coerced);
        Ok(())
    }

    /// Generate every variable, applying overrides.
    pub fn initialize(&mut self, rng: &mut SimRng, tick: Tick) {
        self.values = self
            .definitions
            .values()
            .map(|def| {
                let mut prop = def.instantiate(rng, tick);
                if let Some(v) = self.overrides.get(&def.name) {
                    prop.seed(v.clone());
                }
                (def.name.clone(), prop)
            })
            .collect();
    }

    pub fn get(&self, name: &str) -> Result<&Property, EvalError> {
        self.values
            .get(name)
            .ok_or_else(|| EvalError::UnknownEnvironmentVariable(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.values.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        generator::ValueGenerator,
        rng::{RngBank, RngSlot},
        value::{PropertyType, Range},
    };

    fn rate_def() -> PropertyDefinition {
        let range = Range::new(0.0, 1.0).unwrap();
        let g = ValueGenerator::random("rate", PropertyType::Float, Some(range)).unwrap();
        PropertyDefinition::new("rate", PropertyType::Float, Some(range), g).unwrap()
    }

    #[test]
    fn override_wins_over_generator() {
        let mut env = Environment::new(vec![rate_def()]).unwrap();
        env.set_override("rate", Value::Float(0.25)).unwrap();
        env.initialize(&mut RngBank::new(1).stream(RngSlot::Generation), 0);
        assert_eq!(env.get("rate").unwrap().value(), &Value::Float(0.25));
    }

    #[test]
    fn override_out_of_range_is_rejected() {
        let mut env = Environment::new(vec![rate_def()]).unwrap();
        let err = env.set_override("rate", Value::Float(3.0)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unknown_variable_is_an_evaluation_error() {
        let mut env = Environment::new(vec![rate_def()]).unwrap();
        env.initialize(&mut RngBank::new(1).stream(RngSlot::Generation), 0);
        assert_eq!(
            env.get("missing").unwrap_err(),
            EvalError::UnknownEnvironmentVariable("missing".into())
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Environment::new(vec![rate_def(), rate_def()]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }
}
