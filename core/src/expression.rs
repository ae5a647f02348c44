//! The expression language: literals, property references and a fixed set
//! of helper functions.
//!
//! Grammar (one call deep, except `percent`, whose two arguments are full
//! expressions):
//!
//!   environment(name)
//!   random(max)
//!   evaluate(Entity.property)
//!   percent(whole, percent)
//!   ticks(Entity.property)
//!   property | Entity.property | secondary.property
//!   literal            -- Integer, Float, Boolean, then String
//!
//! Entity references resolve to a binding slot at compile time. `Entity`
//! names the main entity first, then the secondary. `secondary` always
//! names the secondary slot, which is the only way to reach it when both
//! share a type.

use crate::{
    entity::EntityInstance,
    environment::Environment,
    error::{ConfigError, EvalError},
    population::PopulationStore,
    property::Property,
    rng::SimRng,
    types::Tick,
    value::{PropertyType, Value},
};
use std::fmt;

/// The qualifier that always addresses the secondary slot.
pub const SECONDARY: &str = "secondary";

/// Which bound entity a reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Main,
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Property {
        slot: Slot,
        entity: String,
        property: String,
        ty: PropertyType,
    },
    Environment(String),
    Random(i64),
    Evaluate {
        entity: String,
        property: String,
        ty: PropertyType,
    },
    Percent(Box<Expression>, Box<Expression>),
    Ticks {
        slot: Slot,
        entity: String,
        property: String,
    },
}

/// Names visible to an expression while it is being compiled.
#[derive(Clone, Copy)]
pub struct ParseScope<'a> {
    pub population: &'a PopulationStore,
    pub environment: &'a Environment,
    pub main: &'a str,
    pub secondary: Option<&'a str>,
    /// The slot of the enclosing binding this scope is centred on.
    pub on: Slot,
}

impl<'a> ParseScope<'a> {
    pub fn new(population: &'a PopulationStore, environment: &'a Environment, main: &'a str) -> Self {
        Self {
            population,
            environment,
            main,
            secondary: None,
            on: Slot::Main,
        }
    }

    /// The same scope with a different main entity type (secondary filters
    /// are compiled against their own target type).
    pub fn with_main(&self, main: &'a str) -> Self {
        Self::new(self.population, self.environment, main)
    }

    /// This scope as the root of its own binding.
    pub fn rooted(&self) -> Self {
        Self {
            on: Slot::Main,
            ..*self
        }
    }

    /// Re-centre the scope on `entity`: the main type, the secondary type or
    /// `secondary`. The other bound entity becomes the secondary.
    pub fn focus(&self, entity: &str) -> Result<Self, ConfigError> {
        match self.resolve(entity) {
            Some((Slot::Main, _)) => Ok(self.rooted()),
            Some((Slot::Secondary, secondary)) => Ok(Self {
                main: secondary,
                secondary: Some(self.main),
                on: Slot::Secondary,
                ..*self
            }),
            None => Err(ConfigError::UnreachableEntity {
                main: self.main.to_string(),
                nested: entity.to_string(),
            }),
        }
    }

    /// The slot and entity type `entity` refers to, if it is bound.
    pub fn resolve(&self, entity: &str) -> Option<(Slot, &'a str)> {
        if entity == self.main {
            return Some((Slot::Main, self.main));
        }
        let secondary = self.secondary?;
        (entity == secondary || entity == SECONDARY).then_some((Slot::Secondary, secondary))
    }

    fn property_type(&self, entity: &str, property: &str) -> Result<PropertyType, ConfigError> {
        let def = self
            .population
            .definition(entity)
            .ok_or_else(|| ConfigError::UnknownEntityType(entity.to_string()))?;
        def.property(property)
            .map(|p| p.ty)
            .ok_or_else(|| ConfigError::UnknownProperty {
                entity: entity.to_string(),
                property: property.to_string(),
            })
    }
}

/// Everything an expression may read while it is evaluated.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub population: &'a PopulationStore,
    pub environment: &'a Environment,
    pub main: &'a EntityInstance,
    pub secondary: Option<&'a EntityInstance>,
    pub tick: Tick,
}

impl<'a> EvalContext<'a> {
    pub fn instance(&self, slot: Slot) -> Result<&'a EntityInstance, EvalError> {
        match slot {
            Slot::Main => Ok(self.main),
            Slot::Secondary => self
                .secondary
                .ok_or_else(|| EvalError::MissingSecondaryEntity(self.main.type_name.clone())),
        }
    }

    pub fn property(&self, slot: Slot, property: &str) -> Result<&'a Property, EvalError> {
        let instance = self.instance(slot)?;
        instance
            .property(property)
            .ok_or_else(|| EvalError::UnknownProperty {
                entity: instance.type_name.clone(),
                property: property.to_string(),
            })
    }

    /// The same context seen from `slot`: focusing the secondary swaps it
    /// with the main entity.
    pub fn focused(&self, slot: Slot) -> Result<Self, EvalError> {
        match slot {
            Slot::Main => Ok(*self),
            Slot::Secondary => Ok(Self {
                main: self.instance(Slot::Secondary)?,
                secondary: Some(self.main),
                ..*self
            }),
        }
    }
}

impl Expression {
    pub fn parse(text: &str, scope: &ParseScope<'_>) -> Result<Self, ConfigError> {
        let trimmed = text.trim();
        let malformed = |reason: &str| ConfigError::MalformedExpression {
            expr: trimmed.to_string(),
            reason: reason.to_string(),
        };

        if let Some((name, arg)) = split_call(trimmed) {
            match name {
                "environment" => {
                    if !is_identifier(arg) {
                        return Err(malformed("expected a variable name"));
                    }
                    return Ok(Self::Environment(arg.to_string()));
                }
                "random" => {
                    let max: i64 = arg
                        .parse()
                        .map_err(|_| malformed("expected an integer bound"))?;
                    if max < 0 {
                        return Err(malformed("bound must be non-negative"));
                    }
                    return Ok(Self::Random(max));
                }
                "evaluate" => {
                    let (entity, property) =
                        split_pair(arg).ok_or_else(|| malformed("expected entity.property"))?;
                    let entity = scope.resolve(entity).map_or(entity, |(_, ty)| ty);
                    let ty = scope.property_type(entity, property)?;
                    return Ok(Self::Evaluate {
                        entity: entity.to_string(),
                        property: property.to_string(),
                        ty,
                    });
                }
                "ticks" => {
                    let (entity, property) =
                        split_pair(arg).ok_or_else(|| malformed("expected entity.property"))?;
                    let Some((slot, entity)) = scope.resolve(entity) else {
                        return Err(malformed("entity is neither the main nor the secondary entity"));
                    };
                    scope.property_type(entity, property)?;
                    return Ok(Self::Ticks {
                        slot,
                        entity: entity.to_string(),
                        property: property.to_string(),
                    });
                }
                "percent" => {
                    let args = split_args(arg);
                    let [whole, pct] = args.as_slice() else {
                        return Err(malformed("percent takes two arguments"));
                    };
                    let whole = Self::parse(whole, scope)?;
                    let pct = Self::parse(pct, scope)?;
                    for operand in [&whole, &pct] {
                        if let Some(ty) = operand.static_type(scope) {
                            if !ty.is_numeric() {
                                return Err(ConfigError::TypeMismatch {
                                    context: format!("percent({arg})"),
                                    expected: PropertyType::Float,
                                    actual: ty,
                                });
                            }
                        }
                    }
                    return Ok(Self::Percent(Box::new(whole), Box::new(pct)));
                }
                _ => {}
            }
        }

        if let Ok(ty) = scope.property_type(scope.main, trimmed) {
            return Ok(Self::Property {
                slot: Slot::Main,
                entity: scope.main.to_string(),
                property: trimmed.to_string(),
                ty,
            });
        }
        if let Some((entity, property)) = split_pair(trimmed) {
            if let Some((slot, entity)) = scope.resolve(entity) {
                let ty = scope.property_type(entity, property)?;
                return Ok(Self::Property {
                    slot,
                    entity: entity.to_string(),
                    property: property.to_string(),
                    ty,
                });
            }
        }
        Ok(Self::Literal(Value::parse_literal(trimmed)))
    }

    /// The result type when it is known before any evaluation.
    pub fn static_type(&self, scope: &ParseScope<'_>) -> Option<PropertyType> {
        match self {
            Self::Literal(v) => Some(v.property_type()),
            Self::Property { ty, .. } | Self::Evaluate { ty, .. } => Some(*ty),
            Self::Environment(name) => scope.environment.definition(name).map(|d| d.ty),
            Self::Random(_) | Self::Ticks { .. } => Some(PropertyType::Integer),
            Self::Percent(..) => Some(PropertyType::Float),
        }
    }

    /// Produce a value. Reads only; the rng is the sole thing advanced.
    pub fn evaluate(&self, ctx: &EvalContext<'_>, rng: &mut SimRng) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Property { slot, property, .. } => Ok(ctx.property(*slot, property)?.value().clone()),
            Self::Environment(name) => Ok(ctx.environment.get(name)?.value().clone()),
            Self::Random(max) => Ok(Value::Integer(rng.int_inclusive(0, *max))),
            Self::Evaluate {
                entity, property, ..
            } => {
                let def = ctx
                    .population
                    .definition(entity)
                    .and_then(|d| d.property(property))
                    .ok_or_else(|| EvalError::UnknownProperty {
                        entity: entity.clone(),
                        property: property.clone(),
                    })?;
                Ok(def.template_value(rng))
            }
            Self::Percent(whole, pct) => {
                let whole = numeric_for_percent(whole.evaluate(ctx, rng)?)?;
                let pct = numeric_for_percent(pct.evaluate(ctx, rng)?)?;
                Ok(Value::Float(whole * pct / 100.0))
            }
            Self::Ticks { slot, property, .. } => {
                let since = ctx.property(*slot, property)?.ticks_since_change(ctx.tick);
                Ok(Value::Integer(i64::try_from(since).unwrap_or(i64::MAX)))
            }
        }
    }
}

fn numeric_for_percent(v: Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or(EvalError::TypeMismatch {
        context: "percent",
        expected: PropertyType::Float,
        actual: v.property_type(),
    })
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Property {
                entity, property, ..
            } => write!(f, "{entity}.{property}"),
            Self::Environment(name) => write!(f, "environment({name})"),
            Self::Random(max) => write!(f, "random({max})"),
            Self::Evaluate {
                entity, property, ..
            } => write!(f, "evaluate({entity}.{property})"),
            Self::Percent(a, b) => write!(f, "percent({a},{b})"),
            Self::Ticks {
                entity, property, ..
            } => write!(f, "ticks({entity}.{property})"),
        }
    }
}

/// `name(args)` → (name, args). Only the outermost parentheses count.
fn split_call(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    if !text.ends_with(')') {
        return None;
    }
    let name = &text[..open];
    if !is_identifier(name) {
        return None;
    }
    Some((name, text[open + 1..text.len() - 1].trim()))
}

/// Split on top-level commas, respecting nested calls.
fn split_args(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// `Entity.property` → (Entity, property).
fn split_pair(text: &str) -> Option<(&str, &str)> {
    let (entity, property) = text.split_once('.')?;
    let (entity, property) = (entity.trim(), property.trim());
    (is_identifier(entity) && is_identifier(property)).then_some((entity, property))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_call_takes_outermost_parens() {
        assert_eq!(split_call("random(5)"), Some(("random", "5")));
        assert_eq!(
            split_call("percent(evaluate(A.b), 10)"),
            Some(("percent", "evaluate(A.b), 10"))
        );
        assert_eq!(split_call("3.5"), None);
        assert_eq!(split_call("(x)"), None);
    }

    #[test]
    fn split_args_respects_nesting() {
        assert_eq!(
            split_args("evaluate(A.b), percent(1,2)"),
            vec!["evaluate(A.b)", "percent(1,2)"]
        );
        assert_eq!(split_args("7"), vec!["7"]);
    }

    #[test]
    fn split_pair_requires_identifiers() {
        assert_eq!(split_pair("Smoker.age"), Some(("Smoker", "age")));
        assert_eq!(split_pair("3.5"), None);
        assert_eq!(split_pair("Smoker."), None);
    }
}
