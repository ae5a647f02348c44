//! The action engine.
//!
//! One `Action` enum, one `apply` entry point. Actions are compiled once
//! against a `ParseScope` (which validates every name they mention) and then
//! applied per bound entity at tick time.
//!
//! RULE: `apply` never changes the population's structure directly.
//! Kill and Replace go through the store's pending change list.

use crate::{
    condition::Condition,
    environment::Environment,
    error::{ConfigError, EvalError},
    expression::{EvalContext, Expression, ParseScope, Slot},
    population::PopulationStore,
    rng::SimRng,
    secondary::SecondaryEntitySelector,
    types::{EntityId, Tick},
    value::{PropertyType, Value},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithmeticOp {
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceMode {
    Scratch,
    Derived,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Increase {
        property: String,
        by: Expression,
    },
    Decrease {
        property: String,
        by: Expression,
    },
    Calculate {
        result: String,
        arg1: Expression,
        arg2: Expression,
        op: ArithmeticOp,
    },
    Set {
        property: String,
        value: Expression,
    },
    Kill,
    Replace {
        create: String,
        mode: ReplaceMode,
    },
    Condition {
        condition: Condition,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    },
    Proximity {
        target: String,
        depth: Expression,
        then: Vec<Action>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// The entity type this action operates on.
    pub entity: String,
    /// For nested actions, which entity of the enclosing binding it acts on.
    pub on: Slot,
    pub secondary: Option<SecondaryEntitySelector>,
    pub kind: ActionKind,
}

/// The entities one invocation is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub main: EntityId,
    pub secondary: Option<EntityId>,
}

impl Binding {
    pub fn main(main: EntityId) -> Self {
        Self {
            main,
            secondary: None,
        }
    }

    /// Re-centre on `slot`. Focusing the secondary swaps the pair.
    fn focus(self, slot: Slot, entity: &str) -> Result<Self, EvalError> {
        match (slot, self.secondary) {
            (Slot::Main, _) => Ok(self),
            (Slot::Secondary, Some(s)) => Ok(Self {
                main: s,
                secondary: Some(self.main),
            }),
            (Slot::Secondary, None) => Err(EvalError::MissingSecondaryEntity(entity.to_string())),
        }
    }
}

/// Mutable world state an action may touch.
pub struct ActionScope<'w> {
    pub population: &'w mut PopulationStore,
    pub environment: &'w Environment,
    pub expression_rng: &'w mut SimRng,
    pub generation_rng: &'w mut SimRng,
    pub tick: Tick,
}

fn context<'a>(
    population: &'a PopulationStore,
    environment: &'a Environment,
    binding: Binding,
    tick: Tick,
) -> Result<EvalContext<'a>, EvalError> {
    let main = population
        .get(binding.main)
        .ok_or(EvalError::EntityNotFound(binding.main))?;
    let secondary = match binding.secondary {
        Some(id) => Some(population.get(id).ok_or(EvalError::EntityNotFound(id))?),
        None => None,
    };
    Ok(EvalContext {
        population,
        environment,
        main,
        secondary,
        tick,
    })
}

fn property_type(scope: &ParseScope<'_>, property: &str) -> Result<PropertyType, ConfigError> {
    let def = scope
        .population
        .definition(scope.main)
        .ok_or_else(|| ConfigError::UnknownEntityType(scope.main.to_string()))?;
    def.property(property)
        .map(|p| p.ty)
        .ok_or_else(|| ConfigError::UnknownProperty {
            entity: scope.main.to_string(),
            property: property.to_string(),
        })
}

fn numeric_property(scope: &ParseScope<'_>, property: &str) -> Result<PropertyType, ConfigError> {
    let ty = property_type(scope, property)?;
    if !ty.is_numeric() {
        return Err(ConfigError::NonNumericProperty {
            entity: scope.main.to_string(),
            property: property.to_string(),
        });
    }
    Ok(ty)
}

fn numeric_operand(
    scope: &ParseScope<'_>,
    text: &str,
    context: &str,
) -> Result<Expression, ConfigError> {
    let expr = Expression::parse(text, scope)?;
    if let Some(ty) = expr.static_type(scope) {
        if !ty.is_numeric() {
            return Err(ConfigError::TypeMismatch {
                context: format!("{context} '{text}'"),
                expected: PropertyType::Float,
                actual: ty,
            });
        }
    }
    Ok(expr)
}

fn check_nested(scope: &ParseScope<'_>, nested: &[Action]) -> Result<(), ConfigError> {
    for action in nested {
        let reachable = match action.on {
            Slot::Main => action.entity == scope.main,
            Slot::Secondary => scope.secondary == Some(action.entity.as_str()),
        };
        if !reachable {
            return Err(ConfigError::UnreachableEntity {
                main: scope.main.to_string(),
                nested: action.entity.clone(),
            });
        }
        if action.secondary.is_some() {
            return Err(ConfigError::NestedSecondary(action.entity.clone()));
        }
    }
    Ok(())
}

fn require_entity(scope: &ParseScope<'_>) -> Result<(), ConfigError> {
    if scope.population.definition(scope.main).is_none() {
        return Err(ConfigError::UnknownEntityType(scope.main.to_string()));
    }
    Ok(())
}

impl Action {
    fn new(scope: &ParseScope<'_>, kind: ActionKind) -> Self {
        Self {
            entity: scope.main.to_string(),
            on: scope.on,
            secondary: None,
            kind,
        }
    }

    pub fn increase(scope: &ParseScope<'_>, property: &str, by: &str) -> Result<Self, ConfigError> {
        numeric_property(scope, property)?;
        let by = numeric_operand(scope, by, "increase by")?;
        Ok(Self::new(
            scope,
            ActionKind::Increase {
                property: property.to_string(),
                by,
            },
        ))
    }

    pub fn decrease(scope: &ParseScope<'_>, property: &str, by: &str) -> Result<Self, ConfigError> {
        numeric_property(scope, property)?;
        let by = numeric_operand(scope, by, "decrease by")?;
        Ok(Self::new(
            scope,
            ActionKind::Decrease {
                property: property.to_string(),
                by,
            },
        ))
    }

    pub fn calculate(
        scope: &ParseScope<'_>,
        result: &str,
        arg1: &str,
        arg2: &str,
        op: ArithmeticOp,
    ) -> Result<Self, ConfigError> {
        let result_ty = numeric_property(scope, result)?;
        let operand = |text: &str| -> Result<Expression, ConfigError> {
            let expr = numeric_operand(scope, text, "calculate operand")?;
            if let Some(ty) = expr.static_type(scope) {
                if !result_ty.accepts(ty) {
                    return Err(ConfigError::TypeMismatch {
                        context: format!("calculate '{text}' into '{result}'"),
                        expected: result_ty,
                        actual: ty,
                    });
                }
            }
            Ok(expr)
        };
        let arg1 = operand(arg1)?;
        let arg2 = operand(arg2)?;
        Ok(Self::new(
            scope,
            ActionKind::Calculate {
                result: result.to_string(),
                arg1,
                arg2,
                op,
            },
        ))
    }

    pub fn set(scope: &ParseScope<'_>, property: &str, value: &str) -> Result<Self, ConfigError> {
        let ty = property_type(scope, property)?;
        let expr = Expression::parse(value, scope)?;
        if let Some(actual) = expr.static_type(scope) {
            if !ty.accepts(actual) {
                return Err(ConfigError::TypeMismatch {
                    context: format!("set '{property}' to '{value}'"),
                    expected: ty,
                    actual,
                });
            }
        }
        Ok(Self::new(
            scope,
            ActionKind::Set {
                property: property.to_string(),
                value: expr,
            },
        ))
    }

    pub fn kill(scope: &ParseScope<'_>) -> Result<Self, ConfigError> {
        require_entity(scope)?;
        Ok(Self::new(scope, ActionKind::Kill))
    }

    pub fn replace(
        scope: &ParseScope<'_>,
        create: &str,
        mode: ReplaceMode,
    ) -> Result<Self, ConfigError> {
        require_entity(scope)?;
        if scope.population.definition(create).is_none() {
            return Err(ConfigError::UnknownEntityType(create.to_string()));
        }
        Ok(Self::new(
            scope,
            ActionKind::Replace {
                create: create.to_string(),
                mode,
            },
        ))
    }

    /// A main condition. `then` must not be empty; nested actions act on
    /// the main or the secondary entity.
    pub fn condition(
        scope: &ParseScope<'_>,
        condition: Condition,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    ) -> Result<Self, ConfigError> {
        require_entity(scope)?;
        if then.is_empty() {
            return Err(ConfigError::EmptyThen(scope.main.to_string()));
        }
        check_nested(scope, &then)?;
        check_nested(scope, &otherwise)?;
        Ok(Self::new(
            scope,
            ActionKind::Condition {
                condition,
                then,
                otherwise,
            },
        ))
    }

    /// `then` is compiled against a scope whose secondary type is `target`:
    /// each nested action runs once per neighbour, with the neighbour bound
    /// as the secondary entity.
    pub fn proximity(
        scope: &ParseScope<'_>,
        target: &str,
        depth: &str,
        then: Vec<Action>,
    ) -> Result<Self, ConfigError> {
        require_entity(scope)?;
        if scope.population.definition(target).is_none() {
            return Err(ConfigError::UnknownEntityType(target.to_string()));
        }
        if scope.population.grid().is_none() {
            return Err(ConfigError::ProximityWithoutGrid(scope.main.to_string()));
        }
        let depth = numeric_operand(scope, depth, "proximity depth")?;
        let inner = ParseScope {
            secondary: Some(target),
            ..scope.rooted()
        };
        check_nested(&inner, &then)?;
        Ok(Self::new(
            scope,
            ActionKind::Proximity {
                target: target.to_string(),
                depth,
                then,
            },
        ))
    }

    pub fn with_secondary(mut self, selector: SecondaryEntitySelector) -> Self {
        self.secondary = Some(selector);
        self
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ActionKind::Increase { .. } => "increase",
            ActionKind::Decrease { .. } => "decrease",
            ActionKind::Calculate { .. } => "calculate",
            ActionKind::Set { .. } => "set",
            ActionKind::Kill => "kill",
            ActionKind::Replace { .. } => "replace",
            ActionKind::Condition { .. } => "condition",
            ActionKind::Proximity { .. } => "proximity",
        }
    }

    /// Apply to the entity bound as `binding.main`. Dead entities are
    /// skipped without error.
    pub fn apply(&self, scope: &mut ActionScope<'_>, binding: Binding) -> Result<(), EvalError> {
        let alive = scope
            .population
            .get(binding.main)
            .ok_or(EvalError::EntityNotFound(binding.main))?
            .is_alive();
        if !alive {
            return Ok(());
        }

        match &self.kind {
            ActionKind::Increase { property, by } => {
                self.step(scope, binding, property, by, 1, "increase")
            }
            ActionKind::Decrease { property, by } => {
                self.step(scope, binding, property, by, -1, "decrease")
            }
            ActionKind::Calculate {
                result,
                arg1,
                arg2,
                op,
            } => {
                let (a, b, target_ty) = {
                    let ctx = context(scope.population, scope.environment, binding, scope.tick)?;
                    let target_ty = ctx.property(Slot::Main, result)?.ty;
                    let a = arg1.evaluate(&ctx, scope.expression_rng)?;
                    let b = arg2.evaluate(&ctx, scope.expression_rng)?;
                    (a, b, target_ty)
                };
                let value = calculate(*op, &a, &b, target_ty)?;
                write(scope, binding.main, result, value)
            }
            ActionKind::Set { property, value } => {
                let v = {
                    let ctx = context(scope.population, scope.environment, binding, scope.tick)?;
                    ctx.property(Slot::Main, property)?;
                    value.evaluate(&ctx, scope.expression_rng)?
                };
                write(scope, binding.main, property, v)
            }
            ActionKind::Kill => {
                scope.population.kill(binding.main)?;
                Ok(())
            }
            ActionKind::Replace { create, mode } => {
                scope.population.kill(binding.main)?;
                let inherit = (*mode == ReplaceMode::Derived).then_some(binding.main);
                scope
                    .population
                    .spawn(create, inherit, scope.generation_rng, scope.tick)?;
                Ok(())
            }
            ActionKind::Condition {
                condition,
                then,
                otherwise,
            } => {
                let hit = {
                    let ctx = context(scope.population, scope.environment, binding, scope.tick)?;
                    condition.evaluate(&ctx, scope.expression_rng)?
                };
                let branch = if hit { then } else { otherwise };
                for nested in branch {
                    let bound = binding.focus(nested.on, &self.entity)?;
                    nested.apply(scope, bound)?;
                }
                Ok(())
            }
            ActionKind::Proximity { target, depth, then } => {
                let depth = {
                    let ctx = context(scope.population, scope.environment, binding, scope.tick)?;
                    depth.evaluate(&ctx, scope.expression_rng)?
                };
                let depth = depth.numeric("proximity depth")?.max(0.0) as usize;
                let neighbours = scope.population.neighbours(binding.main, target, depth)?;
                for neighbour in neighbours {
                    let pair = Binding {
                        main: binding.main,
                        secondary: Some(neighbour),
                    };
                    for nested in then {
                        let bound = pair.focus(nested.on, &self.entity)?;
                        nested.apply(scope, bound)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Increase (+1) or Decrease (-1) in the property's own numeric type.
    fn step(
        &self,
        scope: &mut ActionScope<'_>,
        binding: Binding,
        property: &str,
        by: &Expression,
        sign: i64,
        context_name: &'static str,
    ) -> Result<(), EvalError> {
        let (current, amount) = {
            let ctx = context(scope.population, scope.environment, binding, scope.tick)?;
            let current = ctx.property(Slot::Main, property)?.value().clone();
            let amount = by.evaluate(&ctx, scope.expression_rng)?;
            (current, amount)
        };
        let amount_f = amount.numeric(context_name)?;
        let next = match current {
            Value::Integer(i) => {
                let delta = match amount {
                    Value::Integer(a) => a,
                    _ => amount_f.trunc() as i64,
                };
                Value::Integer(i.saturating_add(delta.saturating_mul(sign)))
            }
            Value::Float(f) => Value::Float(f + amount_f * sign as f64),
            other => {
                return Err(EvalError::NonNumericOperand {
                    context: context_name,
                    actual: other.property_type(),
                })
            }
        };
        write(scope, binding.main, property, next)
    }
}

fn write(
    scope: &mut ActionScope<'_>,
    id: EntityId,
    property: &str,
    value: Value,
) -> Result<(), EvalError> {
    let tick = scope.tick;
    let entity = scope
        .population
        .get_mut(id)
        .ok_or(EvalError::EntityNotFound(id))?;
    let entity_type = entity.type_name.clone();
    let slot = entity
        .property_mut(property)
        .ok_or_else(|| EvalError::UnknownProperty {
            entity: entity_type,
            property: property.to_string(),
        })?;
    slot.write(value, tick)?;
    Ok(())
}

fn calculate(
    op: ArithmeticOp,
    a: &Value,
    b: &Value,
    target: PropertyType,
) -> Result<Value, EvalError> {
    for operand in [a, b] {
        operand.numeric("calculate")?;
        if !target.accepts(operand.property_type()) {
            return Err(EvalError::TypeMismatch {
                context: "calculate",
                expected: target,
                actual: operand.property_type(),
            });
        }
    }
    match (target, a, b) {
        (PropertyType::Integer, Value::Integer(x), Value::Integer(y)) => match op {
            ArithmeticOp::Multiply => Ok(Value::Integer(x.saturating_mul(*y))),
            ArithmeticOp::Divide if *y == 0 => Err(EvalError::DivisionByZero),
            ArithmeticOp::Divide => x
                .checked_div(*y)
                .map(Value::Integer)
                .ok_or(EvalError::Overflow("calculate")),
        },
        _ => {
            let x = a.numeric("calculate")?;
            let y = b.numeric("calculate")?;
            match op {
                ArithmeticOp::Multiply => Ok(Value::Float(x * y)),
                ArithmeticOp::Divide if y == 0.0 => Err(EvalError::DivisionByZero),
                ArithmeticOp::Divide => Ok(Value::Float(x / y)),
            }
        }
    }
}
