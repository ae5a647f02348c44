//! World descriptor: the serde shape a run is configured with, and its
//! compilation into a validated `World`.
//!
//! Expressions, operands and literal values are written as text and
//! compiled against the entity types they can see. JSON numbers and
//! booleans are accepted wherever text is expected.

use crate::{
    action::{Action, ArithmeticOp, ReplaceMode},
    condition::{CompareOp, Condition, Logic},
    entity::EntityDefinition,
    environment::Environment,
    error::{ConfigError, SimResult},
    expression::{Expression, ParseScope},
    generator::ValueGenerator,
    grid::Grid,
    population::PopulationStore,
    property::PropertyDefinition,
    rule::{Activation, Rule},
    scheduler::RuleScheduler,
    secondary::{SecondaryEntitySelector, SelectionCount},
    termination::{TerminationKind, TerminationRule, TerminationSet},
    value::{PropertyType, Range, Value},
    world::World,
};
use serde::{Deserialize, Deserializer, Serialize};

// ── Descriptor types ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Master seed. Drawn at random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub environment: Vec<EnvironmentConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    pub termination: TerminationConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub population: usize,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeConfig {
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default)]
    pub range: Option<RangeConfig>,
    /// Draw each instance's value from the generator instead of `init`.
    #[serde(default)]
    pub random: bool,
    #[serde(default, deserialize_with = "opt_text")]
    pub init: Option<String>,
}

/// Environment variables are random unless given a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default)]
    pub range: Option<RangeConfig>,
    #[serde(default, deserialize_with = "opt_text")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default)]
    pub activation: ActivationConfig,
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default = "one_tick")]
    pub ticks: u64,
    #[serde(default = "certain")]
    pub probability: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            ticks: one_tick(),
            probability: certain(),
        }
    }
}

fn one_tick() -> u64 {
    1
}

fn certain() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Entity type the action runs over.
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SecondaryConfig>,
    #[serde(flatten)]
    pub kind: ActionKindConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKindConfig {
    Increase {
        property: String,
        #[serde(deserialize_with = "text")]
        by: String,
    },
    Decrease {
        property: String,
        #[serde(deserialize_with = "text")]
        by: String,
    },
    Calculate {
        result: String,
        #[serde(deserialize_with = "text")]
        arg1: String,
        #[serde(deserialize_with = "text")]
        arg2: String,
        op: ArithmeticOp,
    },
    Set {
        property: String,
        #[serde(deserialize_with = "text")]
        value: String,
    },
    Kill,
    Replace {
        create: String,
        mode: ReplaceMode,
    },
    Condition {
        condition: ConditionConfig,
        then: Vec<ActionConfig>,
        #[serde(default, rename = "else")]
        otherwise: Vec<ActionConfig>,
    },
    Proximity {
        target: String,
        #[serde(deserialize_with = "text")]
        depth: String,
        then: Vec<ActionConfig>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionConfig {
    Single {
        /// Entity whose property is tested. Defaults to the action's own.
        #[serde(default)]
        entity: Option<String>,
        property: String,
        operator: CompareOp,
        #[serde(deserialize_with = "text")]
        value: String,
    },
    Multiple {
        logic: Logic,
        conditions: Vec<ConditionConfig>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    pub entity: String,
    pub count: CountConfig,
    /// A candidate qualifies when any filter holds.
    #[serde(default)]
    pub filters: Vec<ConditionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountConfig {
    Number(usize),
    Text(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TerminationConfig {
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub seconds: Option<u64>,
}

/// Accept a string, number or boolean as expression text.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

// ── Compilation ────────────────────────────────────

impl WorldConfig {
    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the descriptor and compile it into a world ready to start.
    pub fn build(&self) -> Result<World, ConfigError> {
        let grid = self
            .grid
            .map(|g| Grid::new(g.rows, g.cols))
            .transpose()?;

        let definitions = self
            .entities
            .iter()
            .map(EntityConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        let population = PopulationStore::new(definitions, grid)?;

        let environment = Environment::new(
            self.environment
                .iter()
                .map(EnvironmentConfig::build)
                .collect::<Result<Vec<_>, _>>()?,
        )?;

        let rules = {
            let base = ParseScope::new(&population, &environment, "");
            self.rules
                .iter()
                .map(|r| r.build(&base))
                .collect::<Result<Vec<_>, _>>()?
        };
        let scheduler = RuleScheduler::new(rules)?;
        let terminations = self.termination.build()?;

        let seed = self.seed.unwrap_or_else(rand::random);
        log::debug!(
            "config: compiled {} entity types, {} rules (seed {seed})",
            self.entities.len(),
            scheduler.rules().len()
        );
        Ok(World::new(population, environment, scheduler, terminations, seed))
    }

    /// Ten smokers aging one year per tick, stopping after 100 ticks.
    pub fn default_test() -> Self {
        Self {
            seed: Some(42),
            grid: None,
            entities: vec![EntityConfig {
                name: "Smoker".into(),
                population: 10,
                properties: vec![
                    PropertyConfig {
                        name: "age".into(),
                        ty: PropertyType::Integer,
                        range: Some(RangeConfig { from: 0.0, to: 120.0 }),
                        random: false,
                        init: Some("20".into()),
                    },
                    PropertyConfig {
                        name: "cigarettes".into(),
                        ty: PropertyType::Integer,
                        range: Some(RangeConfig { from: 0.0, to: 40.0 }),
                        random: true,
                        init: None,
                    },
                ],
            }],
            environment: vec![EnvironmentConfig {
                name: "tax".into(),
                ty: PropertyType::Float,
                range: Some(RangeConfig { from: 0.0, to: 50.0 }),
                value: None,
            }],
            rules: vec![RuleConfig {
                name: "aging".into(),
                activation: ActivationConfig::default(),
                actions: vec![ActionConfig {
                    entity: "Smoker".into(),
                    secondary: None,
                    kind: ActionKindConfig::Increase {
                        property: "age".into(),
                        by: "1".into(),
                    },
                }],
            }],
            termination: TerminationConfig {
                ticks: Some(100),
                seconds: None,
            },
        }
    }
}

fn build_range(range: Option<RangeConfig>) -> Result<Option<Range>, ConfigError> {
    range.map(|r| Range::new(r.from, r.to)).transpose()
}

fn fixed_value(
    property: &str,
    ty: PropertyType,
    range: Option<Range>,
    text: &str,
) -> Result<ValueGenerator, ConfigError> {
    let value = Value::parse_as(text, ty).ok_or_else(|| ConfigError::InvalidValue {
        property: property.to_string(),
        ty,
        value: text.to_string(),
    })?;
    ValueGenerator::fixed(property, ty, range, value)
}

impl PropertyConfig {
    fn build(&self) -> Result<PropertyDefinition, ConfigError> {
        let range = build_range(self.range)?;
        let generator = match (&self.init, self.random) {
            (_, true) => ValueGenerator::random(&self.name, self.ty, range)?,
            (Some(init), false) => fixed_value(&self.name, self.ty, range, init)?,
            (None, false) => return Err(ConfigError::MissingInitialValue(self.name.clone())),
        };
        PropertyDefinition::new(&self.name, self.ty, range, generator)
    }
}

impl EnvironmentConfig {
    fn build(&self) -> Result<PropertyDefinition, ConfigError> {
        let range = build_range(self.range)?;
        let generator = match &self.value {
            Some(value) => fixed_value(&self.name, self.ty, range, value)?,
            None => ValueGenerator::random(&self.name, self.ty, range)?,
        };
        PropertyDefinition::new(&self.name, self.ty, range, generator)
    }
}

impl EntityConfig {
    fn build(&self) -> Result<EntityDefinition, ConfigError> {
        let properties = self
            .properties
            .iter()
            .map(PropertyConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        EntityDefinition::new(&self.name, self.population, properties)
    }
}

impl RuleConfig {
    fn build(&self, base: &ParseScope<'_>) -> Result<Rule, ConfigError> {
        let activation = Activation::new(
            &self.name,
            self.activation.ticks,
            self.activation.probability,
        )?;
        let actions = self
            .actions
            .iter()
            .map(|a| a.build_top_level(base))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rule {
            name: self.name.clone(),
            activation,
            actions,
        })
    }
}

impl ActionConfig {
    fn build_top_level(&self, base: &ParseScope<'_>) -> Result<Action, ConfigError> {
        if base.population.definition(&self.entity).is_none() {
            return Err(ConfigError::UnknownEntityType(self.entity.clone()));
        }
        let mut scope = base.with_main(&self.entity);
        let selector = match &self.secondary {
            Some(secondary) => {
                let selector = secondary.build(base)?;
                scope.secondary = Some(&secondary.entity);
                Some(selector)
            }
            None => None,
        };
        let action = self.kind.build(&scope)?;
        Ok(match selector {
            Some(selector) => action.with_secondary(selector),
            None => action,
        })
    }

    /// Nested actions run on whichever bound entity they name.
    fn build_nested(&self, parent: &ParseScope<'_>) -> Result<Action, ConfigError> {
        if self.secondary.is_some() {
            return Err(ConfigError::NestedSecondary(self.entity.clone()));
        }
        let scope = parent.focus(&self.entity)?;
        self.kind.build(&scope)
    }
}

fn build_nested(actions: &[ActionConfig], scope: &ParseScope<'_>) -> Result<Vec<Action>, ConfigError> {
    actions.iter().map(|a| a.build_nested(scope)).collect()
}

impl ActionKindConfig {
    fn build(&self, scope: &ParseScope<'_>) -> Result<Action, ConfigError> {
        match self {
            Self::Increase { property, by } => Action::increase(scope, property, by),
            Self::Decrease { property, by } => Action::decrease(scope, property, by),
            Self::Calculate {
                result,
                arg1,
                arg2,
                op,
            } => Action::calculate(scope, result, arg1, arg2, *op),
            Self::Set { property, value } => Action::set(scope, property, value),
            Self::Kill => Action::kill(scope),
            Self::Replace { create, mode } => Action::replace(scope, create, *mode),
            Self::Condition {
                condition,
                then,
                otherwise,
            } => {
                let condition = condition.build(&scope.rooted())?;
                let then = build_nested(then, scope)?;
                let otherwise = build_nested(otherwise, scope)?;
                Action::condition(scope, condition, then, otherwise)
            }
            Self::Proximity { target, depth, then } => {
                if scope.population.definition(target).is_none() {
                    return Err(ConfigError::UnknownEntityType(target.clone()));
                }
                let inner = ParseScope {
                    secondary: Some(target),
                    ..scope.rooted()
                };
                let then = build_nested(then, &inner)?;
                Action::proximity(scope, target, depth, then)
            }
        }
    }
}

impl ConditionConfig {
    fn build(&self, scope: &ParseScope<'_>) -> Result<Condition, ConfigError> {
        match self {
            Self::Single {
                entity,
                property,
                operator,
                value,
            } => {
                let scope = match entity {
                    Some(entity) => scope.focus(entity)?,
                    None => *scope,
                };
                // Reject a subject that is not a property of the focused
                // entity before it falls through to a string literal.
                let subject = Expression::parse(property, &scope)?;
                if matches!(subject, Expression::Literal(_)) {
                    return Err(ConfigError::UnknownProperty {
                        entity: scope.main.to_string(),
                        property: property.clone(),
                    });
                }
                Condition::single(property, *operator, value, &scope)
            }
            Self::Multiple { logic, conditions } => {
                let children = conditions
                    .iter()
                    .map(|c| c.build(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Condition::multi(*logic, children))
            }
        }
    }
}

impl SecondaryConfig {
    fn build(&self, base: &ParseScope<'_>) -> Result<SecondaryEntitySelector, ConfigError> {
        if base.population.definition(&self.entity).is_none() {
            return Err(ConfigError::UnknownEntityType(self.entity.clone()));
        }
        let count = match &self.count {
            CountConfig::Number(0) => {
                return Err(ConfigError::InvalidSelectionCount("0".into()));
            }
            CountConfig::Number(n) => SelectionCount::Count(*n),
            CountConfig::Text(text) => text
                .parse()
                .map_err(|_| ConfigError::InvalidSelectionCount(text.clone()))?,
        };
        let scope = base.with_main(&self.entity);
        let filters = self
            .filters
            .iter()
            .map(|f| f.build(&scope))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SecondaryEntitySelector {
            target_type: self.entity.clone(),
            count,
            filters,
        })
    }
}

impl TerminationConfig {
    fn build(&self) -> Result<TerminationSet, ConfigError> {
        let rules = [
            (TerminationKind::Ticks, self.ticks),
            (TerminationKind::Seconds, self.seconds),
        ]
        .into_iter()
        .filter_map(|(kind, threshold)| threshold.map(|threshold| TerminationRule { kind, threshold }));
        TerminationSet::new(rules)
    }
}
