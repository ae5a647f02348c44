use crate::{
    types::EntityId,
    value::PropertyType,
};
use thiserror::Error;

/// Misconfiguration detected while building a world. Always fatal, and only
/// ever raised before the first tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid range: low {low} is greater than high {high}")]
    InvalidRange { low: f64, high: f64 },

    #[error("Integer property '{property}' has a range with no integer in it")]
    EmptyIntegerRange { property: String },

    #[error("Range declared on non-numeric {ty} property '{property}'")]
    RangeOnNonNumeric { property: String, ty: PropertyType },

    #[error("Random {ty} property '{property}' needs a range")]
    RandomWithoutRange { property: String, ty: PropertyType },

    #[error("Unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("Unknown property '{property}' on entity type '{entity}'")]
    UnknownProperty { entity: String, property: String },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Malformed expression '{expr}': {reason}")]
    MalformedExpression { expr: String, reason: String },

    #[error("Property '{entity}.{property}' is not numeric")]
    NonNumericProperty { entity: String, property: String },

    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: PropertyType,
        actual: PropertyType,
    },

    #[error("Invalid value '{value}' for {ty} property '{property}'")]
    InvalidValue {
        property: String,
        ty: PropertyType,
        value: String,
    },

    #[error("Property '{0}' is neither random nor given an initial value")]
    MissingInitialValue(String),

    #[error("Invalid activation for rule '{rule}': {reason}")]
    InvalidActivation { rule: String, reason: String },

    #[error("Invalid secondary entity count '{0}'")]
    InvalidSelectionCount(String),

    #[error("Invalid grid {rows}x{cols}: both dimensions must be within [{min}, {max}]")]
    InvalidGrid {
        rows: usize,
        cols: usize,
        min: usize,
        max: usize,
    },

    #[error("Initial population of {population} does not fit a grid of {cells} cells")]
    GridOverflow { population: usize, cells: usize },

    #[error("Proximity action on '{0}' requires a grid")]
    ProximityWithoutGrid(String),

    #[error("Condition action on '{0}' has an empty then-block")]
    EmptyThen(String),

    #[error("Action entity '{nested}' is neither '{main}' nor the active secondary entity")]
    UnreachableEntity { main: String, nested: String },

    #[error("Nested action on '{0}' cannot declare its own secondary entity")]
    NestedSecondary(String),

    #[error("No termination rule defined")]
    NoTermination,

    #[error("Invalid termination threshold {0}")]
    InvalidTermination(u64),
}

/// Which branch of the error taxonomy an [`EvalError`] belongs to. Both are
/// handled the same way: the single invocation is skipped and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Evaluation,
    RuntimeInvariant,
}

/// Failure of one action invocation at tick time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown environment variable '{0}'")]
    UnknownEnvironmentVariable(String),

    #[error("Unknown property '{property}' on entity type '{entity}'")]
    UnknownProperty { entity: String, property: String },

    #[error("Unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("Operand of {context} is not numeric: got {actual}")]
    NonNumericOperand {
        context: &'static str,
        actual: PropertyType,
    },

    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: &'static str,
        expected: PropertyType,
        actual: PropertyType,
    },

    #[error("No secondary entity is bound to this invocation on '{0}'")]
    MissingSecondaryEntity(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in {0}")]
    Overflow(&'static str),

    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("Entity {0} has no grid position")]
    NoGridPosition(EntityId),
}

impl EvalError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DivisionByZero
            | Self::Overflow(_)
            | Self::EntityNotFound(_)
            | Self::NoGridPosition(_) => ErrorClass::RuntimeInvariant,
            _ => ErrorClass::Evaluation,
        }
    }
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Run already completed: {reason}")]
    RunCompleted { reason: String },

    #[error("Run not started")]
    RunNotStarted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
