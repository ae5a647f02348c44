//! Boolean conditions: single comparisons and AND/OR groups.

use crate::{
    error::{ConfigError, EvalError},
    expression::{EvalContext, Expression, ParseScope, Slot},
    rng::SimRng,
    value::{PropertyType, Value},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "bt")]
    Gt,
}

impl FromStr for CompareOp {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "bt" => Ok(Self::Gt),
            other => Err(ConfigError::MalformedExpression {
                expr: other.to_string(),
                reason: "unknown comparison operator".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Single {
        /// The bound entity the comparison reads from.
        on: Slot,
        subject: Expression,
        op: CompareOp,
        value: Expression,
    },
    /// One operator over every direct child; deeper grouping nests.
    Multi {
        logic: Logic,
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Compile a single comparison, rejecting operand types that can never
    /// compare.
    pub fn single(
        subject: &str,
        op: CompareOp,
        value: &str,
        scope: &ParseScope<'_>,
    ) -> Result<Self, ConfigError> {
        let subject_expr = Expression::parse(subject, scope)?;
        let value_expr = Expression::parse(value, scope)?;
        if let (Some(a), Some(b)) = (subject_expr.static_type(scope), value_expr.static_type(scope)) {
            check_comparable(op, a, b).map_err(|_| ConfigError::TypeMismatch {
                context: format!("condition '{subject}' vs '{value}'"),
                expected: a,
                actual: b,
            })?;
        }
        Ok(Self::Single {
            on: scope.on,
            subject: subject_expr,
            op,
            value: value_expr,
        })
    }

    pub fn multi(logic: Logic, children: Vec<Condition>) -> Self {
        Self::Multi { logic, children }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>, rng: &mut SimRng) -> Result<bool, EvalError> {
        match self {
            Self::Single {
                on,
                subject,
                op,
                value,
            } => {
                let ctx = ctx.focused(*on)?;
                let a = subject.evaluate(&ctx, rng)?;
                let b = value.evaluate(&ctx, rng)?;
                compare(*op, &a, &b)
            }
            Self::Multi { logic, children } => {
                for child in children {
                    let hit = child.evaluate(ctx, rng)?;
                    match (logic, hit) {
                        (Logic::And, false) => return Ok(false),
                        (Logic::Or, true) => return Ok(true),
                        _ => {}
                    }
                }
                Ok(*logic == Logic::And)
            }
        }
    }
}

fn check_comparable(op: CompareOp, a: PropertyType, b: PropertyType) -> Result<(), EvalError> {
    let both_numeric = a.is_numeric() && b.is_numeric();
    match op {
        CompareOp::Eq | CompareOp::Ne if a == b || both_numeric => Ok(()),
        CompareOp::Lt | CompareOp::Gt if both_numeric => Ok(()),
        _ => Err(EvalError::TypeMismatch {
            context: "condition",
            expected: a,
            actual: b,
        }),
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    check_comparable(op, a.property_type(), b.property_type())?;
    let ordering = match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
    };
    Ok(match op {
        CompareOp::Eq => ordering == Some(Ordering::Equal),
        CompareOp::Ne => ordering != Some(Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_from_source_tokens() {
        assert_eq!("=".parse::<CompareOp>().unwrap(), CompareOp::Eq);
        assert_eq!("!=".parse::<CompareOp>().unwrap(), CompareOp::Ne);
        assert_eq!("LT".parse::<CompareOp>().unwrap(), CompareOp::Lt);
        assert_eq!("bt".parse::<CompareOp>().unwrap(), CompareOp::Gt);
        assert!("<".parse::<CompareOp>().is_err());
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert!(compare(CompareOp::Eq, &Value::Integer(3), &Value::Float(3.0)).unwrap());
        assert!(compare(CompareOp::Lt, &Value::Integer(2), &Value::Float(2.5)).unwrap());
        assert!(compare(CompareOp::Gt, &Value::Float(9.1), &Value::Integer(9)).unwrap());
        assert!(!compare(CompareOp::Ne, &Value::Integer(4), &Value::Integer(4)).unwrap());
    }

    #[test]
    fn ordering_on_strings_is_a_type_error() {
        let err = compare(
            CompareOp::Lt,
            &Value::String("a".into()),
            &Value::String("b".into()),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
        assert!(compare(
            CompareOp::Eq,
            &Value::String("a".into()),
            &Value::String("a".into())
        )
        .unwrap());
    }

    #[test]
    fn boolean_vs_integer_never_compares() {
        assert!(compare(CompareOp::Eq, &Value::Boolean(true), &Value::Integer(1)).is_err());
    }
}
