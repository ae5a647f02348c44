//! The rule scheduler: one pass per tick.
//!
//! EXECUTION ORDER (fixed):
//!   1. Rules run in declaration order.
//!   2. A rule fires when its activation policy says so.
//!   3. Each action of a fired rule runs over a snapshot of its entity
//!      type's live ids, once per bound (main, secondary) pair.
//!   4. Kills and births queued by the rule are committed before the
//!      next rule starts.
//!
//! RULES:
//!   - A failed invocation is logged and recorded; the remaining actions
//!     of that rule are skipped for that entity. Nothing else stops.
//!   - Entities killed earlier in the same rule are not visited again.

use crate::{
    action::{Action, ActionScope, Binding},
    environment::Environment,
    error::{ConfigError, ErrorClass, EvalError},
    population::{CommitReport, PopulationStore},
    rng::RunStreams,
    rule::Rule,
    types::{EntityId, Tick},
};
use std::collections::HashSet;

/// One skipped invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    pub rule: String,
    pub action: &'static str,
    /// `None` when the failure happened before any entity was bound
    /// (secondary selection).
    pub entity: Option<EntityId>,
    pub error: EvalError,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub fired: Vec<String>,
    pub failures: Vec<ActionFailure>,
    pub commits: CommitReport,
    pub moved: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RuleScheduler {
    rules: Vec<Rule>,
}

impl RuleScheduler {
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "rule",
                    name: rule.name.clone(),
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run every rule for `tick`, accumulating into `report`.
    pub fn run_tick(
        &self,
        population: &mut PopulationStore,
        environment: &Environment,
        streams: &mut RunStreams,
        tick: Tick,
        report: &mut TickReport,
    ) {
        for rule in &self.rules {
            if !rule.activation.fires(tick, &mut streams.activation) {
                continue;
            }
            log::debug!("tick={tick} scheduler: rule '{}' fired", rule.name);
            report.fired.push(rule.name.clone());

            let mut failed: HashSet<EntityId> = HashSet::new();
            for action in &rule.actions {
                run_action(
                    rule,
                    action,
                    population,
                    environment,
                    streams,
                    tick,
                    &mut failed,
                    &mut report.failures,
                );
            }

            let commit = population.commit(&mut streams.generation);
            if !commit.is_empty() {
                log::debug!(
                    "tick={tick} scheduler: rule '{}' committed {} kills, {} births",
                    rule.name,
                    commit.killed.len(),
                    commit.born.len()
                );
            }
            for dropped in &commit.dropped {
                log::warn!("tick={tick} scheduler: no free grid cell for new '{dropped}', creation dropped");
            }
            report.commits.killed.extend(commit.killed);
            report.commits.born.extend(commit.born);
            report.commits.dropped.extend(commit.dropped);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_action(
    rule: &Rule,
    action: &Action,
    population: &mut PopulationStore,
    environment: &Environment,
    streams: &mut RunStreams,
    tick: Tick,
    failed: &mut HashSet<EntityId>,
    failures: &mut Vec<ActionFailure>,
) {
    let snapshot = population.ids_of_type(&action.entity);

    let secondaries = match &action.secondary {
        None => None,
        Some(selector) => {
            match selector.choose(population, environment, tick, &mut streams.selection) {
                Ok(chosen) => Some(chosen),
                Err(error) => {
                    record(rule, action, None, error, tick, failures);
                    return;
                }
            }
        }
    };

    let mut scope = ActionScope {
        population,
        environment,
        expression_rng: &mut streams.expression,
        generation_rng: &mut streams.generation,
        tick,
    };

    for main in snapshot {
        if failed.contains(&main) {
            continue;
        }
        let bindings: Vec<Binding> = match &secondaries {
            None => vec![Binding::main(main)],
            Some(chosen) => chosen
                .iter()
                .map(|s| Binding {
                    main,
                    secondary: Some(*s),
                })
                .collect(),
        };
        for binding in bindings {
            if let Err(error) = action.apply(&mut scope, binding) {
                record(rule, action, Some(main), error, tick, failures);
                failed.insert(main);
                break;
            }
        }
    }
}

fn record(
    rule: &Rule,
    action: &Action,
    entity: Option<EntityId>,
    error: EvalError,
    tick: Tick,
    failures: &mut Vec<ActionFailure>,
) {
    let class = match error.class() {
        ErrorClass::Evaluation => "evaluation error",
        ErrorClass::RuntimeInvariant => "runtime invariant",
    };
    match entity {
        Some(id) => log::warn!(
            "tick={tick} rule '{}': {} on {} #{id} skipped ({class}): {error}",
            rule.name,
            action.name(),
            action.entity
        ),
        None => log::warn!(
            "tick={tick} rule '{}': {} on {} skipped ({class}): {error}",
            rule.name,
            action.name(),
            action.entity
        ),
    }
    failures.push(ActionFailure {
        rule: rule.name.clone(),
        action: action.name(),
        entity,
        error,
    });
}
