//! The run's event log.
//!
//! RULE: Every structural change and every skipped invocation shows up
//! here, grouped under the tick it happened in.

use crate::{
    termination::CompletionReason,
    types::{EntityId, RunId, Tick},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    RunStarted {
        run_id: RunId,
        seed: u64,
    },
    TickCompleted {
        tick: Tick,
    },
    RunTerminated {
        tick: Tick,
        reason: CompletionReason,
    },

    // ── Rule events ────────────────────────────────
    RuleFired {
        tick: Tick,
        rule: String,
    },
    ActionFailed {
        tick: Tick,
        rule: String,
        action: String,
        entity: Option<EntityId>,
        error: String,
    },

    // ── Population events ──────────────────────────
    EntityCreated {
        tick: Tick,
        entity_id: EntityId,
        entity_type: String,
    },
    EntityKilled {
        tick: Tick,
        entity_id: EntityId,
        entity_type: String,
    },
}

impl SimEvent {
    /// Stable name of the variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::TickCompleted { .. } => "tick_completed",
            Self::RunTerminated { .. } => "run_terminated",
            Self::RuleFired { .. } => "rule_fired",
            Self::ActionFailed { .. } => "action_failed",
            Self::EntityCreated { .. } => "entity_created",
            Self::EntityKilled { .. } => "entity_killed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub seq: u64,
    pub run_id: RunId,
    pub tick: Tick,
    pub event_type: String,
    pub event: SimEvent,
}
