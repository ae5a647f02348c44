//! Read-only views of a run for the UI / runner side.

use crate::{
    grid::Coord,
    termination::CompletionReason,
    types::{EntityId, RunId, Tick},
    value::Value,
    world::World,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed(CompletionReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub value: Value,
    /// Average ticks between value changes.
    pub consistency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub entity_type: String,
    pub coord: Option<Coord>,
    pub properties: BTreeMap<String, PropertySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub run_id: RunId,
    pub tick: Tick,
    pub status: RunStatus,
    pub populations: BTreeMap<String, usize>,
    pub environment: BTreeMap<String, Value>,
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn capture(run_id: &str, world: &World) -> Self {
        let tick = world.current_tick();
        let entities = world
            .population()
            .entities()
            .filter(|e| e.is_alive())
            .map(|e| EntitySnapshot {
                id: e.id,
                entity_type: e.type_name.clone(),
                coord: e.coord,
                properties: e
                    .properties()
                    .map(|p| {
                        (
                            p.name.clone(),
                            PropertySnapshot {
                                value: p.value().clone(),
                                consistency: p.consistency(tick),
                            },
                        )
                    })
                    .collect(),
            })
            .collect();
        Self {
            run_id: run_id.to_string(),
            tick,
            status: world.status(),
            populations: world.population().counts(),
            environment: world
                .environment()
                .iter()
                .map(|p| (p.name.clone(), p.value().clone()))
                .collect(),
            entities,
        }
    }

    pub fn entities_of<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a EntitySnapshot> {
        self.entities.iter().filter(move |e| e.entity_type == entity_type)
    }

    /// Mean of a numeric property across one type. `None` when there are
    /// no live entities or the property is not numeric.
    pub fn property_average(&self, entity_type: &str, property: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .entities_of(entity_type)
            .filter_map(|e| e.properties.get(property)?.value.as_f64())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Mean consistency of a property across one type.
    pub fn consistency_average(&self, entity_type: &str, property: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .entities_of(entity_type)
            .filter_map(|e| Some(e.properties.get(property)?.consistency))
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// How many entities of a type hold each value of a property.
    pub fn histogram(&self, entity_type: &str, property: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in self.entities_of(entity_type) {
            if let Some(p) = e.properties.get(property) {
                *counts.entry(p.value.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ticks: Tick,
    pub elapsed_seconds: u64,
    pub reason: CompletionReason,
    pub termination: String,
    pub initial_populations: BTreeMap<String, usize>,
    pub final_populations: BTreeMap<String, usize>,
}
