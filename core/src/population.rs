//! The population store: an id-keyed arena of entity instances.
//!
//! RULE: Structural changes never happen mid-rule.
//! `kill` marks an entity dead and queues its removal; `spawn` queues a
//! new instance. Both land in the arena on `commit`, which the scheduler
//! calls after every rule. Snapshots taken with `ids_of_type` therefore
//! stay valid for the whole rule pass.

use crate::{
    entity::{EntityDefinition, EntityInstance},
    error::{ConfigError, EvalError},
    grid::{Coord, Grid},
    rng::SimRng,
    types::{EntityId, Tick},
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PendingChanges {
    kills: Vec<EntityId>,
    births: Vec<EntityInstance>,
}

/// What a commit changed, for logging and the event log.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommitReport {
    pub killed: Vec<(EntityId, String)>,
    pub born: Vec<(EntityId, String)>,
    /// Births dropped because the grid had no free cell.
    pub dropped: Vec<String>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.killed.is_empty() && self.born.is_empty() && self.dropped.is_empty()
    }
}

#[derive(Debug)]
pub struct PopulationStore {
    definitions: BTreeMap<String, EntityDefinition>,
    entities: BTreeMap<EntityId, EntityInstance>,
    next_id: EntityId,
    pending: PendingChanges,
    grid: Option<Grid>,
}

impl PopulationStore {
    pub fn new(definitions: Vec<EntityDefinition>, grid: Option<Grid>) -> Result<Self, ConfigError> {
        let mut by_name = BTreeMap::new();
        for def in definitions {
            if by_name.contains_key(&def.name) {
                return Err(ConfigError::DuplicateName {
                    kind: "entity",
                    name: def.name,
                });
            }
            by_name.insert(def.name.clone(), def);
        }
        if let Some(g) = &grid {
            let population: usize = by_name.values().map(|d| d.initial_population).sum();
            if population > g.capacity() {
                return Err(ConfigError::GridOverflow {
                    population,
                    cells: g.capacity(),
                });
            }
        }
        Ok(Self {
            definitions: by_name,
            entities: BTreeMap::new(),
            next_id: 0,
            pending: PendingChanges::default(),
            grid,
        })
    }

    /// Create every type's initial population, committed immediately.
    pub fn populate(&mut self, rng: &mut SimRng, tick: Tick) -> CommitReport {
        for def in self.definitions.values() {
            for _ in 0..def.initial_population {
                self.pending
                    .births
                    .push(def.create_entity(self.next_id, rng, tick));
                self.next_id += 1;
            }
        }
        self.commit(rng)
    }

    pub fn definition(&self, name: &str) -> Option<&EntityDefinition> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.definitions.values()
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityInstance> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityInstance> {
        self.entities.get_mut(&id)
    }

    /// Snapshot of the live ids of one type, in creation order.
    pub fn ids_of_type(&self, type_name: &str) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.type_name == type_name && e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityInstance> {
        self.entities.values()
    }

    /// Committed live population of a type.
    pub fn count(&self, type_name: &str) -> usize {
        self.definitions
            .get(type_name)
            .map(EntityDefinition::population)
            .unwrap_or(0)
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.definitions
            .values()
            .map(|d| (d.name.clone(), d.population()))
            .collect()
    }

    /// Mark an entity dead and queue its removal. Returns false when it was
    /// already dead.
    pub fn kill(&mut self, id: EntityId) -> Result<bool, EvalError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EvalError::EntityNotFound(id))?;
        if !entity.is_alive() {
            return Ok(false);
        }
        entity.mark_dead();
        self.pending.kills.push(id);
        Ok(true)
    }

    /// Queue a new instance of `type_name`. With `inherit`, properties that
    /// exist on both types with the same type start from the source's values.
    pub fn spawn(
        &mut self,
        type_name: &str,
        inherit: Option<EntityId>,
        rng: &mut SimRng,
        tick: Tick,
    ) -> Result<EntityId, EvalError> {
        let def = self
            .definitions
            .get(type_name)
            .ok_or_else(|| EvalError::UnknownEntityType(type_name.to_string()))?;
        let id = self.next_id;
        let mut instance = def.create_entity(id, rng, tick);
        if let Some(source_id) = inherit {
            let source = self
                .entities
                .get(&source_id)
                .ok_or(EvalError::EntityNotFound(source_id))?;
            for source_prop in source.properties() {
                if let Some(target) = instance.property_mut(&source_prop.name) {
                    if target.ty == source_prop.ty {
                        target.seed(source_prop.value().clone());
                    }
                }
            }
        }
        self.next_id += 1;
        self.pending.births.push(instance);
        Ok(id)
    }

    /// Apply queued kills, then queued births.
    pub fn commit(&mut self, rng: &mut SimRng) -> CommitReport {
        let mut report = CommitReport::default();
        let pending = std::mem::take(&mut self.pending);

        for id in pending.kills {
            if let Some(entity) = self.entities.remove(&id) {
                if let (Some(grid), Some(at)) = (self.grid.as_mut(), entity.coord) {
                    grid.vacate(at);
                }
                if let Some(def) = self.definitions.get_mut(&entity.type_name) {
                    def.record_death();
                }
                report.killed.push((id, entity.type_name));
            }
        }

        for mut entity in pending.births {
            if let Some(grid) = self.grid.as_mut() {
                match grid.place_random(entity.id, rng) {
                    Some(at) => entity.coord = Some(at),
                    None => {
                        report.dropped.push(entity.type_name);
                        continue;
                    }
                }
            }
            if let Some(def) = self.definitions.get_mut(&entity.type_name) {
                def.record_birth();
            }
            report.born.push((entity.id, entity.type_name.clone()));
            self.entities.insert(entity.id, entity);
        }
        report
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Move every grid occupant one step. No-op without a grid.
    pub fn step_grid(&mut self, rng: &mut SimRng) -> usize {
        let Some(grid) = self.grid.as_mut() else {
            return 0;
        };
        let moved = grid.step_all(rng);
        for (id, to) in &moved {
            if let Some(e) = self.entities.get_mut(id) {
                e.coord = Some(*to);
            }
        }
        moved.len()
    }

    /// Live entities within `depth` cells of `id`, of type `target_type`.
    pub fn neighbours(
        &self,
        id: EntityId,
        target_type: &str,
        depth: usize,
    ) -> Result<Vec<EntityId>, EvalError> {
        let entity = self.entities.get(&id).ok_or(EvalError::EntityNotFound(id))?;
        let at: Coord = entity.coord.ok_or(EvalError::NoGridPosition(id))?;
        let Some(grid) = self.grid.as_ref() else {
            return Err(EvalError::NoGridPosition(id));
        };
        Ok(grid
            .within(at, depth)
            .into_iter()
            .filter(|n| {
                self.entities
                    .get(n)
                    .is_some_and(|e| e.is_alive() && e.type_name == target_type)
            })
            .collect())
    }
}
