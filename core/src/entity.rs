//! Entity types (factories) and entity instances.

use crate::{
    error::ConfigError,
    grid::Coord,
    property::{Property, PropertyDefinition},
    rng::SimRng,
    types::{EntityId, Tick},
};
use std::collections::BTreeMap;

/// A named entity type: its property templates and live population count.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub name: String,
    pub initial_population: usize,
    properties: Vec<PropertyDefinition>,
    population: usize,
}

impl EntityDefinition {
    pub fn new(
        name: impl Into<String>,
        initial_population: usize,
        properties: Vec<PropertyDefinition>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut seen = std::collections::HashSet::new();
        for p in &properties {
            if !seen.insert(p.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "property",
                    name: format!("{name}.{}", p.name),
                });
            }
        }
        Ok(Self {
            name,
            initial_population,
            properties,
            population: 0,
        })
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Current live population.
    pub fn population(&self) -> usize {
        self.population
    }

    /// Build one instance with a property per declared generator. The
    /// population counter moves only when the store commits the creation.
    pub fn create_entity(&self, id: EntityId, rng: &mut SimRng, tick: Tick) -> EntityInstance {
        let properties = self
            .properties
            .iter()
            .map(|def| (def.name.clone(), def.instantiate(rng, tick)))
            .collect();
        EntityInstance {
            id,
            type_name: self.name.clone(),
            properties,
            coord: None,
            alive: true,
        }
    }

    pub(crate) fn record_birth(&mut self) {
        self.population += 1;
    }

    pub(crate) fn record_death(&mut self) {
        self.population = self.population.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
pub struct EntityInstance {
    pub id: EntityId,
    pub type_name: String,
    properties: BTreeMap<String, Property>,
    pub coord: Option<Coord>,
    alive: bool,
}

impl EntityInstance {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// False once killed, even before the store removes it.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }
}
