//! Rules and their activation policy.

use crate::{action::Action, error::ConfigError, rng::SimRng, types::Tick};

/// Tick-interval and probability gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    tick_interval: u64,
    probability: f64,
}

impl Default for Activation {
    fn default() -> Self {
        Self {
            tick_interval: 1,
            probability: 1.0,
        }
    }
}

impl Activation {
    pub fn new(rule: &str, tick_interval: u64, probability: f64) -> Result<Self, ConfigError> {
        if tick_interval == 0 {
            return Err(ConfigError::InvalidActivation {
                rule: rule.to_string(),
                reason: "tick interval must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::InvalidActivation {
                rule: rule.to_string(),
                reason: format!("probability {probability} is outside [0, 1]"),
            });
        }
        Ok(Self {
            tick_interval,
            probability,
        })
    }

    pub fn tick_interval(&self) -> u64 {
        self.tick_interval
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn is_eligible(&self, tick: Tick) -> bool {
        tick % self.tick_interval == 0
    }

    /// Eligible, then `probability >= r` for one draw `r` in [0, 1).
    /// Ineligible ticks draw nothing.
    pub fn fires(&self, tick: Tick, rng: &mut SimRng) -> bool {
        self.is_eligible(tick) && self.probability >= rng.next_f64()
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub activation: Activation,
    pub actions: Vec<Action>,
}
