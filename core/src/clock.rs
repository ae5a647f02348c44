//! Simulation clock: owns the tick counter.

use crate::types::Tick;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    /// The tick about to run; equals the number of completed ticks.
    pub current_tick: Tick,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one tick. Returns the new tick number.
    /// Only the world calls this, once per completed tick.
    pub(crate) fn advance(&mut self) -> Tick {
        self.current_tick += 1;
        self.current_tick
    }
}
