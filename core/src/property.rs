//! Property definitions (templates) and live property slots.

use crate::{
    error::{ConfigError, EvalError},
    generator::{GenerationMode, ValueGenerator},
    rng::SimRng,
    types::Tick,
    value::{PropertyType, Range, Value},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    pub name: String,
    pub ty: PropertyType,
    pub range: Option<Range>,
    pub generator: ValueGenerator,
}

impl PropertyDefinition {
    pub fn new(
        name: impl Into<String>,
        ty: PropertyType,
        range: Option<Range>,
        generator: ValueGenerator,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if range.is_some() && !ty.is_numeric() {
            return Err(ConfigError::RangeOnNonNumeric { property: name, ty });
        }
        if ty == PropertyType::Integer && range.is_some_and(|r| !r.holds_integer()) {
            return Err(ConfigError::EmptyIntegerRange { property: name });
        }
        Ok(Self {
            name,
            ty,
            range,
            generator,
        })
    }

    /// Produce a fresh live property at `tick`.
    pub fn instantiate(&self, rng: &mut SimRng, tick: Tick) -> Property {
        Property {
            name: self.name.clone(),
            ty: self.ty,
            value: self.generator.generate(rng),
            range: self.range,
            mode: self.generator.mode(),
            created_at: tick,
            last_change: tick,
            changes: 0,
            total_gap: 0,
        }
    }

    /// The definition-level value: the fixed value, or a fresh draw from
    /// the generator when the property is randomised.
    pub fn template_value(&self, rng: &mut SimRng) -> Value {
        self.generator.generate(rng)
    }
}

/// A named, typed, mutable value slot.
#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub name: String,
    pub ty: PropertyType,
    value: Value,
    pub range: Option<Range>,
    pub mode: GenerationMode,
    created_at: Tick,
    last_change: Tick,
    /// Number of value changes recorded so far.
    changes: u64,
    /// Sum of the gaps (in ticks) between consecutive changes.
    total_gap: u64,
}

impl Property {
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Store a new value at `tick`. Integer widens into Float; the result is
    /// clamped to the declared range. When the value actually changes, the
    /// ticks since the prior change are folded into the consistency metric.
    /// Returns the value that was stored.
    pub fn write(&mut self, value: Value, tick: Tick) -> Result<&Value, EvalError> {
        let mut value = value.coerce_to(self.ty, "property write")?;
        if let Some(range) = self.range {
            value = range.clamp(value);
        }
        if value != self.value {
            self.total_gap += tick.saturating_sub(self.last_change);
            self.changes += 1;
            self.last_change = tick;
            self.value = value;
        }
        Ok(&self.value)
    }

    /// Overwrite the initial value of a freshly created property, without
    /// touching the change statistics. Values that do not fit are ignored.
    pub(crate) fn seed(&mut self, value: Value) {
        if let Ok(mut value) = value.coerce_to(self.ty, "seed") {
            if let Some(range) = self.range {
                value = range.clamp(value);
            }
            self.value = value;
        }
    }

    pub fn ticks_since_change(&self, now: Tick) -> u64 {
        now.saturating_sub(self.last_change)
    }

    /// Average ticks between value changes. A property that never changed
    /// reports its whole lifetime.
    pub fn consistency(&self, now: Tick) -> f64 {
        if self.changes == 0 {
            return now.saturating_sub(self.created_at) as f64;
        }
        self.total_gap as f64 / self.changes as f64
    }

    pub fn change_count(&self) -> u64 {
        self.changes
    }
}
