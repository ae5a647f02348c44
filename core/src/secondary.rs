//! Secondary entity selection: pick auxiliary entities for an action.

use crate::{
    condition::Condition,
    environment::Environment,
    error::{ConfigError, EvalError},
    expression::EvalContext,
    population::PopulationStore,
    rng::SimRng,
    types::{EntityId, Tick},
};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCount {
    All,
    Count(usize),
}

impl FromStr for SelectionCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Self::Count(n)),
            _ => Err(ConfigError::InvalidSelectionCount(s.to_string())),
        }
    }
}

impl fmt::Display for SelectionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Stateless descriptor, evaluated afresh each time an action needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryEntitySelector {
    pub target_type: String,
    pub count: SelectionCount,
    /// Candidates qualify when any filter holds. No filters: everyone does.
    pub filters: Vec<Condition>,
}

impl SecondaryEntitySelector {
    pub fn choose(
        &self,
        population: &PopulationStore,
        environment: &Environment,
        tick: Tick,
        rng: &mut SimRng,
    ) -> Result<Vec<EntityId>, EvalError> {
        let candidates = population.ids_of_type(&self.target_type);
        let n = match self.count {
            SelectionCount::All => return Ok(candidates),
            SelectionCount::Count(n) => n,
        };

        let mut subset = Vec::with_capacity(candidates.len());
        for id in candidates {
            let entity = population.get(id).ok_or(EvalError::EntityNotFound(id))?;
            if self.filters.is_empty() {
                subset.push(id);
                continue;
            }
            let ctx = EvalContext {
                population,
                environment,
                main: entity,
                secondary: None,
                tick,
            };
            let mut hit = false;
            for filter in &self.filters {
                if filter.evaluate(&ctx, rng)? {
                    hit = true;
                    break;
                }
            }
            if hit {
                subset.push(id);
            }
        }

        Ok(rng.sample(&mut subset, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_parses_all_and_positive_integers() {
        assert_eq!("ALL".parse::<SelectionCount>().unwrap(), SelectionCount::All);
        assert_eq!("all".parse::<SelectionCount>().unwrap(), SelectionCount::All);
        assert_eq!("3".parse::<SelectionCount>().unwrap(), SelectionCount::Count(3));
        assert!("0".parse::<SelectionCount>().is_err());
        assert!("-2".parse::<SelectionCount>().is_err());
        assert!("some".parse::<SelectionCount>().is_err());
    }
}
