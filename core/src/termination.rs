//! Termination rules and completion reasons.

use crate::{error::ConfigError, types::Tick};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Ticks,
    Seconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationRule {
    pub kind: TerminationKind,
    pub threshold: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "count", rename_all = "snake_case")]
pub enum CompletionReason {
    Ticks(u64),
    Seconds(u64),
    Stopped,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticks(n) => write!(f, "reached {n} ticks"),
            Self::Seconds(n) => write!(f, "reached {n} seconds"),
            Self::Stopped => f.write_str("stopped by user"),
        }
    }
}

/// At most one rule per kind; the run stops when any is satisfied.
#[derive(Debug, Clone, Default)]
pub struct TerminationSet {
    rules: BTreeMap<TerminationKind, u64>,
}

impl TerminationSet {
    pub fn new(rules: impl IntoIterator<Item = TerminationRule>) -> Result<Self, ConfigError> {
        let mut by_kind = BTreeMap::new();
        for rule in rules {
            if rule.threshold == 0 {
                return Err(ConfigError::InvalidTermination(rule.threshold));
            }
            if by_kind.insert(rule.kind, rule.threshold).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "termination",
                    name: format!("{:?}", rule.kind).to_lowercase(),
                });
            }
        }
        if by_kind.is_empty() {
            return Err(ConfigError::NoTermination);
        }
        Ok(Self { rules: by_kind })
    }

    pub fn threshold(&self, kind: TerminationKind) -> Option<u64> {
        self.rules.get(&kind).copied()
    }

    /// `ticks_done` counts completed ticks.
    pub fn check(&self, ticks_done: Tick, elapsed_seconds: u64) -> Option<CompletionReason> {
        self.rules.iter().find_map(|(kind, threshold)| match kind {
            TerminationKind::Ticks if ticks_done >= *threshold => {
                Some(CompletionReason::Ticks(*threshold))
            }
            TerminationKind::Seconds if elapsed_seconds >= *threshold => {
                Some(CompletionReason::Seconds(*threshold))
            }
            _ => None,
        })
    }
}
