//! Shared primitive types used across the entire simulation.

/// A simulation tick. Ticks are numbered from 0.
pub type Tick = u64;

/// A run-scoped entity identifier, allocated in creation order.
pub type EntityId = u64;

/// The canonical run identifier.
pub type RunId = String;
