//! popsim-core: a rule-driven population simulator.
//!
//! A `World` holds typed entities with named properties. Rules gated by a
//! tick interval and a probability fire each tick and apply ordered actions
//! to the population, reading values through a small expression language.
//! `SimEngine` wraps a world with a wall-clock timer, run control and an
//! event log.

pub mod action;
pub mod clock;
pub mod command;
pub mod condition;
pub mod config;
pub mod engine;
pub mod entity;
pub mod environment;
pub mod error;
pub mod event;
pub mod expression;
pub mod generator;
pub mod grid;
pub mod population;
pub mod property;
pub mod rng;
pub mod rule;
pub mod scheduler;
pub mod secondary;
pub mod snapshot;
pub mod termination;
pub mod timer;
pub mod types;
pub mod value;
pub mod world;
