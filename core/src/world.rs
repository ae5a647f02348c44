//! The world: the single context object a run threads through every tick.
//!
//! TICK ORDER (fixed):
//!   1. Grid movement (when a grid is configured)
//!   2. Rule scheduler
//!   3. Clock advance
//!   4. Termination check

use crate::{
    action::{Action, ActionScope, Binding},
    clock::SimClock,
    environment::Environment,
    error::{SimError, SimResult},
    population::{CommitReport, PopulationStore},
    rng::{RngBank, RunStreams},
    scheduler::{RuleScheduler, TickReport},
    snapshot::{RunStatus, WorldSnapshot},
    termination::{CompletionReason, TerminationSet},
    types::Tick,
    value::Value,
};

pub struct World {
    population: PopulationStore,
    environment: Environment,
    scheduler: RuleScheduler,
    terminations: TerminationSet,
    clock: SimClock,
    streams: RunStreams,
    seed: u64,
    status: RunStatus,
}

impl World {
    /// Assemble a world from validated parts. Nothing is generated until
    /// `start`.
    pub fn new(
        population: PopulationStore,
        environment: Environment,
        scheduler: RuleScheduler,
        terminations: TerminationSet,
        seed: u64,
    ) -> Self {
        let bank = RngBank::new(seed);
        Self {
            population,
            environment,
            scheduler,
            terminations,
            clock: SimClock::new(),
            streams: RunStreams::from_bank(&bank),
            seed,
            status: RunStatus::Pending,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn population(&self) -> &PopulationStore {
        &self.population
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn scheduler(&self) -> &RuleScheduler {
        &self.scheduler
    }

    pub fn terminations(&self) -> &TerminationSet {
        &self.terminations
    }

    /// Fix an environment variable for this run. Only before `start`.
    pub fn set_environment(&mut self, name: &str, value: Value) -> SimResult<()> {
        if self.status != RunStatus::Pending {
            return Err(anyhow::anyhow!("environment is fixed once the run has started").into());
        }
        self.environment.set_override(name, value)?;
        Ok(())
    }

    /// Generate the environment and the initial population. Returns the
    /// entities created.
    pub fn start(&mut self) -> SimResult<CommitReport> {
        if let RunStatus::Completed(reason) = self.status {
            return Err(SimError::RunCompleted {
                reason: reason.to_string(),
            });
        }
        if self.status == RunStatus::Running {
            return Ok(CommitReport::default());
        }
        let tick = self.clock.current_tick;
        self.environment.initialize(&mut self.streams.generation, tick);
        let report = self.population.populate(&mut self.streams.generation, tick);
        log::info!(
            "tick={tick} world: started with {} entities (seed {})",
            report.born.len(),
            self.seed
        );
        self.status = RunStatus::Running;
        Ok(report)
    }

    /// Run one tick. `elapsed_seconds` feeds the `Seconds` termination.
    pub fn tick(&mut self, elapsed_seconds: u64) -> SimResult<TickReport> {
        self.ensure_running()?;
        let tick = self.clock.current_tick;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        report.moved = self.population.step_grid(&mut self.streams.movement);
        self.scheduler.run_tick(
            &mut self.population,
            &self.environment,
            &mut self.streams,
            tick,
            &mut report,
        );
        let done = self.clock.advance();

        if let Some(reason) = self.terminations.check(done, elapsed_seconds) {
            self.complete(reason);
        }
        Ok(report)
    }

    /// Check only the wall-clock side, between ticks.
    pub fn check_elapsed(&mut self, elapsed_seconds: u64) -> Option<CompletionReason> {
        if self.status != RunStatus::Running {
            return None;
        }
        let reason = self
            .terminations
            .check(self.clock.current_tick, elapsed_seconds)?;
        self.complete(reason);
        Some(reason)
    }

    /// Mark the run finished. Later calls keep the first reason.
    pub fn complete(&mut self, reason: CompletionReason) {
        if let RunStatus::Completed(_) = self.status {
            return;
        }
        log::info!(
            "tick={} world: run completed, {reason}",
            self.clock.current_tick
        );
        self.status = RunStatus::Completed(reason);
    }

    fn ensure_running(&self) -> SimResult<()> {
        match self.status {
            RunStatus::Pending => Err(SimError::RunNotStarted),
            RunStatus::Completed(reason) => Err(SimError::RunCompleted {
                reason: reason.to_string(),
            }),
            RunStatus::Running => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Apply one action outside the rule schedule, between ticks, and
    /// commit its kills and births at once.
    pub fn apply(&mut self, action: &Action, binding: Binding) -> SimResult<CommitReport> {
        self.ensure_running()?;
        let tick = self.clock.current_tick;
        let mut scope = ActionScope {
            population: &mut self.population,
            environment: &self.environment,
            expression_rng: &mut self.streams.expression,
            generation_rng: &mut self.streams.generation,
            tick,
        };
        action.apply(&mut scope, binding)?;
        Ok(self.population.commit(&mut self.streams.generation))
    }

    pub fn snapshot(&self, run_id: &str) -> WorldSnapshot {
        WorldSnapshot::capture(run_id, self)
    }
}
