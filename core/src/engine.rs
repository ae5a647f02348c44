//! The run engine: owns one world, its wall-clock timer and its event log.
//!
//! EXECUTION ORDER per `step` (fixed):
//!   1. Honour a pending stop request
//!   2. Skip the step while paused
//!   3. Check the `Seconds` termination against the timer
//!   4. Run one world tick
//!   5. Record the tick's events
//!
//! RULES:
//!   - The tick loop is single-threaded. Only the timer runs elsewhere.
//!   - Pause, resume and stop take effect between ticks, never inside one.
//!   - Once completed, a run never ticks again.

use crate::{
    config::WorldConfig,
    error::{SimError, SimResult},
    event::{EventLogEntry, SimEvent},
    population::CommitReport,
    scheduler::TickReport,
    snapshot::{RunResult, RunStatus, WorldSnapshot},
    termination::CompletionReason,
    timer::{RunHandle, RunTimer},
    types::{RunId, Tick},
    world::World,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

pub struct SimEngine {
    pub run_id: RunId,
    world: World,
    control: RunHandle,
    timer: Option<RunTimer>,
    events: Vec<EventLogEntry>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    initial_populations: BTreeMap<String, usize>,
}

impl SimEngine {
    pub fn new(world: World) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            world,
            control: RunHandle::default(),
            timer: None,
            events: Vec::new(),
            started_at: None,
            finished_at: None,
            initial_populations: BTreeMap::new(),
        }
    }

    /// Validate a descriptor and wrap the resulting world.
    pub fn build(config: &WorldConfig) -> SimResult<Self> {
        Ok(Self::new(config.build()?))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access before the run starts (environment overrides).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// A handle for pausing or stopping the run from another thread.
    pub fn control(&self) -> RunHandle {
        self.control.clone()
    }

    pub fn events(&self) -> &[EventLogEntry] {
        &self.events
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.world.status(), RunStatus::Completed(_))
    }

    /// Generate the population and start the timer. Idempotent.
    pub fn start(&mut self) -> SimResult<()> {
        if self.world.status() != RunStatus::Pending {
            if let RunStatus::Completed(reason) = self.world.status() {
                return Err(SimError::RunCompleted {
                    reason: reason.to_string(),
                });
            }
            return Ok(());
        }
        let born = self.world.start()?;
        self.record(
            0,
            SimEvent::RunStarted {
                run_id: self.run_id.clone(),
                seed: self.world.seed(),
            },
        );
        self.record_commits(0, &born);
        self.initial_populations = self.world.population().counts();
        self.started_at = Some(Utc::now());
        self.timer = Some(RunTimer::start(self.control.clone()));
        log::info!("tick=0 engine: run {} started", self.run_id);
        Ok(())
    }

    /// Advance one tick. Returns `None` when nothing ran: the run is paused,
    /// or it completed before the tick (stop request or elapsed time).
    pub fn step(&mut self) -> SimResult<Option<TickReport>> {
        self.start()?;

        if self.control.is_stop_requested() {
            self.finish(CompletionReason::Stopped);
            return Ok(None);
        }
        if self.control.is_paused() {
            return Ok(None);
        }

        let elapsed = self.control.elapsed_seconds();
        if let Some(reason) = self.world.check_elapsed(elapsed) {
            self.finish(reason);
            return Ok(None);
        }

        let report = self.world.tick(elapsed)?;
        self.record_tick(&report);
        if let RunStatus::Completed(reason) = self.world.status() {
            self.finish(reason);
        }
        Ok(Some(report))
    }

    /// Run up to `n` ticks. Stops early on completion or pause. Returns the
    /// number of ticks actually run.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<u64> {
        let mut ran = 0;
        for _ in 0..n {
            if self.is_completed() {
                break;
            }
            match self.step()? {
                Some(_) => ran += 1,
                None => break,
            }
        }
        Ok(ran)
    }

    /// Tick until a termination rule or a stop ends the run. Blocks while
    /// paused.
    pub fn run_to_completion(&mut self) -> SimResult<RunResult> {
        self.start()?;
        while !self.is_completed() {
            self.control.wait_while_paused();
            self.step()?;
        }
        self.result().ok_or(SimError::RunNotStarted)
    }

    pub fn pause(&self) {
        if !self.control.is_paused() {
            log::info!("tick={} engine: paused", self.world.current_tick());
            self.control.pause();
        }
    }

    pub fn resume(&self) {
        if self.control.is_paused() {
            log::info!("tick={} engine: resumed", self.world.current_tick());
            self.control.resume();
        }
    }

    /// Stop the run. A running world completes immediately with
    /// "stopped by user"; a pending one completes on its first step.
    pub fn stop(&mut self) {
        self.control.request_stop();
        if self.world.is_running() {
            self.finish(CompletionReason::Stopped);
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot(&self.run_id)
    }

    /// Summary of the run, once it has completed.
    pub fn result(&self) -> Option<RunResult> {
        let RunStatus::Completed(reason) = self.world.status() else {
            return None;
        };
        let started_at = self.started_at?;
        Some(RunResult {
            run_id: self.run_id.clone(),
            seed: self.world.seed(),
            started_at,
            finished_at: self.finished_at.unwrap_or(started_at),
            ticks: self.world.current_tick(),
            elapsed_seconds: self.control.elapsed_seconds(),
            reason,
            termination: reason.to_string(),
            initial_populations: self.initial_populations.clone(),
            final_populations: self.world.population().counts(),
        })
    }

    fn finish(&mut self, reason: CompletionReason) {
        if self.finished_at.is_some() {
            return;
        }
        self.world.complete(reason);
        if let Some(mut timer) = self.timer.take() {
            timer.shutdown();
        }
        let tick = self.world.current_tick();
        self.record(tick, SimEvent::RunTerminated { tick, reason });
        self.finished_at = Some(Utc::now());
        log::info!(
            "tick={tick} engine: run {} finished after {}s, {reason}",
            self.run_id,
            self.control.elapsed_seconds()
        );
    }

    fn record_tick(&mut self, report: &TickReport) {
        let tick = report.tick;
        for rule in &report.fired {
            self.record(
                tick,
                SimEvent::RuleFired {
                    tick,
                    rule: rule.clone(),
                },
            );
        }
        for failure in &report.failures {
            self.record(
                tick,
                SimEvent::ActionFailed {
                    tick,
                    rule: failure.rule.clone(),
                    action: failure.action.to_string(),
                    entity: failure.entity,
                    error: failure.error.to_string(),
                },
            );
        }
        self.record_commits(tick, &report.commits);
        self.record(tick, SimEvent::TickCompleted { tick });
    }

    fn record_commits(&mut self, tick: Tick, commits: &CommitReport) {
        for (entity_id, entity_type) in &commits.killed {
            self.record(
                tick,
                SimEvent::EntityKilled {
                    tick,
                    entity_id: *entity_id,
                    entity_type: entity_type.clone(),
                },
            );
        }
        for (entity_id, entity_type) in &commits.born {
            self.record(
                tick,
                SimEvent::EntityCreated {
                    tick,
                    entity_id: *entity_id,
                    entity_type: entity_type.clone(),
                },
            );
        }
    }

    fn record(&mut self, tick: Tick, event: SimEvent) {
        self.events.push(EventLogEntry {
            seq: self.events.len() as u64,
            run_id: self.run_id.clone(),
            tick,
            event_type: event.event_type().to_string(),
            event,
        });
    }
}
