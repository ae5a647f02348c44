//! Wall-clock run timer and run control.
//!
//! The timer runs on its own thread and publishes whole elapsed seconds
//! through an atomic counter, which the tick loop reads for `Seconds`
//! termination. Pause, resume and stop are transitions on a mutex-guarded
//! state with a condvar; the tick loop and the timer thread both observe
//! them, so paused time never counts towards the run.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct TimerState {
    paused: bool,
    stop_requested: bool,
    shutdown: bool,
    /// Time accumulated before the current running stretch.
    banked: Duration,
    /// Start of the current running stretch; `None` while paused or idle.
    running_since: Option<Instant>,
}

impl TimerState {
    fn elapsed(&self) -> Duration {
        self.banked + self.running_since.map(|t| t.elapsed()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<TimerState>,
    changed: Condvar,
    seconds: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control handle. Safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    shared: Arc<Shared>,
}

impl RunHandle {
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if !state.paused {
            if let Some(since) = state.running_since.take() {
                state.banked += since.elapsed();
            }
            state.paused = true;
            self.shared.changed.notify_all();
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock();
        if state.paused {
            state.paused = false;
            if !state.shutdown {
                state.running_since = Some(Instant::now());
            }
            self.shared.changed.notify_all();
        }
    }

    /// Ask the tick loop to stop before its next tick.
    pub fn request_stop(&self) {
        let mut state = self.shared.lock();
        state.stop_requested = true;
        self.shared.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.lock().stop_requested
    }

    /// Whole seconds published by the timer thread.
    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.seconds.load(Ordering::Acquire)
    }

    /// Block while paused. Returns early when a stop is requested.
    pub fn wait_while_paused(&self) {
        let mut state = self.shared.lock();
        while state.paused && !state.stop_requested {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Owns the timer thread. Dropping it shuts the thread down.
#[derive(Debug)]
pub struct RunTimer {
    handle: RunHandle,
    thread: Option<JoinHandle<()>>,
}

impl RunTimer {
    /// Start counting now, on a fresh thread.
    pub fn start(handle: RunHandle) -> Self {
        {
            let mut state = handle.shared.lock();
            if !state.paused {
                state.running_since = Some(Instant::now());
            }
        }
        let shared = Arc::clone(&handle.shared);
        let thread = thread::Builder::new()
            .name("run-timer".into())
            .spawn(move || tick_seconds(&shared))
            .map_err(|e| log::warn!("timer: could not spawn timer thread: {e}"))
            .ok();
        Self { handle, thread }
    }

    pub fn handle(&self) -> &RunHandle {
        &self.handle
    }

    /// Freeze the published time and join the thread.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.handle.shared.lock();
            if let Some(since) = state.running_since.take() {
                state.banked += since.elapsed();
            }
            state.shutdown = true;
            self.handle
                .shared
                .seconds
                .store(state.banked.as_secs(), Ordering::Release);
            self.handle.shared.changed.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("timer: timer thread panicked");
            }
        }
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tick_seconds(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        if state.paused {
            state = shared.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
            continue;
        }
        let elapsed = state.elapsed();
        shared.seconds.store(elapsed.as_secs(), Ordering::Release);
        // Sleep until the next whole second, or until a transition.
        let until_next = Duration::from_secs(elapsed.as_secs() + 1).saturating_sub(elapsed);
        state = shared
            .changed
            .wait_timeout(state, until_next)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_time_does_not_count() {
        let handle = RunHandle::default();
        handle.pause();
        let mut timer = RunTimer::start(handle.clone());
        thread::sleep(Duration::from_millis(1200));
        timer.shutdown();
        assert_eq!(handle.elapsed_seconds(), 0);
    }

    #[test]
    fn running_time_is_published() {
        let handle = RunHandle::default();
        let mut timer = RunTimer::start(handle.clone());
        thread::sleep(Duration::from_millis(1300));
        timer.shutdown();
        assert_eq!(handle.elapsed_seconds(), 1);
    }

    #[test]
    fn stop_request_releases_a_paused_waiter() {
        let handle = RunHandle::default();
        handle.pause();
        let waiter = {
            let handle = handle.clone();
            thread::spawn(move || handle.wait_while_paused())
        };
        handle.request_stop();
        waiter.join().unwrap();
        assert!(handle.is_stop_requested());
    }
}
