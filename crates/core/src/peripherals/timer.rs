// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{lock, EventLog, SimResult, SimulationError};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Upper bound on a single condvar wait, so a waiter re-checks state even
/// if a notification is missed.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Interval between ticks for a given frequency.
pub fn tick_period(frequency_hz: u32) -> SimResult<Duration> {
    if frequency_hz == 0 {
        return Err(SimulationError::InvalidFrequency(frequency_hz));
    }
    Ok(Duration::from_nanos(
        (NSEC_PER_SEC / frequency_hz as u64).max(1),
    ))
}

#[derive(Debug, Default)]
struct ClockState {
    cycles: AtomicU64,
    // Ticks since start; unaffected by counter resets, so waits stay relative.
    ticks_total: AtomicU64,
    running: AtomicBool,
    gate: Mutex<()>,
    ticked: Condvar,
}

impl ClockState {
    fn notify(&self) {
        let _gate = lock(&self.gate);
        self.ticked.notify_all();
    }
}

/// Shareable read-only view of a timer's cycle counter.
///
/// Lets other threads observe or wait on a board's clock without borrowing
/// the board.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    state: Arc<ClockState>,
}

impl ClockHandle {
    pub fn current_cycle(&self) -> u64 {
        self.state.cycles.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Blocks until at least `cycles` ticks have elapsed since the call,
    /// regardless of counter resets in between.
    ///
    /// Returns false if the timer is not running, or stops before the target
    /// is reached.
    pub fn wait_for_cycles(&self, cycles: u64) -> bool {
        if cycles == 0 {
            return true;
        }
        let ticks = || self.state.ticks_total.load(Ordering::SeqCst);
        let target = ticks().saturating_add(cycles);
        let mut gate = lock(&self.state.gate);
        loop {
            if ticks() >= target {
                return true;
            }
            if !self.is_running() {
                return false;
            }
            gate = self
                .state
                .ticked
                .wait_timeout(gate, WAIT_SLICE)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| PoisonError::into_inner(e).0);
        }
    }
}

struct TickTask {
    // Dropping the sender cancels the task.
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// Hardware clock: a background task bumps a monotonic cycle counter at a
/// fixed frequency.
pub struct TimerEngine {
    log: EventLog,
    state: Arc<ClockState>,
    frequency_hz: u32,
    task: Option<TickTask>,
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("frequency_hz", &self.frequency_hz)
            .field("cycle", &self.current_cycle())
            .field("running", &self.is_running())
            .finish()
    }
}

impl TimerEngine {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            state: Arc::new(ClockState::default()),
            frequency_hz: 0,
            task: None,
        }
    }

    pub fn start(&mut self, frequency_hz: u32) -> SimResult<()> {
        let period = match tick_period(frequency_hz) {
            Ok(period) => period,
            Err(e) => {
                self.log
                    .push(format!("Timer start rejected: {} Hz is not a valid frequency", frequency_hz));
                return Err(e);
            }
        };
        if self.task.is_some() {
            self.log.push(format!(
                "Timer already running at {} Hz",
                self.frequency_hz
            ));
            return Err(SimulationError::TimerAlreadyRunning(self.frequency_hz));
        }

        self.frequency_hz = frequency_hz;
        self.state.running.store(true, Ordering::SeqCst);

        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(0);
        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name(format!("timer:{}hz", frequency_hz))
            .spawn(move || {
                // Absolute deadlines keep the tick rate free of sleep drift.
                let mut next_tick = Instant::now();
                loop {
                    next_tick += period;
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match cancelled.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    state.cycles.fetch_add(1, Ordering::SeqCst);
                    state.ticks_total.fetch_add(1, Ordering::SeqCst);
                    state.notify();
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        self.task = Some(TickTask { cancel, handle });
        self.log.push(format!(
            "Timer started with frequency {} Hz",
            frequency_hz
        ));
        Ok(())
    }

    /// Stops and joins the tick task. The counter is frozen afterwards.
    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        drop(task.cancel);
        if task.handle.join().is_err() {
            tracing::error!("Timer task panicked");
        }
        self.state.running.store(false, Ordering::SeqCst);
        self.state.notify();
        self.log.push(format!(
            "Timer stopped at cycle {}",
            self.current_cycle()
        ));
    }

    pub fn current_cycle(&self) -> u64 {
        self.state.cycles.load(Ordering::SeqCst)
    }

    pub fn wait_for_cycles(&self, cycles: u64) -> bool {
        self.handle().wait_for_cycles(cycles)
    }

    /// Rewinds the visible counter to zero. Pending waits are unaffected.
    pub fn reset_counter(&self) {
        self.state.cycles.store(0, Ordering::SeqCst);
    }

    pub fn frequency_hz(&self) -> Option<u32> {
        self.is_running().then_some(self.frequency_hz)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            state: self.state.clone(),
        }
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
