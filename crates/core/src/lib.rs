// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod channel;
pub mod log;
pub mod peripherals;
pub mod snapshot;
pub mod world;

pub use board::{Board, BoardState};
pub use log::EventLog;
pub use world::World;

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("GPIO pin {pin} out of range (bank has {count} pins)")]
    InvalidPin { pin: usize, count: usize },
    #[error("Timer frequency must be greater than 0 Hz")]
    InvalidFrequency(u32),
    #[error("UART buffer capacity must be at least 1 byte")]
    InvalidCapacity(usize),
    #[error("Timer already running at {0} Hz")]
    TimerAlreadyRunning(u32),
    #[error("Unknown board '{0}'")]
    UnknownBoard(String),
    #[error("Channel error: {0}")]
    Channel(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Locks a mutex, recovering the data if a background task panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
