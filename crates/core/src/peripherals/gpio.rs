// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::fmt;

/// Fixed-size bank of boolean pins.
///
/// Not synchronized: the owning board hands out `&mut` access only.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GpioBank {
    pins: Vec<bool>,
}

impl GpioBank {
    pub fn new(count: usize) -> Self {
        Self {
            pins: vec![false; count],
        }
    }

    /// Resizes the bank and drives every pin low.
    pub fn reset(&mut self, count: usize) {
        self.pins.clear();
        self.pins.resize(count, false);
    }

    pub fn count(&self) -> usize {
        self.pins.len()
    }

    pub fn levels(&self) -> &[bool] {
        &self.pins
    }

    fn check(&self, pin: usize) -> SimResult<usize> {
        if pin < self.pins.len() {
            Ok(pin)
        } else {
            Err(SimulationError::InvalidPin {
                pin,
                count: self.pins.len(),
            })
        }
    }

    pub fn read(&self, pin: usize) -> SimResult<bool> {
        Ok(self.pins[self.check(pin)?])
    }

    /// Returns the new level.
    pub fn write(&mut self, pin: usize, value: bool) -> SimResult<bool> {
        let pin = self.check(pin)?;
        self.pins[pin] = value;
        Ok(value)
    }

    /// Returns the new level.
    pub fn toggle(&mut self, pin: usize) -> SimResult<bool> {
        let pin = self.check(pin)?;
        self.pins[pin] = !self.pins[pin];
        Ok(self.pins[pin])
    }

    /// Drives pin `i` to bit `i` of `value` for the low 64 pins.
    pub fn write_bits(&mut self, value: u64) {
        for (i, pin) in self.pins.iter_mut().take(64).enumerate() {
            *pin = (value >> i) & 1 == 1;
        }
    }

    /// Packs the low 64 pins into an integer, pin 0 as bit 0.
    pub fn read_bits(&self) -> u64 {
        self.pins
            .iter()
            .take(64)
            .enumerate()
            .fold(0, |acc, (i, &on)| acc | ((on as u64) << i))
    }
}

/// Highest pin first, like a register dump.
impl fmt::Display for GpioBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &on in self.pins.iter().rev() {
            f.write_str(if on { "1" } else { "0" })?;
        }
        Ok(())
    }
}
