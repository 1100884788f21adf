// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod gpio;
pub mod timer;
pub mod uart;

pub use gpio::GpioBank;
pub use timer::{ClockHandle, TimerEngine};
pub use uart::{ReceiverState, UartEngine};
