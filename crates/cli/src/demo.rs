// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Two-board exchange: B sends a byte to A, A shows it on its pins, inverts
//! them and answers, B shows the answer on its pins.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;
use twinboard_core::channel::ChannelBackend;
use twinboard_core::peripherals::ClockHandle;
use twinboard_core::snapshot::WorldSnapshot;
use twinboard_core::World;

pub const BOARD_A: &str = "BoardA";
pub const BOARD_B: &str = "BoardB";
const GPIO_PINS: usize = 8;
const BUFFER_SIZE: usize = 16;
const TIMER_HZ: u32 = 2;

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub received_by_a: u8,
    pub received_by_b: u8,
    pub gpio_a: String,
    pub gpio_b: String,
    pub world: WorldSnapshot,
}

pub fn run_demo(dir: &Path, backend: ChannelBackend, request: u8, reply: u8) -> Result<DemoReport> {
    let rx_a = dir.join("A_RX").to_string_lossy().into_owned();
    let rx_b = dir.join("B_RX").to_string_lossy().into_owned();

    let mut world = World::new("demo", backend);
    let channels = world.channels();
    // Stale FIFOs from an interrupted run would be reused with old data.
    channels.remove(&rx_a)?;
    channels.remove(&rx_b)?;

    world.add_board(BOARD_A, GPIO_PINS).init_timer(TIMER_HZ)?;
    world.board_mut(BOARD_A)?.init_uart(&rx_a, BUFFER_SIZE)?;
    world.add_board(BOARD_B, GPIO_PINS).init_uart(&rx_b, BUFFER_SIZE)?;
    if !world.cross_link(BOARD_A, BOARD_B)? {
        bail!("Failed to cross-link {} and {}", BOARD_A, BOARD_B);
    }

    let a_clock = world.board(BOARD_A)?.clock();

    info!("{} -> {}: {:#04x}", BOARD_B, BOARD_A, request);
    send(&mut world, BOARD_B, BOARD_A, request)?;
    tick(&a_clock, "waiting for the request")?;

    let a = world.board_mut(BOARD_A)?;
    let received_by_a = a.read_byte_uart();
    a.gpio_mut().write_bits(received_by_a as u64);
    tick(&a_clock, "mirroring the request")?;
    for pin in 0..GPIO_PINS {
        a.toggle_gpio(pin)?;
    }
    info!("{} -> {}: {:#04x}", BOARD_A, BOARD_B, reply);
    send(&mut world, BOARD_A, BOARD_B, reply)?;
    tick(&a_clock, "waiting for the reply")?;

    let b = world.board_mut(BOARD_B)?;
    let received_by_b = b.read_byte_uart();
    b.gpio_mut().write_bits(received_by_b as u64);

    for name in [BOARD_A, BOARD_B] {
        world.board(name)?.clear_uart_buffer();
    }

    let report = DemoReport {
        received_by_a,
        received_by_b,
        gpio_a: world.board(BOARD_A)?.gpio().to_string(),
        gpio_b: world.board(BOARD_B)?.gpio().to_string(),
        world: world.snapshot(),
    };

    world.remove_streams();
    world.shutdown_all();
    Ok(report)
}

fn send(world: &mut World, from: &str, to: &str, byte: u8) -> Result<()> {
    if !world.board_mut(from)?.send_byte_uart(byte) {
        bail!("{} failed to send {:#04x} to {}", from, byte, to);
    }
    Ok(())
}

fn tick(clock: &ClockHandle, step: &str) -> Result<()> {
    if !clock.wait_for_cycles(1) {
        bail!("Clock stopped while {}", step);
    }
    Ok(())
}

pub fn print_report(report: &DemoReport, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("Failed to encode demo report")?;
        println!("{}", out);
        return Ok(());
    }

    println!("A GPIO: {}", report.gpio_a);
    println!("B GPIO: {}", report.gpio_b);
    for board in report.world.boards.values() {
        println!("--- {} log ---", board.name);
        for entry in &board.log {
            println!("{}", entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlinked_send_aborts() {
        let mut world = World::new("test", ChannelBackend::Memory);
        world.add_board(BOARD_A, GPIO_PINS).init_uart("A_RX", BUFFER_SIZE).unwrap();
        world.add_board(BOARD_B, GPIO_PINS);

        let err = send(&mut world, BOARD_B, BOARD_A, b'Z').unwrap_err();
        assert!(err.to_string().contains("BoardB failed to send 0x5a"));
    }

    #[test]
    fn test_stopped_clock_aborts() {
        let mut world = World::new("test", ChannelBackend::Memory);
        let clock = world.add_board(BOARD_A, GPIO_PINS).clock();
        let err = tick(&clock, "waiting for the reply").unwrap_err();
        assert!(err.to_string().contains("waiting for the reply"));
    }
}
