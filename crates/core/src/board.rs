// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::channel::ChannelProvider;
use crate::peripherals::{ClockHandle, GpioBank, TimerEngine, UartEngine};
use crate::snapshot::{BoardSnapshot, UartSnapshot};
use crate::{EventLog, SimResult};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Uninitialized,
    Running,
    Stopped,
}

/// One simulated board: a GPIO bank, a pipe-backed UART and a hardware
/// clock, plus the event log they all write to.
///
/// Every operation takes `&self`/`&mut self`, so the foreground thread is the
/// only one touching GPIO and the log outside of the engines' own tasks.
#[derive(Debug)]
pub struct Board {
    name: String,
    state: BoardState,
    gpio: GpioBank,
    uart: UartEngine,
    timer: TimerEngine,
    log: EventLog,
}

impl Board {
    /// A board whose UART runs over OS named pipes.
    #[cfg(unix)]
    pub fn new(name: &str, gpio_pins: usize) -> Self {
        Self::with_channels(name, gpio_pins, Arc::new(crate::channel::FifoChannels))
    }

    pub fn with_channels(
        name: &str,
        gpio_pins: usize,
        channels: Arc<dyn ChannelProvider>,
    ) -> Self {
        let log = EventLog::new(name);
        log.push(format!("Board created: {}", name));
        Self {
            name: name.to_string(),
            state: BoardState::Uninitialized,
            gpio: GpioBank::new(gpio_pins),
            uart: UartEngine::new(channels, log.clone()),
            timer: TimerEngine::new(log.clone()),
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn uart(&self) -> &UartEngine {
        &self.uart
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn gpio(&self) -> &GpioBank {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut GpioBank {
        &mut self.gpio
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    // UART

    /// Returns `Ok(false)` when a receiver is already running.
    pub fn init_uart(&mut self, rx_path: &str, buffer_size: usize) -> SimResult<bool> {
        let started = self.uart.init_receiver(rx_path, buffer_size)?;
        if started {
            self.state = BoardState::Running;
        }
        Ok(started)
    }

    pub fn set_uart_poll_interval(&mut self, interval: Duration) {
        self.uart.set_poll_interval(interval);
    }

    pub fn connect_uart(&mut self, tx_path: &str) -> bool {
        self.uart.connect_transmitter(tx_path)
    }

    pub fn connect_uart_retrying(&mut self, tx_path: &str, attempts: u32, delay: Duration) -> bool {
        self.uart.connect_transmitter_retrying(tx_path, attempts, delay)
    }

    pub fn disconnect_uart(&mut self) {
        self.uart.disconnect_transmitter();
    }

    pub fn send_byte_uart(&mut self, byte: u8) -> bool {
        self.uart.send(byte)
    }

    /// Oldest received byte, or `0x00` when nothing is buffered.
    pub fn read_byte_uart(&self) -> u8 {
        self.uart.receive()
    }

    pub fn try_read_byte_uart(&self) -> Option<u8> {
        self.uart.try_receive()
    }

    pub fn is_uart_buffer_full(&self) -> bool {
        self.uart.is_full()
    }

    pub fn clear_uart_buffer(&self) {
        self.uart.clear();
    }

    // Timer

    pub fn init_timer(&mut self, frequency_hz: u32) -> SimResult<()> {
        self.timer.start(frequency_hz)?;
        self.state = BoardState::Running;
        Ok(())
    }

    pub fn clock_cycle(&self) -> u64 {
        self.timer.current_cycle()
    }

    /// Blocks until `cycles` ticks have elapsed. False if the timer is not running.
    pub fn delay_clock_cycles(&self, cycles: u64) -> bool {
        self.timer.wait_for_cycles(cycles)
    }

    pub fn clock(&self) -> ClockHandle {
        self.timer.handle()
    }

    // GPIO

    pub fn gpio_count(&self) -> usize {
        self.gpio.count()
    }

    pub fn read_gpio(&self, pin: usize) -> SimResult<bool> {
        self.gpio.read(pin)
    }

    pub fn write_gpio(&mut self, pin: usize, value: bool) -> SimResult<bool> {
        self.gpio.write(pin, value)
    }

    pub fn toggle_gpio(&mut self, pin: usize) -> SimResult<bool> {
        self.gpio.toggle(pin)
    }

    // Log

    pub fn dump_log<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.log.dump(out)
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.entries()
    }

    pub fn clear_log(&self) {
        self.log.clear();
    }

    // Lifecycle

    /// Re-initializes GPIO, buffer, counter and log under a new identity.
    ///
    /// Background tasks keep running; the receiver keeps filling the emptied
    /// buffer and the ticker keeps counting from zero.
    pub fn reset(&mut self, name: &str, gpio_pins: usize) {
        self.name = name.to_string();
        self.gpio.reset(gpio_pins);
        self.uart.discard_buffered();
        self.timer.reset_counter();
        self.log.clear();
        self.log.rename(name);
        self.log.push(format!("Board reset: {}", name));
    }

    /// Tears down in dependency order: transmitter, receiver, timer.
    pub fn shutdown(&mut self) {
        if self.state == BoardState::Stopped {
            return;
        }
        self.uart.disconnect_transmitter();
        self.uart.stop_receiver();
        self.timer.stop();
        if self.state == BoardState::Running {
            self.log.push(format!("Board stopped: {}", self.name));
        }
        self.state = BoardState::Stopped;
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            name: self.name.clone(),
            state: self.state,
            gpio: self.gpio.levels().to_vec(),
            cycle: self.timer.current_cycle(),
            timer_hz: self.timer.frequency_hz(),
            uart: UartSnapshot {
                rx_path: self.uart.rx_path().map(str::to_string),
                receiver: self.uart.receiver_state(),
                tx_path: self.uart.tx_path().map(str::to_string),
                connected: self.uart.is_connected(),
                capacity: self.uart.capacity(),
                buffered: self.uart.buffered(),
                overflows: self.uart.overflow_count(),
            },
            log: self.log.entries(),
        }
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::{Board, BoardState};
    use crate::channel::MemoryChannels;
    use crate::peripherals::ReceiverState;
    use std::sync::Arc;

    fn board(name: &str, channels: &MemoryChannels) -> Board {
        Board::with_channels(name, 8, Arc::new(channels.clone()))
    }

    #[test]
    fn test_construction_logs_creation() {
        let channels = MemoryChannels::new();
        let b = board("BoardA", &channels);
        assert_eq!(b.state(), BoardState::Uninitialized);
        assert_eq!(b.log_entries(), vec!["Board created: BoardA".to_string()]);
        assert_eq!(b.gpio_count(), 8);
    }

    #[test]
    fn test_reset_clears_state_but_keeps_tasks() {
        let channels = MemoryChannels::new();
        let mut b = board("BoardA", &channels);
        b.init_uart("A_RX", 4).unwrap();
        b.init_timer(1000).unwrap();
        b.write_gpio(3, true).unwrap();

        b.reset("BoardA2", 4);
        assert_eq!(b.name(), "BoardA2");
        assert_eq!(b.gpio_count(), 4);
        assert!(!b.read_gpio(3).unwrap());
        assert_eq!(b.log_entries(), vec!["Board reset: BoardA2".to_string()]);
        assert!(b.uart().is_receiving());
        assert!(b.timer().is_running());
        assert_eq!(b.state(), BoardState::Running);
    }

    #[test]
    fn test_shutdown_order_and_idempotence() {
        let channels = MemoryChannels::new();
        let mut a = board("BoardA", &channels);
        let mut b = board("BoardB", &channels);
        a.init_uart("A_RX", 4).unwrap();
        b.init_uart("B_RX", 4).unwrap();
        a.init_timer(100).unwrap();
        assert!(a.connect_uart("B_RX"));

        a.shutdown();
        a.shutdown();
        assert_eq!(a.state(), BoardState::Stopped);
        assert_eq!(a.uart().receiver_state(), ReceiverState::Idle);
        assert!(!a.uart().is_connected());
        assert!(!a.timer().is_running());

        let log = a.log_entries();
        let pos = |needle: &str| log.iter().position(|e| e.contains(needle)).unwrap();
        assert!(pos("UART disconnected.") < pos("UART RX stopped"));
        assert!(pos("UART RX stopped") < pos("Timer stopped"));
        assert!(pos("Timer stopped") < pos("Board stopped"));
    }

    #[test]
    fn test_peer_shutdown_breaks_memory_link() {
        let channels = MemoryChannels::new();
        let mut a = board("BoardA", &channels);
        let mut b = board("BoardB", &channels);
        a.init_uart("A_RX", 4).unwrap();
        assert!(b.connect_uart("A_RX"));

        a.shutdown();
        assert!(!b.send_byte_uart(0x11));
        assert!(!b.connect_uart("A_RX"));

        let mut fresh = board("BoardA2", &channels);
        fresh.init_uart("A_RX", 4).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(fresh.try_read_byte_uart(), None);
    }

    #[test]
    fn test_fresh_board_buffer_not_full() {
        let channels = MemoryChannels::new();
        let b = board("BoardA", &channels);
        assert!(!b.is_uart_buffer_full());
    }

    #[test]
    fn test_reset_clears_overflow_count() {
        let channels = MemoryChannels::new();
        let mut a = board("BoardA", &channels);
        let mut b = board("BoardB", &channels);
        a.init_uart("A_RX", 1).unwrap();
        b.connect_uart("A_RX");
        b.send_byte_uart(1);
        b.send_byte_uart(2);
        for _ in 0..2000 {
            if a.uart().overflow_count() == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(a.uart().overflow_count(), 1);

        a.reset("BoardA", 8);
        assert_eq!(a.snapshot().uart.overflows, 0);
    }

    #[test]
    fn test_gpio_errors_surface() {
        let channels = MemoryChannels::new();
        let mut b = board("BoardA", &channels);
        assert!(b.write_gpio(8, true).is_err());
        assert!(b.toggle_gpio(7).unwrap());
    }

    #[test]
    fn test_snapshot_reflects_uart() {
        let channels = MemoryChannels::new();
        let mut b = board("BoardA", &channels);
        b.init_uart("A_RX", 16).unwrap();
        b.connect_uart("NOBODY");

        let snap = b.snapshot();
        assert_eq!(snap.uart.rx_path.as_deref(), Some("A_RX"));
        assert_eq!(snap.uart.capacity, 16);
        assert_eq!(snap.uart.receiver, ReceiverState::Running);
        assert!(!snap.uart.connected);
        assert_eq!(snap.timer_hz, None);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["state"], "running");
    }
}
