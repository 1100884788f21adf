// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::channel::{ChannelBackend, ChannelProvider};
use crate::snapshot::WorldSnapshot;
use crate::{Board, SimResult, SimulationError};
use anyhow::Context;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A named set of boards sharing one channel namespace.
///
/// Boards are wired UART-to-UART with [`World::link`]; receivers must be
/// initialized before anything links to them, since a transmitter can only
/// open a stream its peer has already created.
pub struct World {
    pub name: String,
    channels: Arc<dyn ChannelProvider>,
    boards: BTreeMap<String, Board>,
}

impl World {
    pub fn new(name: &str, backend: ChannelBackend) -> Self {
        Self::with_channels(name, backend.provider())
    }

    pub fn with_channels(name: &str, channels: Arc<dyn ChannelProvider>) -> Self {
        Self {
            name: name.to_string(),
            channels,
            boards: BTreeMap::new(),
        }
    }

    pub fn channels(&self) -> Arc<dyn ChannelProvider> {
        self.channels.clone()
    }

    /// Adds a board on this world's channels, replacing one of the same name.
    pub fn add_board(&mut self, name: &str, gpio_pins: usize) -> &mut Board {
        let board = Board::with_channels(name, gpio_pins, self.channels.clone());
        match self.boards.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                tracing::warn!("Replacing board '{}' in world '{}'", name, self.name);
                slot.insert(board);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(board),
        }
    }

    pub fn board(&self, name: &str) -> SimResult<&Board> {
        self.boards
            .get(name)
            .ok_or_else(|| SimulationError::UnknownBoard(name.to_string()))
    }

    pub fn board_mut(&mut self, name: &str) -> SimResult<&mut Board> {
        self.boards
            .get_mut(name)
            .ok_or_else(|| SimulationError::UnknownBoard(name.to_string()))
    }

    pub fn boards(&self) -> impl Iterator<Item = &Board> {
        self.boards.values()
    }

    /// Connects the transmitter of `from` to the receiver of `to`.
    ///
    /// Returns false when `to` has no receiver or the connection could not
    /// be opened within `attempts`.
    pub fn link(&mut self, from: &str, to: &str, attempts: u32, delay: Duration) -> SimResult<bool> {
        let rx_path = self.board(to)?.uart().rx_path().map(str::to_string);
        let source = self.board_mut(from)?;
        let Some(rx_path) = rx_path else {
            source
                .log()
                .push(format!("UART link to {} failed: no receiver initialized", to));
            return Ok(false);
        };
        let connected = source.connect_uart_retrying(&rx_path, attempts, delay);
        if connected {
            tracing::info!("Linked {} -> {} via {}", from, to, rx_path);
        }
        Ok(connected)
    }

    /// Links two boards in both directions.
    pub fn cross_link(&mut self, a: &str, b: &str) -> SimResult<bool> {
        let forward = self.link(a, b, 1, Duration::ZERO)?;
        let backward = self.link(b, a, 1, Duration::ZERO)?;
        Ok(forward && backward)
    }

    /// Builds and wires a world from a manifest.
    ///
    /// Relative FIFO paths resolve against `root_dir`. All timers and
    /// receivers start before any link is attempted.
    pub fn from_manifest(
        manifest: &twinboard_config::WorldManifest,
        root_dir: &Path,
    ) -> anyhow::Result<Self> {
        manifest.validate()?;
        let backend = ChannelBackend::from(manifest.channels);
        let mut world = Self::new(&manifest.name, backend);

        for cfg in &manifest.boards {
            let board = world.add_board(&cfg.name, cfg.gpio_pins);
            if let Some(timer) = &cfg.timer {
                board
                    .init_timer(timer.frequency_hz)
                    .with_context(|| format!("Board '{}': failed to start timer", cfg.name))?;
            }
        }

        for cfg in &manifest.boards {
            let Some(uart) = &cfg.uart else {
                continue;
            };
            let rx_path = match backend {
                ChannelBackend::Fifo => root_dir.join(&uart.rx_path).to_string_lossy().into_owned(),
                ChannelBackend::Memory => uart.rx_path.clone(),
            };
            let capacity = uart.buffer_size.bytes()? as usize;
            let board = world.board_mut(&cfg.name)?;
            board.set_uart_poll_interval(Duration::from_micros(uart.poll_interval_us));
            board
                .init_uart(&rx_path, capacity)
                .with_context(|| format!("Board '{}': failed to open {}", cfg.name, rx_path))?;
        }

        for link in &manifest.links {
            let delay = Duration::from_millis(link.retry_delay_ms);
            if !world.link(&link.from, &link.to, link.retries, delay)? {
                tracing::warn!(
                    "Link {} -> {} not established after {} attempt(s)",
                    link.from,
                    link.to,
                    link.retries
                );
            }
        }

        Ok(world)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            name: self.name.clone(),
            boards: self
                .boards
                .iter()
                .map(|(name, board)| (name.clone(), board.snapshot()))
                .collect(),
        }
    }

    /// Stops every board: all transmitters first, so no board writes into a
    /// peer that is already tearing down its receiver.
    pub fn shutdown_all(&mut self) {
        for board in self.boards.values_mut() {
            board.disconnect_uart();
        }
        for board in self.boards.values_mut() {
            board.shutdown();
        }
    }

    /// Deletes the inbound streams of every board.
    pub fn remove_streams(&self) {
        for board in self.boards.values() {
            if let Some(path) = board.uart().rx_path() {
                if let Err(e) = self.channels.remove(path) {
                    tracing::warn!("Failed to remove {}: {}", path, e);
                }
            }
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannels;

    fn wait_for_byte(board: &Board) -> Option<u8> {
        for _ in 0..2000 {
            if let Some(b) = board.try_read_byte_uart() {
                return Some(b);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_cross_link_exchanges_bytes() {
        let mut world = World::new("test-world", ChannelBackend::Memory);
        world.add_board("A", 8).init_uart("A_RX", 4).unwrap();
        world.add_board("B", 8).init_uart("B_RX", 4).unwrap();
        assert!(world.cross_link("A", "B").unwrap());

        assert!(world.board_mut("A").unwrap().send_byte_uart(b'Z'));
        assert!(world.board_mut("B").unwrap().send_byte_uart(b'K'));
        assert_eq!(wait_for_byte(world.board("B").unwrap()), Some(b'Z'));
        assert_eq!(wait_for_byte(world.board("A").unwrap()), Some(b'K'));
    }

    #[test]
    fn test_link_without_receiver_fails_softly() {
        let mut world = World::new("test-world", ChannelBackend::Memory);
        world.add_board("A", 8);
        world.add_board("B", 8);
        assert!(!world.link("A", "B", 1, Duration::ZERO).unwrap());
        assert_eq!(
            world
                .board("A")
                .unwrap()
                .log()
                .count_matching("no receiver initialized"),
            1
        );
    }

    #[test]
    fn test_unknown_board() {
        let mut world = World::new("test-world", ChannelBackend::Memory);
        assert!(matches!(
            world.board_mut("ghost"),
            Err(SimulationError::UnknownBoard(_))
        ));
    }

    #[test]
    fn test_from_manifest_memory() {
        let manifest = twinboard_config::WorldManifest::from_yaml(
            r#"
name: "pair"
channels: memory
boards:
  - name: "A"
    uart:
      rx_path: "A_RX"
    timer:
      frequency_hz: 500
  - name: "B"
    gpio_pins: 4
    uart:
      rx_path: "B_RX"
      buffer_size: 2
links:
  - from: "A"
    to: "B"
  - from: "B"
    to: "A"
"#,
        )
        .unwrap();

        let world = World::from_manifest(&manifest, Path::new(".")).unwrap();
        let a = world.board("A").unwrap();
        let b = world.board("B").unwrap();
        assert!(a.uart().is_connected());
        assert!(b.uart().is_connected());
        assert_eq!(a.uart().tx_path(), Some("B_RX"));
        assert_eq!(b.uart().capacity(), 2);
        assert_eq!(b.gpio_count(), 4);
        assert!(a.timer().is_running());
        assert!(a.delay_clock_cycles(2));

        let snap = world.snapshot();
        assert_eq!(snap.boards.len(), 2);
        assert_eq!(snap.boards["A"].timer_hz, Some(500));
    }

    #[test]
    fn test_shared_registry_across_worlds() {
        let channels = MemoryChannels::new();
        let mut left = World::with_channels("left", Arc::new(channels.clone()));
        let mut right = World::with_channels("right", Arc::new(channels.clone()));
        left.add_board("A", 8).init_uart("A_RX", 4).unwrap();
        assert!(right.add_board("B", 8).connect_uart("A_RX"));
        assert!(right.board_mut("B").unwrap().send_byte_uart(1));
        assert_eq!(wait_for_byte(left.board("A").unwrap()), Some(1));
    }
}
