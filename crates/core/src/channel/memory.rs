// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{closed_handle, ChannelProvider, InboundChannel, OutboundChannel};
use crate::lock;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Same depth as a default Linux pipe buffer.
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
struct MemoryPipe {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    failed: Arc<AtomicBool>,
    // Open read ends; zero means writers are refused like a FIFO with no reader.
    readers: Arc<AtomicUsize>,
}

/// In-process stand-in for named pipes, used to wire boards inside one test
/// or one `World` without touching the filesystem.
///
/// Clones share the same registry of paths.
#[derive(Debug, Clone)]
pub struct MemoryChannels {
    pipes: Arc<Mutex<HashMap<String, MemoryPipe>>>,
    capacity: usize,
}

impl Default for MemoryChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannels {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pipes: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        lock(&self.pipes).contains_key(path)
    }

    /// Makes every subsequent read on `path` fail with a hard I/O error.
    pub fn fail_reads(&self, path: &str) {
        if let Some(pipe) = lock(&self.pipes).get(path) {
            pipe.failed.store(true, Ordering::SeqCst);
        }
    }
}

impl ChannelProvider for MemoryChannels {
    fn open_inbound(&self, path: &str) -> io::Result<Box<dyn InboundChannel>> {
        let mut pipes = lock(&self.pipes);
        let pipe = pipes.entry(path.to_string()).or_insert_with(|| {
            let (tx, rx) = crossbeam_channel::bounded(self.capacity);
            MemoryPipe {
                tx,
                rx,
                failed: Arc::new(AtomicBool::new(false)),
                readers: Arc::new(AtomicUsize::new(0)),
            }
        });
        if pipe.readers.fetch_add(1, Ordering::SeqCst) == 0 {
            // Bytes written while nobody listened are gone, as with a real pipe.
            pipe.rx.try_iter().for_each(drop);
        }
        Ok(Box::new(MemoryReader {
            rx: Some(pipe.rx.clone()),
            failed: pipe.failed.clone(),
            readers: pipe.readers.clone(),
        }))
    }

    fn open_outbound(&self, path: &str) -> io::Result<Box<dyn OutboundChannel>> {
        let pipes = lock(&self.pipes);
        let pipe = pipes.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no receiver has created '{}'", path),
            )
        })?;
        if pipe.readers.load(Ordering::SeqCst) == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no reader has '{}' open", path),
            ));
        }
        Ok(Box::new(MemoryWriter {
            tx: Some(pipe.tx.clone()),
            readers: pipe.readers.clone(),
        }))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        lock(&self.pipes).remove(path);
        Ok(())
    }
}

struct MemoryReader {
    rx: Option<Receiver<u8>>,
    failed: Arc<AtomicBool>,
    readers: Arc<AtomicUsize>,
}

impl InboundChannel for MemoryReader {
    fn try_receive(&mut self) -> io::Result<Option<u8>> {
        let rx = self.rx.as_ref().ok_or_else(closed_handle)?;
        if self.failed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        match rx.try_recv() {
            Ok(byte) => Ok(Some(byte)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn close(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        if self.readers.fetch_sub(1, Ordering::SeqCst) == 1 {
            rx.try_iter().for_each(drop);
        }
    }

    fn is_open(&self) -> bool {
        self.rx.is_some()
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.close();
    }
}

struct MemoryWriter {
    tx: Option<Sender<u8>>,
    readers: Arc<AtomicUsize>,
}

impl OutboundChannel for MemoryWriter {
    fn send(&mut self, byte: u8) -> io::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(closed_handle)?;
        if self.readers.load(Ordering::SeqCst) == 0 {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        tx.try_send(byte).map_err(|e| match e {
            TrySendError::Full(_) => io::Error::from(io::ErrorKind::WouldBlock),
            TrySendError::Disconnected(_) => io::Error::from(io::ErrorKind::BrokenPipe),
        })
    }

    fn close(&mut self) {
        self.tx = None;
    }

    fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryChannels;
    use crate::channel::ChannelProvider;
    use std::io;

    #[test]
    fn test_outbound_before_inbound_fails() {
        let channels = MemoryChannels::new();
        let err = channels.open_outbound("A_RX").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_bytes_flow_in_order() {
        let channels = MemoryChannels::new();
        let mut rx = channels.open_inbound("A_RX").unwrap();
        let mut tx = channels.open_outbound("A_RX").unwrap();

        for b in [1u8, 2, 3] {
            tx.send(b).unwrap();
        }
        assert_eq!(rx.try_receive().unwrap(), Some(1));
        assert_eq!(rx.try_receive().unwrap(), Some(2));
        assert_eq!(rx.try_receive().unwrap(), Some(3));
        assert_eq!(rx.try_receive().unwrap(), None);
    }

    #[test]
    fn test_full_pipe_would_block() {
        let channels = MemoryChannels::with_capacity(1);
        let _rx = channels.open_inbound("A_RX").unwrap();
        let mut tx = channels.open_outbound("A_RX").unwrap();

        tx.send(1).unwrap();
        assert_eq!(tx.send(2).unwrap_err().kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_injected_failure_is_hard_error() {
        let channels = MemoryChannels::new();
        let mut rx = channels.open_inbound("A_RX").unwrap();
        channels.fail_reads("A_RX");
        assert_eq!(rx.try_receive().unwrap_err().kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_closed_writer_rejects_send() {
        let channels = MemoryChannels::new();
        let _rx = channels.open_inbound("A_RX").unwrap();
        let mut tx = channels.open_outbound("A_RX").unwrap();
        tx.close();
        tx.close();
        assert!(!tx.is_open());
        assert_eq!(tx.send(1).unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_pipe_without_reader_rejects_writer() {
        let channels = MemoryChannels::new();
        let mut rx = channels.open_inbound("A_RX").unwrap();
        rx.close();
        assert!(channels.exists("A_RX"));

        let err = channels.open_outbound("A_RX").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_reader_going_away_breaks_pipe_and_drops_bytes() {
        let channels = MemoryChannels::new();
        let rx = channels.open_inbound("A_RX").unwrap();
        let mut tx = channels.open_outbound("A_RX").unwrap();
        tx.send(0x10).unwrap();

        drop(rx);
        assert_eq!(tx.send(0x11).unwrap_err().kind(), io::ErrorKind::BrokenPipe);

        let mut fresh = channels.open_inbound("A_RX").unwrap();
        assert_eq!(fresh.try_receive().unwrap(), None);
        tx.send(0x12).unwrap();
        assert_eq!(fresh.try_receive().unwrap(), Some(0x12));
    }
}
