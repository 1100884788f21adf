// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::channel::{ChannelProvider, InboundChannel, OutboundChannel};
use crate::{lock, EventLog, SimResult, SimulationError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay between empty polls of the inbound channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Value returned by [`UartEngine::receive`] when the buffer is empty.
pub const NO_DATA: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverState {
    Idle,
    Running,
    /// The receive task hit a hard I/O error and exited.
    Faulted,
}

#[derive(Debug, Default)]
struct FifoInner {
    queue: VecDeque<u8>,
    capacity: usize,
    overflows: u64,
}

/// Bounded receive buffer shared by the receive task and foreground reads.
///
/// Every access goes through the one lock, so producer and consumer paths
/// are serialized.
#[derive(Debug, Default)]
pub struct RxFifo {
    inner: Mutex<FifoInner>,
}

impl RxFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FifoInner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                overflows: 0,
            }),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = lock(&self.inner);
        inner.capacity = capacity;
        inner.queue.truncate(capacity);
    }

    /// Appends a byte. Returns false, counting an overflow, when full.
    pub fn push(&self, byte: u8) -> bool {
        let mut inner = lock(&self.inner);
        if inner.queue.len() < inner.capacity {
            inner.queue.push_back(byte);
            true
        } else {
            inner.overflows += 1;
            false
        }
    }

    pub fn pop(&self) -> Option<u8> {
        lock(&self.inner).queue.pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.inner).capacity
    }

    /// A buffer with no capacity yet (receiver never initialized) is not full.
    pub fn is_full(&self) -> bool {
        let inner = lock(&self.inner);
        inner.capacity > 0 && inner.queue.len() >= inner.capacity
    }

    pub fn overflow_count(&self) -> u64 {
        lock(&self.inner).overflows
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.inner).queue.iter().copied().collect()
    }

    pub fn clear(&self) {
        lock(&self.inner).queue.clear();
    }

    /// Empties the buffer and zeroes the overflow count.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.queue.clear();
        inner.overflows = 0;
    }
}

struct RxTask {
    path: String,
    // Dropping the sender cancels the task.
    cancel: Sender<()>,
    faulted: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn InboundChannel>>,
}

enum Transmitter {
    Disconnected,
    Connected {
        path: String,
        handle: Box<dyn OutboundChannel>,
    },
    /// Last connect attempt failed; sends are refused until a reconnect.
    Unreachable { path: String },
}

/// UART transceiver backed by two byte channels.
///
/// The receiver and transmitter have independent lifecycles: a board can
/// receive without ever connecting a transmitter and vice versa.
pub struct UartEngine {
    channels: Arc<dyn ChannelProvider>,
    log: EventLog,
    fifo: Arc<RxFifo>,
    poll_interval: Duration,
    rx: Option<RxTask>,
    tx: Transmitter,
}

impl std::fmt::Debug for UartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartEngine")
            .field("rx_path", &self.rx_path())
            .field("tx_path", &self.tx_path())
            .field("receiver", &self.receiver_state())
            .field("connected", &self.is_connected())
            .field("buffered", &self.fifo.len())
            .finish()
    }
}

impl UartEngine {
    pub fn new(channels: Arc<dyn ChannelProvider>, log: EventLog) -> Self {
        Self {
            channels,
            log,
            fifo: Arc::new(RxFifo::new(0)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            rx: None,
            tx: Transmitter::Disconnected,
        }
    }

    /// Applies to receivers started after the call.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval.max(Duration::from_micros(1));
    }

    /// Creates and opens the inbound channel and starts the receive task.
    ///
    /// Returns `Ok(false)` without touching the running receiver when one is
    /// already initialized.
    pub fn init_receiver(&mut self, path: &str, capacity: usize) -> SimResult<bool> {
        if self.rx.is_some() {
            self.log.push("UART RX already initialized.");
            return Ok(false);
        }
        if capacity == 0 {
            self.log
                .push(format!("UART RX init rejected: buffer capacity 0 for {}", path));
            return Err(SimulationError::InvalidCapacity(capacity));
        }

        let inbound = match self.channels.open_inbound(path) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.log
                    .push(format!("Failed to open RX pipe: {} ({})", path, e));
                return Err(e.into());
            }
        };

        self.fifo.clear();
        self.fifo.set_capacity(capacity);

        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(0);
        let faulted = Arc::new(AtomicBool::new(false));
        let worker = ReceiveWorker {
            inbound,
            fifo: self.fifo.clone(),
            log: self.log.clone(),
            cancelled,
            faulted: faulted.clone(),
            poll_interval: self.poll_interval,
        };
        let handle = thread::Builder::new()
            .name(format!("uart-rx:{}", path))
            .spawn(move || worker.run())?;

        self.rx = Some(RxTask {
            path: path.to_string(),
            cancel,
            faulted,
            handle,
        });
        self.log.push(format!(
            "UART RX initialized on {} (buffer {} bytes)",
            path, capacity
        ));
        Ok(true)
    }

    /// Cancels and joins the receive task, then closes the inbound handle.
    pub fn stop_receiver(&mut self) {
        let Some(task) = self.rx.take() else {
            return;
        };
        drop(task.cancel);
        match task.handle.join() {
            Ok(mut inbound) => inbound.close(),
            Err(_) => tracing::error!("UART RX task for {} panicked", task.path),
        }
        self.log.push(format!("UART RX stopped on {}", task.path));
    }

    /// Opens the outbound channel, replacing any previous connection.
    pub fn connect_transmitter(&mut self, path: &str) -> bool {
        if let Transmitter::Connected { handle, .. } = &mut self.tx {
            handle.close();
        }
        match self.channels.open_outbound(path) {
            Ok(handle) => {
                self.tx = Transmitter::Connected {
                    path: path.to_string(),
                    handle,
                };
                self.log.push(format!("UART TX connected to {}", path));
                true
            }
            Err(e) => {
                self.tx = Transmitter::Unreachable {
                    path: path.to_string(),
                };
                self.log
                    .push(format!("UART TX connect to {} failed: {}", path, e));
                false
            }
        }
    }

    /// Retries [`Self::connect_transmitter`] while the peer has not created its
    /// inbound channel yet.
    pub fn connect_transmitter_retrying(
        &mut self,
        path: &str,
        attempts: u32,
        delay: Duration,
    ) -> bool {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if self.connect_transmitter(path) {
                return true;
            }
            if attempt < attempts {
                tracing::debug!("UART TX retry {}/{} for {}", attempt, attempts, path);
                thread::sleep(delay);
            }
        }
        false
    }

    pub fn disconnect_transmitter(&mut self) {
        match std::mem::replace(&mut self.tx, Transmitter::Disconnected) {
            Transmitter::Disconnected => {}
            Transmitter::Connected { mut handle, .. } => {
                handle.close();
                self.log.push("UART disconnected.");
            }
            Transmitter::Unreachable { .. } => self.log.push("UART disconnected."),
        }
    }

    pub fn send(&mut self, byte: u8) -> bool {
        let Transmitter::Connected { handle, path } = &mut self.tx else {
            self.log.push("UART send failed: TX pipe not open.");
            return false;
        };
        match handle.send(byte) {
            Ok(()) => {
                tracing::debug!("UART TX {:#04x} -> {}", byte, path);
                self.log.push(format!("UART sent byte: {}", byte));
                true
            }
            Err(e) => {
                tracing::warn!("UART TX to {} failed: {}", path, e);
                self.log.push(format!("UART send failed: {}", e));
                false
            }
        }
    }

    /// Pops the oldest buffered byte, or [`NO_DATA`] when empty.
    pub fn receive(&self) -> u8 {
        self.try_receive().unwrap_or(NO_DATA)
    }

    pub fn try_receive(&self) -> Option<u8> {
        self.fifo.pop()
    }

    pub fn is_full(&self) -> bool {
        self.fifo.is_full()
    }

    pub fn clear(&self) {
        self.fifo.clear();
        self.log.push("UART buffer cleared.");
    }

    /// Drops buffered bytes and the overflow count without logging (board reset).
    pub(crate) fn discard_buffered(&self) {
        self.fifo.reset();
    }

    pub fn buffered_len(&self) -> usize {
        self.fifo.len()
    }

    pub fn buffered(&self) -> Vec<u8> {
        self.fifo.contents()
    }

    pub fn capacity(&self) -> usize {
        self.fifo.capacity()
    }

    pub fn overflow_count(&self) -> u64 {
        self.fifo.overflow_count()
    }

    pub fn receiver_state(&self) -> ReceiverState {
        match &self.rx {
            None => ReceiverState::Idle,
            Some(task) if task.faulted.load(Ordering::SeqCst) => ReceiverState::Faulted,
            Some(_) => ReceiverState::Running,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.receiver_state() == ReceiverState::Running
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.tx, Transmitter::Connected { .. })
    }

    pub fn rx_path(&self) -> Option<&str> {
        self.rx.as_ref().map(|task| task.path.as_str())
    }

    pub fn tx_path(&self) -> Option<&str> {
        match &self.tx {
            Transmitter::Disconnected => None,
            Transmitter::Connected { path, .. } | Transmitter::Unreachable { path } => {
                Some(path.as_str())
            }
        }
    }
}

impl Drop for UartEngine {
    fn drop(&mut self) {
        self.disconnect_transmitter();
        self.stop_receiver();
    }
}

struct ReceiveWorker {
    inbound: Box<dyn InboundChannel>,
    fifo: Arc<RxFifo>,
    log: EventLog,
    cancelled: Receiver<()>,
    faulted: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ReceiveWorker {
    /// Drains the inbound channel until cancelled or a hard error occurs.
    /// Hands the channel back so the owner can close it after joining.
    fn run(mut self) -> Box<dyn InboundChannel> {
        loop {
            if !matches!(self.cancelled.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }
            match self.inbound.try_receive() {
                Ok(Some(byte)) => {
                    if self.fifo.push(byte) {
                        tracing::debug!("UART RX {:#04x}", byte);
                    } else {
                        tracing::warn!("UART RX buffer overflow, dropped {:#04x}", byte);
                        self.log.push("UART RX buffer overflow");
                    }
                }
                Ok(None) => match self.cancelled.recv_timeout(self.poll_interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                },
                Err(e) => {
                    tracing::error!("UART RX read error: {}", e);
                    self.log.push(format!("UART RX read error: {}", e));
                    self.faulted.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
        self.inbound
    }
}
