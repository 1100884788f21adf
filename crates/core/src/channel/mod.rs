// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Byte channel adapter.
//!
//! A UART talks to its peer through two independently addressable byte
//! streams: an inbound one it creates and reads, and an outbound one owned by
//! the peer. Both ends are always non-blocking, so neither the receive task
//! nor a foreground `send` ever parks inside an OS call.

#[cfg(unix)]
pub mod fifo;
pub mod memory;

#[cfg(unix)]
pub use fifo::FifoChannels;
pub use memory::MemoryChannels;

use std::io;
use std::sync::Arc;

/// Read end of a named byte stream.
pub trait InboundChannel: Send {
    /// Attempts a single-byte read.
    ///
    /// `Ok(None)` means no data right now (would-block or end-of-stream).
    /// Any `Err` is a hard failure and the caller should stop polling.
    fn try_receive(&mut self) -> io::Result<Option<u8>>;
    /// Releases the underlying resource. Idempotent.
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// Write end of a named byte stream.
pub trait OutboundChannel: Send {
    /// Attempts a single-byte write. Would-block is reported as an error.
    fn send(&mut self, byte: u8) -> io::Result<()>;
    /// Releases the underlying resource. Idempotent.
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// Factory for channel handles addressed by path.
pub trait ChannelProvider: std::fmt::Debug + Send + Sync {
    /// Creates the stream if absent and opens it for non-blocking read.
    fn open_inbound(&self, path: &str) -> io::Result<Box<dyn InboundChannel>>;
    /// Opens an existing stream for non-blocking write.
    fn open_outbound(&self, path: &str) -> io::Result<Box<dyn OutboundChannel>>;
    /// Deletes the named stream. Missing streams are not an error.
    fn remove(&self, path: &str) -> io::Result<()>;
}

/// Which channel implementation a board or world is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelBackend {
    /// OS named pipes.
    #[default]
    Fifo,
    /// Process-local bounded queues.
    Memory,
}

impl From<twinboard_config::ChannelKind> for ChannelBackend {
    fn from(kind: twinboard_config::ChannelKind) -> Self {
        match kind {
            twinboard_config::ChannelKind::Fifo => Self::Fifo,
            twinboard_config::ChannelKind::Memory => Self::Memory,
        }
    }
}

impl ChannelBackend {
    pub fn provider(self) -> Arc<dyn ChannelProvider> {
        match self {
            #[cfg(unix)]
            ChannelBackend::Fifo => Arc::new(FifoChannels),
            #[cfg(not(unix))]
            ChannelBackend::Fifo => {
                tracing::warn!("Named FIFOs are unavailable on this platform; using in-memory channels");
                Arc::new(MemoryChannels::new())
            }
            ChannelBackend::Memory => Arc::new(MemoryChannels::new()),
        }
    }
}

/// Would-block and interrupted calls are retried by the poller, never reported.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

pub(crate) fn closed_handle() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel handle is closed")
}
