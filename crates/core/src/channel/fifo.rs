// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{closed_handle, is_transient, ChannelProvider, InboundChannel, OutboundChannel};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

/// Channels backed by POSIX named pipes (`mkfifo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoChannels;

fn ensure_fifo(path: &Path) -> io::Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a FIFO", path.display()),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // Lost a creation race against another opener.
    if err.kind() == io::ErrorKind::AlreadyExists {
        Ok(())
    } else {
        Err(err)
    }
}

impl ChannelProvider for FifoChannels {
    fn open_inbound(&self, path: &str) -> io::Result<Box<dyn InboundChannel>> {
        ensure_fifo(Path::new(path))?;
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        tracing::debug!("Opened FIFO {} for reading", path);
        Ok(Box::new(FifoReader { file: Some(file) }))
    }

    fn open_outbound(&self, path: &str) -> io::Result<Box<dyn OutboundChannel>> {
        let meta = std::fs::metadata(path)?;
        if !meta.file_type().is_fifo() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a FIFO", path),
            ));
        }
        // Fails with ENXIO while no reader has the FIFO open.
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        tracing::debug!("Opened FIFO {} for writing", path);
        Ok(Box::new(FifoWriter { file: Some(file) }))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
struct FifoReader {
    file: Option<File>,
}

impl InboundChannel for FifoReader {
    fn try_receive(&mut self) -> io::Result<Option<u8>> {
        let file = self.file.as_mut().ok_or_else(closed_handle)?;
        let mut byte = [0u8; 1];
        match file.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            // No writer attached: end-of-stream until the peer connects.
            Ok(_) => Ok(None),
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

#[derive(Debug)]
struct FifoWriter {
    file: Option<File>,
}

impl OutboundChannel for FifoWriter {
    fn send(&mut self, byte: u8) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed_handle)?;
        match file.write(&[byte])? {
            1 => Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::WriteZero, "FIFO accepted no data")),
        }
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::FifoChannels;
    use crate::channel::ChannelProvider;
    use std::io;

    #[test]
    fn test_fifo_roundtrip_single_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A_RX");
        let path = path.to_str().unwrap();

        let mut rx = FifoChannels.open_inbound(path).unwrap();
        // Nothing attached yet: end-of-stream reads as "no data".
        assert_eq!(rx.try_receive().unwrap(), None);

        let mut tx = FifoChannels.open_outbound(path).unwrap();
        tx.send(0x5A).unwrap();
        assert_eq!(rx.try_receive().unwrap(), Some(0x5A));
        assert_eq!(rx.try_receive().unwrap(), None);
    }

    #[test]
    fn test_outbound_requires_existing_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let err = FifoChannels
            .open_outbound(path.to_str().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_inbound_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"x").unwrap();
        assert!(FifoChannels.open_inbound(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A_RX");
        let path = path.to_str().unwrap();

        let mut rx = FifoChannels.open_inbound(path).unwrap();
        rx.close();
        rx.close();
        assert!(!rx.is_open());
        assert_eq!(
            rx.try_receive().unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );

        FifoChannels.remove(path).unwrap();
        FifoChannels.remove(path).unwrap();
    }
}
