// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::lock;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Append-only, human-readable event history of one board.
///
/// Cloning yields another handle onto the same history, so background tasks
/// can record overflow and I/O events next to the foreground ones. Every
/// entry is mirrored to `tracing` under the owning board's name.
#[derive(Debug, Clone)]
pub struct EventLog {
    source: Arc<Mutex<String>>,
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new(source: &str) -> Self {
        Self {
            source: Arc::new(Mutex::new(source.to_string())),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::info!(board = %lock(&self.source), "{}", entry);
        lock(&self.entries).push(entry);
    }

    /// Renames the source tag used for tracing output (board reset).
    pub fn rename(&self, source: &str) {
        *lock(&self.source) = source.to_string();
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Writes every entry as one line.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for entry in lock(&self.entries).iter() {
            writeln!(out, "{}", entry)?;
        }
        Ok(())
    }
}
