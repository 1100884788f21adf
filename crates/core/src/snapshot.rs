// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::board::BoardState;
use crate::peripherals::ReceiverState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorldSnapshot {
    pub name: String,
    pub boards: BTreeMap<String, BoardSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BoardSnapshot {
    pub name: String,
    pub state: BoardState,
    pub gpio: Vec<bool>,
    pub cycle: u64,
    pub timer_hz: Option<u32>,
    pub uart: UartSnapshot,
    pub log: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UartSnapshot {
    pub rx_path: Option<String>,
    pub receiver: ReceiverState,
    pub tx_path: Option<String>,
    pub connected: bool,
    pub capacity: usize,
    pub buffered: Vec<u8>,
    pub overflows: u64,
}
