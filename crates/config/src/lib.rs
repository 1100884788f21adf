// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_gpio_pins() -> usize {
    8
}

fn default_buffer_size() -> BufferSize {
    BufferSize::Bytes(16)
}

fn default_poll_interval_us() -> u64 {
    1000
}

fn default_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    10
}

/// Transport used for every UART link in a world.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    #[serde(alias = "pipe", alias = "named_pipe")]
    Fifo,
    #[serde(alias = "in_memory")]
    Memory,
}

/// UART buffer capacity, either a plain byte count or a size string ("1KiB").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum BufferSize {
    Bytes(u64),
    Human(String),
}

impl BufferSize {
    pub fn bytes(&self) -> Result<u64> {
        match self {
            BufferSize::Bytes(n) => Ok(*n),
            BufferSize::Human(s) => parse_size(s),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UartConfig {
    pub rx_path: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: BufferSize,
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct TimerConfig {
    pub frequency_hz: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardConfig {
    pub name: String,
    #[serde(default = "default_gpio_pins")]
    pub gpio_pins: usize,
    #[serde(default)]
    pub uart: Option<UartConfig>,
    #[serde(default)]
    pub timer: Option<TimerConfig>,
}

/// Connects the transmitter of `from` to the receiver of `to`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorldManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub channels: ChannelKind,
    pub boards: Vec<BoardConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl WorldManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read world manifest {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid world manifest {:?}", path))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml).context("Failed to parse World Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn board(&self, name: &str) -> Option<&BoardConfig> {
        self.boards.iter().find(|b| b.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'; expected '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }
        if self.boards.is_empty() {
            anyhow::bail!("World '{}' declares no boards", self.name);
        }

        let mut seen = HashSet::new();
        let mut rx_paths = HashSet::new();
        for board in &self.boards {
            if board.name.trim().is_empty() {
                anyhow::bail!("Board 'name' cannot be empty");
            }
            if !seen.insert(board.name.as_str()) {
                anyhow::bail!("Duplicate board name '{}'", board.name);
            }
            if board.gpio_pins == 0 {
                anyhow::bail!("Board '{}': 'gpio_pins' must be greater than zero", board.name);
            }
            if let Some(uart) = &board.uart {
                if uart.rx_path.trim().is_empty() {
                    anyhow::bail!("Board '{}': 'uart.rx_path' cannot be empty", board.name);
                }
                if !rx_paths.insert(uart.rx_path.as_str()) {
                    anyhow::bail!(
                        "Board '{}': rx_path '{}' is already used by another board",
                        board.name,
                        uart.rx_path
                    );
                }
                let size = uart
                    .buffer_size
                    .bytes()
                    .with_context(|| format!("Board '{}': bad 'uart.buffer_size'", board.name))?;
                if size == 0 {
                    anyhow::bail!(
                        "Board '{}': 'uart.buffer_size' must be greater than zero",
                        board.name
                    );
                }
                if uart.poll_interval_us == 0 {
                    anyhow::bail!(
                        "Board '{}': 'uart.poll_interval_us' must be greater than zero",
                        board.name
                    );
                }
            }
            if let Some(timer) = &board.timer {
                if timer.frequency_hz == 0 {
                    anyhow::bail!(
                        "Board '{}': 'timer.frequency_hz' must be greater than zero",
                        board.name
                    );
                }
            }
        }

        for link in &self.links {
            let Some(from) = self.board(&link.from) else {
                anyhow::bail!("Link source '{}' is not a declared board", link.from);
            };
            let Some(to) = self.board(&link.to) else {
                anyhow::bail!("Link target '{}' is not a declared board", link.to);
            };
            if from.uart.is_none() {
                tracing::debug!("Link source '{}' has no receiver; TX only", from.name);
            }
            if to.uart.is_none() {
                anyhow::bail!(
                    "Link target '{}' has no 'uart' section to receive on",
                    to.name
                );
            }
            if link.retries == 0 {
                anyhow::bail!(
                    "Link {} -> {}: 'retries' must be at least 1",
                    link.from,
                    link.to
                );
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
