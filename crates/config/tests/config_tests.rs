// TwinBoard - Simulated Board Peripherals
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fs;
use twinboard_config::{BufferSize, ChannelKind, WorldManifest};

#[test]
fn test_manifest_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.yaml");
    fs::write(
        &path,
        r#"
schema_version: "1.0"
name: "bench"
channels: in_memory
boards:
  - name: "Sensor"
    gpio_pins: 4
    uart:
      rx_path: "SENSOR_RX"
      buffer_size: 64
      poll_interval_us: 250
  - name: "Host"
    uart:
      rx_path: "HOST_RX"
    timer:
      frequency_hz: 1000
links:
  - from: "Host"
    to: "Sensor"
    retries: 3
    retry_delay_ms: 5
"#,
    )
    .unwrap();

    let manifest = WorldManifest::from_file(&path).unwrap();
    assert_eq!(manifest.name, "bench");
    assert_eq!(manifest.channels, ChannelKind::Memory);

    let sensor = manifest.board("Sensor").unwrap();
    let uart = sensor.uart.as_ref().unwrap();
    assert_eq!(uart.buffer_size, BufferSize::Bytes(64));
    assert_eq!(uart.poll_interval_us, 250);
    assert!(sensor.timer.is_none());

    assert_eq!(manifest.links.len(), 1);
    assert_eq!(manifest.links[0].retries, 3);
    assert_eq!(manifest.links[0].retry_delay_ms, 5);
}

#[test]
fn test_pipe_alias_selects_fifo() {
    let manifest = WorldManifest::from_yaml(
        r#"
name: "w"
channels: named_pipe
boards:
  - name: "A"
"#,
    )
    .unwrap();
    assert_eq!(manifest.channels, ChannelKind::Fifo);
}

#[test]
fn test_errors_carry_file_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(
        &path,
        r#"
name: "w"
boards:
  - name: "A"
    uart:
      rx_path: "A_RX"
      buffer_size: 0
"#,
    )
    .unwrap();

    let err = WorldManifest::from_file(&path).unwrap_err();
    let rendered = format!("{:#}", err);
    assert!(rendered.contains("Invalid world manifest"));
    assert!(rendered.contains("broken.yaml"));
    assert!(rendered.contains("buffer_size"));
}

#[test]
fn test_missing_file_reports_path() {
    let err = WorldManifest::from_file("no/such/world.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("no/such/world.yaml"));
}

#[test]
fn test_shared_rx_path_rejected() {
    let err = WorldManifest::from_yaml(
        r#"
name: "w"
boards:
  - name: "A"
    uart:
      rx_path: "RX"
  - name: "B"
    uart:
      rx_path: "RX"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("already used"));
}
