//! Compiled-in defaults for the AT link and the locator.
//!
//! Sizes match what the ESP-AT co-processor and the publish channel can
//! carry; the locator timings are the values the cloud integration expects.

/// Event name used for location publishes and the reply subscription.
pub const DEFAULT_EVENT_NAME: &str = "deviceLocator";

/// Publish period of the firmware's periodic locator, in seconds.
pub const DEFAULT_PERIOD_SECS: u64 = 10;

/// Shortest accepted periodic interval, in seconds.
pub const MIN_PERIOD_SECS: u64 = 5;

/// Settling time between cloud connect and the first location scan.
pub const WAIT_AFTER_CONNECT_MS: u64 = 8_000;

/// How long a command may wait for its terminal `OK` / `ERROR` line.
pub const COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Largest packet the receiver reads (one response line per packet).
pub const MAX_PACKET_LEN: usize = 256;

/// Transport send chunk size.
pub const MAX_SEND_CHUNK: usize = 128;

/// Access points kept per payload. Each entry is around 42 bytes.
pub const MAX_WIFI_ENTRIES: usize = 12;

/// Publish payload limit in bytes.
pub const MAX_PAYLOAD_LEN: usize = 622;

/// Longest SSID the co-processor reports.
pub const MAX_SSID_LEN: usize = 32;

/// Length of a colon-separated MAC string ("aa:bb:cc:dd:ee:ff").
pub const MAC_STRING_LEN: usize = 17;

/// Longest accepted event name.
pub const MAX_EVENT_NAME_LEN: usize = 64;

/// AT command that lists visible access points.
pub const CMD_LIST_APS: &str = "AT+CWLAP\r\n";

/// Bare attention command, answered with `OK` by a live co-processor.
pub const CMD_ATTENTION: &str = "AT\r\n";

/// Link setup sent once the co-processor answers: echo off, station mode,
/// and `+CWLAP` lines limited to security, SSID, RSSI, BSSID and channel.
pub const CMD_SETUP: &[&str] = &["ATE0\r\n", "AT+CWMODE=1\r\n", "AT+CWLAPOPT=0,31\r\n"];
