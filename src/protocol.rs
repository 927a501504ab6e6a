/// Wire formats shared with the cloud side: the published location payload
/// and the location reply delivered back to the device.
///
/// The payload uses the compact single-letter keys of the geolocation
/// integration. Uses `heapless` types for no_std/no-alloc operation.
use core::fmt;

use heapless::{String, Vec};
use serde::Serialize;

use crate::defaults::MAX_PAYLOAD_LEN;

/// Maximum length for MAC address strings ("aa:bb:cc:dd:ee:ff")
pub type MacString = String<18>;

/// Buffer type for serialized payloads
pub type PayloadBuffer = Vec<u8, MAX_PAYLOAD_LEN>;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One access point in the WiFi section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiEntry {
    /// BSSID, lowercase colon-separated
    #[serde(rename = "m")]
    pub mac: MacString,
    /// Signal strength in dBm
    #[serde(rename = "s")]
    pub rssi: i8,
    #[serde(rename = "c")]
    pub channel: u8,
}

/// Serving cell identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellTower {
    #[serde(rename = "i")]
    pub cell_id: u32,
    /// Location (or tracking) area code
    #[serde(rename = "l")]
    pub lac: u16,
    /// Mobile country code
    #[serde(rename = "c")]
    pub mcc: u16,
    /// Mobile network code
    #[serde(rename = "n")]
    pub mnc: u16,
}

#[derive(Debug, Serialize)]
pub struct WifiSection<'a> {
    #[serde(rename = "a")]
    pub access_points: &'a [WifiEntry],
}

#[derive(Debug, Serialize)]
pub struct CellSection<'a> {
    /// Operator name; not available from the cell identity lookup
    #[serde(rename = "o")]
    pub operator: &'a str,
    #[serde(rename = "a")]
    pub towers: &'a [CellTower],
}

/// Top-level location payload. Absent sections are omitted.
#[derive(Debug, Default, Serialize)]
pub struct LocatePayload<'a> {
    #[serde(rename = "w", skip_serializing_if = "Option::is_none")]
    pub wifi: Option<WifiSection<'a>>,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub cellular: Option<CellSection<'a>>,
}

/// Payload serialization failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// The JSON did not fit in `MAX_PAYLOAD_LEN` bytes
    Overflow,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Overflow => write!(f, "payload exceeds {} bytes", MAX_PAYLOAD_LEN),
        }
    }
}

/// A serialized location payload, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    buf: PayloadBuffer,
}

impl Payload {
    /// Serialize into a fresh fixed-capacity buffer.
    pub fn encode(payload: &LocatePayload<'_>) -> Result<Self, PayloadError> {
        let mut buf = PayloadBuffer::new();
        buf.resize_default(MAX_PAYLOAD_LEN).ok();
        let len = serde_json_core::to_slice(payload, &mut buf).map_err(|_| PayloadError::Overflow)?;
        buf.truncate(len);
        Ok(Self { buf })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_str(&self) -> &str {
        // serde-json-core only emits UTF-8
        core::str::from_utf8(&self.buf).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Format a 6-byte MAC address into "aa:bb:cc:dd:ee:ff"
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

/// Location resolved by the cloud from a published payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    /// Latitude in degrees
    pub lat: f32,
    /// Longitude in degrees
    pub lon: f32,
    /// Accuracy radius in meters
    pub accuracy: f32,
}

/// Parse a `"<lat>,<lon>,<accuracy>"` location reply.
///
/// Empty fields are skipped and anything after the third field is ignored.
/// Returns `None` when fewer than three fields are present. Numbers are read
/// leniently: each field contributes its longest numeric prefix, and a field
/// without one reads as `0.0`. Only decimal notation is recognized, so
/// `inf`, `nan` and hex floats also read as `0.0`.
pub fn parse_location_reply(data: &str) -> Option<LocationFix> {
    let mut fields = data.split(',').filter(|f| !f.is_empty());
    let lat = parse_lenient(fields.next()?);
    let lon = parse_lenient(fields.next()?);
    let accuracy = parse_lenient(fields.next()?);
    Some(LocationFix { lat, lon, accuracy })
}

fn parse_lenient(field: &str) -> f32 {
    let s = field.trim_start();
    s[..numeric_prefix_len(s)].parse().unwrap_or(0.0)
}

/// Length of the leading `[+-]digits[.digits][e[+-]digits]` run.
fn numeric_prefix_len(s: &str) -> usize {
    let b = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(b.first().copied(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if b.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        has_digits |= frac_end > end + 1;
        end = frac_end;
    }
    if !has_digits {
        return 0;
    }

    if matches!(b.get(end).copied(), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(b.get(exp).copied(), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    end
}
