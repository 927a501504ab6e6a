//! Access point records from the co-processor's `AT+CWLAP` scan.
//!
//! Each visible network arrives as one response line:
//!
//! ```text
//! +CWLAP:(<security>,"<ssid>",<rssi>,"<bssid>",<channel>)
//! ```
//!
//! Parsing is all-or-nothing: a line that deviates anywhere from this shape
//! yields `None`, so a record always carries a complete set of fields.

use core::fmt;

use heapless::String;

use crate::defaults::{MAC_STRING_LEN, MAX_SSID_LEN};
use crate::protocol::{format_mac, MacString};

/// Response prefix for access point lines.
pub const CWLAP_PREFIX: &str = "+CWLAP:(";

/// SSID storage, sized to the 802.11 maximum.
pub type SsidString = String<MAX_SSID_LEN>;

/// One access point reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointRecord {
    ssid: SsidString,
    bssid: [u8; 6],
    rssi: i8,
    channel: u8,
    security: u8,
}

impl AccessPointRecord {
    /// Parse a `+CWLAP:(...)` response line.
    ///
    /// The quoted SSID may itself contain commas, so the fixed-shape fields
    /// are taken from the right and the SSID is whatever remains between
    /// the quotes.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix(CWLAP_PREFIX)?.strip_suffix(')')?;

        let mut fields = body.rsplitn(3, ',');
        let channel = fields.next()?;
        let bssid = fields.next()?;
        let (head, rssi) = fields.next()?.rsplit_once(',')?;
        let (security, ssid) = head.split_once(',')?;

        let channel: u8 = channel.parse().ok().filter(|&ch| ch > 0)?;
        let bssid = parse_bssid(unquote(bssid)?)?;
        let rssi: i8 = rssi.parse().ok()?;
        let security: u8 = security.parse().ok()?;

        let mut ssid_str = SsidString::new();
        ssid_str.push_str(unquote(ssid)?).ok()?;

        Some(Self {
            ssid: ssid_str,
            bssid,
            rssi,
            channel,
            security,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn bssid(&self) -> &[u8; 6] {
        &self.bssid
    }

    /// Signal strength in dBm.
    pub fn rssi(&self) -> i8 {
        self.rssi
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// ESP-AT encryption method code (0 = open, 3 = WPA2-PSK, ...).
    pub fn security(&self) -> u8 {
        self.security
    }

    /// BSSID as lowercase "aa:bb:cc:dd:ee:ff".
    pub fn bssid_string(&self) -> MacString {
        let mut s = MacString::new();
        format_mac(&self.bssid, &mut s);
        s
    }
}

impl fmt::Display for AccessPointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ssid={} bssid={} rssi={} channel={}",
            self.ssid,
            self.bssid_string(),
            self.rssi,
            self.channel
        )
    }
}

/// Strip one pair of surrounding double quotes.
fn unquote(field: &str) -> Option<&str> {
    field.strip_prefix('"')?.strip_suffix('"')
}

/// Parse "hh:hh:hh:hh:hh:hh" into six bytes.
fn parse_bssid(s: &str) -> Option<[u8; 6]> {
    if s.len() != MAC_STRING_LEN {
        return None;
    }

    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typical_line() {
        let ap =
            AccessPointRecord::parse(r#"+CWLAP:(3,"HomeNet",-61,"a4:2b:b0:12:ce:0f",6)"#).unwrap();
        assert_eq!(ap.ssid(), "HomeNet");
        assert_eq!(ap.bssid(), &[0xA4, 0x2B, 0xB0, 0x12, 0xCE, 0x0F]);
        assert_eq!(ap.rssi(), -61);
        assert_eq!(ap.channel(), 6);
        assert_eq!(ap.security(), 3);
    }

    #[test]
    fn parse_uppercase_bssid() {
        let ap = AccessPointRecord::parse(r#"+CWLAP:(0,"cafe",-80,"DE:AD:BE:EF:00:01",11)"#)
            .unwrap();
        assert_eq!(ap.bssid(), &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(ap.bssid_string().as_str(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn parse_empty_ssid() {
        let ap =
            AccessPointRecord::parse(r#"+CWLAP:(4,"",-90,"00:11:22:33:44:55",1)"#).unwrap();
        assert_eq!(ap.ssid(), "");
    }

    #[test]
    fn parse_ssid_with_comma_and_quote() {
        let ap = AccessPointRecord::parse(
            r#"+CWLAP:(3,"Bob's "Guest", 2nd",-70,"00:11:22:33:44:55",13)"#,
        )
        .unwrap();
        assert_eq!(ap.ssid(), r#"Bob's "Guest", 2nd"#);
        assert_eq!(ap.rssi(), -70);
        assert_eq!(ap.channel(), 13);
    }

    #[test]
    fn parse_ssid_at_max_length() {
        let line = r#"+CWLAP:(3,"0123456789abcdef0123456789abcdef",-50,"00:11:22:33:44:55",1)"#;
        let ap = AccessPointRecord::parse(line).unwrap();
        assert_eq!(ap.ssid().len(), 32);
    }

    #[test]
    fn reject_ssid_over_max_length() {
        let line = r#"+CWLAP:(3,"0123456789abcdef0123456789abcdefX",-50,"00:11:22:33:44:55",1)"#;
        assert!(AccessPointRecord::parse(line).is_none());
    }

    #[test]
    fn reject_extra_fields() {
        // Newer ESP-AT builds append fields unless CWLAPOPT masks them
        let line = r#"+CWLAP:(3,"HomeNet",-61,"a4:2b:b0:12:ce:0f",6,-1,-1,4,4,7,1)"#;
        assert!(AccessPointRecord::parse(line).is_none());
    }

    #[test]
    fn reject_missing_fields() {
        assert!(AccessPointRecord::parse(r#"+CWLAP:(3,"HomeNet",-61,"a4:2b:b0:12:ce:0f")"#).is_none());
        assert!(AccessPointRecord::parse(r#"+CWLAP:("HomeNet",-61,"a4:2b:b0:12:ce:0f",6)"#).is_none());
    }

    #[test]
    fn reject_malformed_bssid() {
        for line in [
            r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce:0g",6)"#,
            r#"+CWLAP:(3,"n",-61,"a4-2b-b0-12-ce-0f",6)"#,
            r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce",6)"#,
            r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce:0f:00",6)"#,
            r#"+CWLAP:(3,"n",-61,"+4:2b:b0:12:ce:0f",6)"#,
            r#"+CWLAP:(3,"n",-61,a4:2b:b0:12:ce:0f,6)"#,
        ] {
            assert!(AccessPointRecord::parse(line).is_none(), "accepted {line}");
        }
    }

    #[test]
    fn reject_bad_numbers() {
        assert!(AccessPointRecord::parse(r#"+CWLAP:(x,"n",-61,"a4:2b:b0:12:ce:0f",6)"#).is_none());
        assert!(AccessPointRecord::parse(r#"+CWLAP:(3,"n",-300,"a4:2b:b0:12:ce:0f",6)"#).is_none());
        assert!(AccessPointRecord::parse(r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce:0f",0)"#).is_none());
        assert!(AccessPointRecord::parse(r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce:0f", 6)"#).is_none());
    }

    #[test]
    fn reject_unterminated_and_foreign_lines() {
        assert!(AccessPointRecord::parse(r#"+CWLAP:(3,"n",-61,"a4:2b:b0:12:ce:0f",6"#).is_none());
        assert!(AccessPointRecord::parse("OK").is_none());
        assert!(AccessPointRecord::parse("").is_none());
        assert!(AccessPointRecord::parse("busy p...").is_none());
    }

    #[test]
    fn display_matches_log_format() {
        let ap =
            AccessPointRecord::parse(r#"+CWLAP:(3,"HomeNet",-61,"a4:2b:b0:12:ce:0f",6)"#).unwrap();
        let s = format!("{ap}");
        assert_eq!(s, "ssid=HomeNet bssid=a4:2b:b0:12:ce:0f rssi=-61 channel=6");
    }
}
