/// Location scan: collects WiFi access points and the serving cell into a
/// size-bounded payload for the geolocation integration.
///
/// The payload holds at most `MAX_WIFI_ENTRIES` access points so that it
/// fits one publish, however many the co-processor reports.
use core::fmt::Debug;
use core::ops::BitOr;

use heapless::Vec;

use crate::command::{Clock, CommandProtocol};
use crate::defaults::{COMMAND_TIMEOUT_MS, MAX_WIFI_ENTRIES};
use crate::protocol::{
    CellSection, CellTower, LocatePayload, Payload, PayloadError, WifiEntry, WifiSection,
};
use crate::scanner::AccessPointRecord;
use crate::transport::PacketWrite;

/// Data sources consulted by a location scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFlags {
    /// Query the co-processor for visible access points
    pub wifi: bool,
    /// Query the modem for the serving cell identity
    pub cellular: bool,
}

impl CheckFlags {
    pub const WIFI: Self = Self {
        wifi: true,
        cellular: false,
    };
    pub const CELLULAR: Self = Self {
        wifi: false,
        cellular: true,
    };
    pub const ALL: Self = Self {
        wifi: true,
        cellular: true,
    };

    pub const fn new() -> Self {
        Self::WIFI
    }
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl BitOr for CheckFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            wifi: self.wifi || rhs.wifi,
            cellular: self.cellular || rhs.cellular,
        }
    }
}

/// Serving-cell lookup, answered synchronously by the cellular modem.
pub trait CellularIdentity {
    type Error: Debug;

    fn global_identity(&mut self) -> Result<CellTower, Self::Error>;
}

/// Cell lookup for devices without a cellular modem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCellular;

/// Returned by [`NoCellular`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported;

impl CellularIdentity for NoCellular {
    type Error = Unsupported;

    fn global_identity(&mut self) -> Result<CellTower, Unsupported> {
        Err(Unsupported)
    }
}

/// Accumulates scan results until the payload is encoded.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    wifi: Option<Vec<WifiEntry, MAX_WIFI_ENTRIES>>,
    wifi_seen: usize,
    cell: Option<CellTower>,
}

impl PayloadBuilder {
    /// Start a payload. The WiFi section is present (possibly empty) when
    /// WiFi checking is enabled.
    pub fn new(checks: CheckFlags) -> Self {
        Self {
            wifi: checks.wifi.then(Vec::new),
            wifi_seen: 0,
            cell: None,
        }
    }

    /// Record one access point. Entries past the cap are counted but not stored.
    pub fn add_access_point(&mut self, ap: &AccessPointRecord) {
        let Some(entries) = self.wifi.as_mut() else {
            return;
        };
        self.wifi_seen += 1;

        let entry = WifiEntry {
            mac: ap.bssid_string(),
            rssi: ap.rssi(),
            channel: ap.channel(),
        };
        if entries.push(entry).is_err() {
            log::trace!("access point cap reached, dropped {}", ap);
        }
    }

    /// Look up the serving cell. On failure the cellular section is left out.
    pub fn add_cellular<L: CellularIdentity>(&mut self, source: &mut L) -> bool {
        match source.global_identity() {
            Ok(tower) => {
                log::debug!(
                    "cell id={} lac={} mcc={} mnc={}",
                    tower.cell_id,
                    tower.lac,
                    tower.mcc,
                    tower.mnc
                );
                self.cell = Some(tower);
                true
            }
            Err(e) => {
                log::info!("cell identity lookup failed: {:?}", e);
                false
            }
        }
    }

    pub fn wifi_entries(&self) -> &[WifiEntry] {
        self.wifi.as_deref().unwrap_or(&[])
    }

    /// Access points reported by the scan, including those over the cap.
    pub fn wifi_seen(&self) -> usize {
        self.wifi_seen
    }

    pub fn has_results(&self) -> bool {
        self.wifi_seen > 0 || self.cell.is_some()
    }

    /// Serialize what has been collected.
    pub fn finish(&self) -> Result<ScanReport, PayloadError> {
        let payload = Payload::encode(&LocatePayload {
            wifi: self.wifi.as_ref().map(|entries| WifiSection {
                access_points: entries.as_slice(),
            }),
            cellular: self.cell.as_ref().map(|tower| CellSection {
                operator: "",
                towers: core::slice::from_ref(tower),
            }),
        })?;

        Ok(ScanReport {
            payload,
            has_results: self.has_results(),
            wifi_seen: self.wifi_seen,
        })
    }
}

/// Outcome of one location scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub payload: Payload,
    /// At least one source contributed data
    pub has_results: bool,
    pub wifi_seen: usize,
}

/// Runs the enabled data sources and builds the payload.
#[derive(Debug, Clone, Copy)]
pub struct ScanAggregator {
    checks: CheckFlags,
    timeout_ms: u64,
}

impl ScanAggregator {
    pub const fn new(checks: CheckFlags) -> Self {
        Self {
            checks,
            timeout_ms: COMMAND_TIMEOUT_MS,
        }
    }

    /// Bound on how long the WiFi scan may wait for its terminal line.
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn checks(&self) -> CheckFlags {
        self.checks
    }

    /// Blocking scan of every enabled source.
    ///
    /// A WiFi scan that ends in `ERROR` or times out keeps the access points
    /// collected before the failure.
    pub fn scan<W, C, L>(
        &self,
        protocol: &mut CommandProtocol<'_, W>,
        clock: &C,
        cellular: &mut L,
    ) -> Result<ScanReport, PayloadError>
    where
        W: PacketWrite,
        C: Clock,
        L: CellularIdentity,
    {
        let mut builder = PayloadBuilder::new(self.checks);

        if self.checks.wifi {
            match protocol.scan(clock, self.timeout_ms, |ap| builder.add_access_point(ap)) {
                Ok(true) => {}
                Ok(false) => log::warn!("wifi scan reported ERROR"),
                Err(e) => log::warn!("wifi scan: {}", e),
            }
            log::debug!(
                "wifi scan: {} access points, {} kept",
                builder.wifi_seen(),
                builder.wifi_entries().len()
            );
        }

        if self.checks.cellular {
            builder.add_cellular(cellular);
        }

        builder.finish()
    }
}
