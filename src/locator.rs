//! Device locator: decides when to scan and publish the device location.
//!
//! The locator is ticked from the caller's main loop with the current time
//! and cloud connectivity. It waits for the link to settle after connecting,
//! then publishes according to its [`LocateMode`]. Location replies from the
//! cloud come back through [`DeviceLocator::subscription_handler`].

use core::fmt::{self, Write as _};

use heapless::String;

use crate::aggregator::{CellularIdentity, CheckFlags, ScanAggregator, ScanReport};
use crate::command::{Clock, CommandProtocol};
use crate::defaults::{
    DEFAULT_EVENT_NAME, MAX_EVENT_NAME_LEN, MIN_PERIOD_SECS, WAIT_AFTER_CONNECT_MS,
};
use crate::protocol::parse_location_reply;
use crate::transport::PacketWrite;

pub type EventName = String<MAX_EVENT_NAME_LEN>;

/// Reply topic buffer: `hook-response/<event>/<device id>`
pub type TopicString = String<128>;

const REPLY_TOPIC_PREFIX: &str = "hook-response/";

/// Cloud side of the locator: connectivity, publish and subscribe.
pub trait CloudLink {
    fn connected(&self) -> bool;

    /// Publish `data` under `event`. Returns whether the cloud accepted it.
    fn publish(&mut self, event: &str, data: &str) -> bool;

    /// Route messages on `topic` to [`DeviceLocator::subscription_handler`].
    fn subscribe(&mut self, topic: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorState {
    /// Waiting for the cloud connection
    ConnectWait,
    /// Connected, letting the link settle
    ConnectedWait,
    /// Periodic publishing
    Connected,
    /// Nothing left to do
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMode {
    /// Publish only when the application calls `publish_location`
    Manual,
    /// Publish once after connecting
    Once,
    /// Publish every `period_ms` while connected
    Periodic { period_ms: u64 },
}

/// Work requested by [`DeviceLocator::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorAction {
    /// Run a location scan and publish the result
    Publish,
}

impl fmt::Display for LocatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocatorState::ConnectWait => "connect-wait",
            LocatorState::ConnectedWait => "connected-wait",
            LocatorState::Connected => "connected",
            LocatorState::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Locator state machine with its configuration.
///
/// Configure with the `with_*` builder methods before the first tick.
/// `F` is the location reply callback, `(lat, lon, accuracy)`.
pub struct DeviceLocator<F = fn(f32, f32, f32)> {
    mode: LocateMode,
    event_name: EventName,
    checks: CheckFlags,
    wait_after_connect_ms: u64,
    callback: Option<F>,
    state: LocatorState,
    state_time: u64,
    /// Set on entering `Connected`; the first periodic scan runs at once.
    scan_due: bool,
}

impl DeviceLocator {
    /// Manual mode, default event name, WiFi checks, no reply callback.
    pub fn new() -> Self {
        Self {
            mode: LocateMode::Manual,
            event_name: default_event_name(),
            checks: CheckFlags::default(),
            wait_after_connect_ms: WAIT_AFTER_CONNECT_MS,
            callback: None,
            state: LocatorState::ConnectWait,
            state_time: 0,
            scan_due: false,
        }
    }
}

impl Default for DeviceLocator {
    fn default() -> Self {
        Self::new()
    }
}

fn default_event_name() -> EventName {
    let mut name = EventName::new();
    let _ = name.push_str(DEFAULT_EVENT_NAME);
    name
}

impl<F> DeviceLocator<F> {
    /// Publish once, shortly after the first connect.
    pub fn with_locate_once(mut self) -> Self {
        self.mode = LocateMode::Once;
        self
    }

    /// Publish every `seconds` while connected. Periods under 5 s are raised to 5 s.
    pub fn with_locate_periodic(mut self, seconds: u64) -> Self {
        let seconds = seconds.max(MIN_PERIOD_SECS);
        self.mode = LocateMode::Periodic {
            period_ms: seconds.saturating_mul(1000),
        };
        self
    }

    /// Event name for publishes. Names longer than 64 bytes are rejected and
    /// the previous name is kept.
    pub fn with_event_name(mut self, name: &str) -> Self {
        match EventName::try_from(name) {
            Ok(name) => self.event_name = name,
            Err(_) => log::warn!(
                "event name longer than {} bytes, keeping {}",
                MAX_EVENT_NAME_LEN,
                self.event_name
            ),
        }
        self
    }

    pub fn with_check_flags(mut self, checks: CheckFlags) -> Self {
        self.checks = checks;
        self
    }

    /// Settling time between connect and the first scan.
    pub fn with_wait_after_connect(mut self, ms: u64) -> Self {
        self.wait_after_connect_ms = ms;
        self
    }

    /// Register the location reply callback.
    ///
    /// The cloud must route the reply topic (see [`reply_topic`](Self::reply_topic))
    /// to [`subscription_handler`](Self::subscription_handler).
    pub fn with_subscribe<G>(self, callback: G) -> DeviceLocator<G>
    where
        G: FnMut(f32, f32, f32),
    {
        DeviceLocator {
            mode: self.mode,
            event_name: self.event_name,
            checks: self.checks,
            wait_after_connect_ms: self.wait_after_connect_ms,
            callback: Some(callback),
            state: self.state,
            state_time: self.state_time,
            scan_due: self.scan_due,
        }
    }

    pub fn state(&self) -> LocatorState {
        self.state
    }

    pub fn mode(&self) -> LocateMode {
        self.mode
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn checks(&self) -> CheckFlags {
        self.checks
    }

    /// Advance the state machine. Call once per main loop iteration.
    pub fn tick(&mut self, now_ms: u64, connected: bool) -> Option<LocatorAction> {
        match self.state {
            LocatorState::ConnectWait => {
                if connected {
                    self.state_time = now_ms;
                    self.enter(LocatorState::ConnectedWait);
                }
            }
            LocatorState::ConnectedWait => {
                if now_ms.saturating_sub(self.state_time) >= self.wait_after_connect_ms {
                    match self.mode {
                        LocateMode::Once => {
                            self.enter(LocatorState::Idle);
                            return Some(LocatorAction::Publish);
                        }
                        LocateMode::Manual => self.enter(LocatorState::Idle),
                        LocateMode::Periodic { .. } => {
                            self.scan_due = true;
                            self.enter(LocatorState::Connected);
                        }
                    }
                }
            }
            LocatorState::Connected => {
                if !connected {
                    self.scan_due = false;
                    self.enter(LocatorState::ConnectWait);
                } else if self.periodic_scan_due(now_ms) {
                    self.scan_due = false;
                    self.state_time = now_ms;
                    return Some(LocatorAction::Publish);
                }
            }
            LocatorState::Idle => {}
        }
        None
    }

    fn periodic_scan_due(&self, now_ms: u64) -> bool {
        match self.mode {
            LocateMode::Periodic { period_ms } => {
                self.scan_due || now_ms.saturating_sub(self.state_time) >= period_ms
            }
            _ => false,
        }
    }

    fn enter(&mut self, state: LocatorState) {
        log::debug!("locator {} -> {}", self.state, state);
        self.state = state;
    }

    /// Scan with the configured checks and publish the payload.
    ///
    /// Publishes only when the scan found something and the cloud is
    /// connected. Returns whether a publish was accepted.
    pub fn publish_location<W, C, L, P>(
        &self,
        protocol: &mut CommandProtocol<'_, W>,
        clock: &C,
        cellular: &mut L,
        cloud: &mut P,
    ) -> bool
    where
        W: PacketWrite,
        C: Clock,
        L: CellularIdentity,
        P: CloudLink,
    {
        log::info!("publishing location");

        match ScanAggregator::new(self.checks).scan(protocol, clock, cellular) {
            Ok(report) => self.publish_report(&report, cloud),
            Err(e) => {
                log::warn!("location payload: {}", e);
                false
            }
        }
    }

    /// Publish an already collected scan.
    pub fn publish_report<P: CloudLink>(&self, report: &ScanReport, cloud: &mut P) -> bool {
        if !report.has_results {
            log::info!("no location data, nothing published");
            return false;
        }
        if !cloud.connected() {
            log::info!("cloud disconnected, location not published");
            return false;
        }
        log::debug!("{} {}", self.event_name, report.payload.as_str());
        cloud.publish(&self.event_name, report.payload.as_str())
    }

    /// Tick and, when a publish is due, run it. Returns whether a publish
    /// was accepted.
    pub fn run<W, C, L, P>(
        &mut self,
        protocol: &mut CommandProtocol<'_, W>,
        clock: &C,
        cellular: &mut L,
        cloud: &mut P,
    ) -> bool
    where
        W: PacketWrite,
        C: Clock,
        L: CellularIdentity,
        P: CloudLink,
    {
        match self.tick(clock.now_ms(), cloud.connected()) {
            Some(LocatorAction::Publish) => {
                self.publish_location(protocol, clock, cellular, cloud)
            }
            None => false,
        }
    }

    /// Topic the location reply arrives on: `hook-response/<event>/<device id>`.
    ///
    /// `None` when the topic does not fit [`TopicString`].
    pub fn reply_topic(&self, device_id: &str) -> Option<TopicString> {
        let mut topic = TopicString::new();
        write!(topic, "{}{}/{}", REPLY_TOPIC_PREFIX, self.event_name, device_id).ok()?;
        Some(topic)
    }

    /// Subscribe to the reply topic for `device_id`.
    pub fn subscribe<P: CloudLink>(&self, cloud: &mut P, device_id: &str) -> bool {
        match self.reply_topic(device_id) {
            Some(topic) => cloud.subscribe(&topic),
            None => {
                log::warn!("reply topic too long for device {}", device_id);
                false
            }
        }
    }
}

impl<F: FnMut(f32, f32, f32)> DeviceLocator<F> {
    /// Handle a location reply, `"<lat>,<lon>,<accuracy>"`.
    ///
    /// The callback runs only when all three fields are present. Returns
    /// whether it ran.
    pub fn subscription_handler(&mut self, event: &str, data: &str) -> bool {
        let Some(callback) = self.callback.as_mut() else {
            return false;
        };
        match parse_location_reply(data) {
            Some(fix) => {
                log::debug!(
                    "{}: lat={} lon={} accuracy={}",
                    event,
                    fix.lat,
                    fix.lon,
                    fix.accuracy
                );
                callback(fix.lat, fix.lon, fix.accuracy);
                true
            }
            None => {
                log::info!("{}: incomplete location reply", event);
                false
            }
        }
    }
}
