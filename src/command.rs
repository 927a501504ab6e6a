//! AT command engine.
//!
//! Commands go out through the write half of the link; responses come back
//! as lines on the shared [`LineQueue`]. Every exchange ends with a terminal
//! line: `OK` for success, anything starting with `ERROR` for failure. Lines
//! in between are handed to the caller (for `AT+CWLAP`, parsed into
//! [`AccessPointRecord`]s).
//!
//! Waiting is cooperative and bounded: [`ResponseSession::poll`] consumes
//! whatever is queued and returns, and [`ResponseSession::wait`] loops over
//! it with [`Clock::relax`] between rounds until the terminal line arrives
//! or the timeout expires.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::comm::LineQueue;
use crate::defaults::{CMD_ATTENTION, CMD_LIST_APS, MAX_SEND_CHUNK};
use crate::scanner::AccessPointRecord;
use crate::transport::PacketWrite;

/// Monotonic millisecond clock plus a cooperative yield.
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Called while waiting for response lines. Yield to other work here.
    fn relax(&self) {}
}

/// Command-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtError {
    /// No terminal line arrived in time.
    Timeout,
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtError::Timeout => write!(f, "no terminal response from co-processor"),
        }
    }
}

/// Drives the co-processor through the write half of the link.
pub struct CommandProtocol<'q, W> {
    link: W,
    queue: &'q LineQueue,
}

impl<'q, W: PacketWrite> CommandProtocol<'q, W> {
    pub fn new(link: W, queue: &'q LineQueue) -> Self {
        Self { link, queue }
    }

    /// Render a command into one send chunk and send it.
    ///
    /// Output beyond `MAX_SEND_CHUNK` bytes is dropped.
    pub fn format(&mut self, args: fmt::Arguments<'_>) {
        let mut cmd: String<MAX_SEND_CHUNK> = String::new();
        if cmd.write_fmt(args).is_err() {
            log::warn!("command truncated to {} bytes", cmd.len());
        }
        self.send_chunk(cmd.as_bytes());
    }

    /// Send raw bytes in `MAX_SEND_CHUNK` pieces.
    pub fn write(&mut self, data: &[u8]) {
        for chunk in data.chunks(MAX_SEND_CHUNK) {
            self.send_chunk(chunk);
        }
    }

    fn send_chunk(&mut self, chunk: &[u8]) {
        if let Err(e) = self.link.write_packet(chunk) {
            log::warn!("send error: {:?}", e);
        }
    }

    /// Send `command` and open a session for its response.
    ///
    /// Lines still queued from an earlier exchange (one that timed out, or
    /// unsolicited reports) are discarded first.
    pub fn begin(&mut self, command: &str) -> ResponseSession<'q> {
        let stale = self.queue.clear();
        if stale > 0 {
            log::debug!("discarded {} stale lines", stale);
        }
        self.write(command.as_bytes());
        ResponseSession::new(self.queue)
    }

    /// Run a command to completion, ignoring intermediate lines.
    ///
    /// `Ok(true)` on `OK`, `Ok(false)` on `ERROR`.
    pub fn command<C: Clock>(
        &mut self,
        command: &str,
        clock: &C,
        timeout_ms: u64,
    ) -> Result<bool, AtError> {
        self.begin(command)
            .wait(clock, timeout_ms, |line| log::debug!("< {}", line))
    }

    /// Check that the co-processor answers at all.
    pub fn probe<C: Clock>(&mut self, clock: &C, timeout_ms: u64) -> bool {
        matches!(self.command(CMD_ATTENTION, clock, timeout_ms), Ok(true))
    }

    /// List visible access points.
    ///
    /// `handler` runs synchronously for every well-formed `+CWLAP` line, in
    /// arrival order. Malformed lines are skipped. The result reports the
    /// terminal line: `Ok(true)` on `OK`, `Ok(false)` on `ERROR`.
    pub fn scan<C, F>(&mut self, clock: &C, timeout_ms: u64, mut handler: F) -> Result<bool, AtError>
    where
        C: Clock,
        F: FnMut(&AccessPointRecord),
    {
        self.begin(CMD_LIST_APS)
            .wait(clock, timeout_ms, |line| dispatch_scan_line(line, &mut handler))
    }

    pub fn into_inner(self) -> W {
        self.link
    }
}

/// Response side of one command exchange.
pub struct ResponseSession<'q> {
    queue: &'q LineQueue,
    lines: usize,
}

impl<'q> ResponseSession<'q> {
    pub fn new(queue: &'q LineQueue) -> Self {
        Self { queue, lines: 0 }
    }

    /// Consume every queued line.
    ///
    /// Returns `Some(true)` on `OK`, `Some(false)` on `ERROR...`, and `None`
    /// when the queue ran dry first. Non-terminal lines go to `on_line`.
    pub fn poll<F: FnMut(&str)>(&mut self, mut on_line: F) -> Option<bool> {
        while let Some(line) = self.queue.pop() {
            if line == "OK" {
                return Some(true);
            }
            if line.starts_with("ERROR") {
                log::debug!("command failed: {}", line);
                return Some(false);
            }
            self.lines += 1;
            on_line(&line);
        }
        None
    }

    /// Poll until a terminal line arrives or `timeout_ms` elapses.
    pub fn wait<C, F>(&mut self, clock: &C, timeout_ms: u64, mut on_line: F) -> Result<bool, AtError>
    where
        C: Clock,
        F: FnMut(&str),
    {
        let start = clock.now_ms();
        loop {
            if let Some(ok) = self.poll(&mut on_line) {
                return Ok(ok);
            }
            if clock.now_ms().saturating_sub(start) >= timeout_ms {
                log::warn!("no response after {} ms ({} lines)", timeout_ms, self.lines);
                return Err(AtError::Timeout);
            }
            clock.relax();
        }
    }

    /// Non-terminal lines consumed so far.
    pub fn lines_seen(&self) -> usize {
        self.lines
    }
}

/// Parse one `AT+CWLAP` response line and hand it to `handler` if it matches.
pub fn dispatch_scan_line<F: FnMut(&AccessPointRecord)>(line: &str, handler: &mut F) {
    match AccessPointRecord::parse(line) {
        Some(ap) => handler(&ap),
        None => log::trace!("ignored: {}", line),
    }
}
