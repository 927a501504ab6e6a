/// Line layer between the packet transport and the command protocol.
///
/// The co-processor sends one response line per packet. `LineReceiver`
/// drains the link whenever data is pending and queues the decoded lines;
/// the command protocol pops them in arrival order. `LineFramer` turns a raw
/// byte stream (UART) into the same one-line-per-packet shape.
use alloc::collections::VecDeque;
use alloc::string::String;
use core::cell::RefCell;

use critical_section::Mutex;

use crate::defaults::MAX_PACKET_LEN;
use crate::transport::{PacketRead, ReadError};

// ── Line queue ─────────────────────────────────────────────────────────

/// FIFO of received response lines.
///
/// Written by the receiver context, read by the command context. The lock
/// is held for a single push or pop only. Unbounded: a stalled consumer
/// lets it grow.
pub struct LineQueue {
    lines: Mutex<RefCell<VecDeque<String>>>,
}

impl LineQueue {
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn push(&self, line: String) {
        critical_section::with(|cs| self.lines.borrow(cs).borrow_mut().push_back(line));
    }

    pub fn pop(&self) -> Option<String> {
        critical_section::with(|cs| self.lines.borrow(cs).borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.lines.borrow(cs).borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued line, returning how many were discarded.
    pub fn clear(&self) -> usize {
        critical_section::with(|cs| {
            let mut lines = self.lines.borrow(cs).borrow_mut();
            let n = lines.len();
            lines.clear();
            n
        })
    }
}

impl Default for LineQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Receiver ───────────────────────────────────────────────────────────

/// Drains the read half of the link into a [`LineQueue`].
///
/// [`poll`](Self::poll) never blocks: it reads while the data-pending
/// signal is asserted and returns. The owner calls it repeatedly, yielding
/// between calls.
pub struct LineReceiver<'q, R> {
    link: R,
    queue: &'q LineQueue,
}

impl<'q, R: PacketRead> LineReceiver<'q, R> {
    pub fn new(link: R, queue: &'q LineQueue) -> Self {
        Self { link, queue }
    }

    /// Read every pending packet. Returns the number of lines queued.
    pub fn poll(&mut self) -> usize {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let mut queued = 0;

        while self.link.data_pending() {
            match self.link.read_packet(&mut buf) {
                Ok(len) => {
                    let line = strip_terminators(&buf[..len.min(buf.len())]);
                    log::trace!("rx: {}", line);
                    self.queue.push(line);
                    queued += 1;
                }
                Err(ReadError::NoData) => {
                    log::info!("data pending but no packet could be read");
                    break;
                }
                Err(ReadError::Incomplete) => break,
                Err(ReadError::Io(e)) => {
                    log::warn!("rx packet error: {:?}", e);
                }
            }
        }

        queued
    }

    pub fn into_inner(self) -> R {
        self.link
    }
}

/// Remove every CR and LF byte and decode the rest as one line.
fn strip_terminators(packet: &[u8]) -> String {
    let bytes: heapless::Vec<u8, MAX_PACKET_LEN> = packet
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .take(MAX_PACKET_LEN)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ── Byte-stream framer ─────────────────────────────────────────────────

/// Accumulates bytes until a line terminator, then yields the line.
///
/// Used by byte-stream transports to present one packet per line.
pub struct LineFramer {
    buf: [u8; MAX_PACKET_LEN],
    pos: usize,
    /// Dropping the rest of an overlong line until its terminator
    discarding: bool,
}

impl LineFramer {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_PACKET_LEN],
            pos: 0,
            discarding: false,
        }
    }

    /// Feed a byte into the framer. Returns a complete line (without the
    /// terminator) when one is detected. Blank lines are swallowed, and a
    /// line longer than the buffer is dropped whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            self.discarding = false;
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.discarding {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            log::warn!("line longer than {} bytes discarded", MAX_PACKET_LEN);
            self.pos = 0;
            self.discarding = true;
            None
        }
    }

    /// Whether a partial line is buffered.
    pub fn has_partial(&self) -> bool {
        self.pos > 0
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Read half that replays a fixed script of packets and errors.
    struct ScriptedRx {
        script: VecDeque<Result<&'static [u8], ReadError<&'static str>>>,
    }

    impl ScriptedRx {
        fn new(script: Vec<Result<&'static [u8], ReadError<&'static str>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl PacketRead for ScriptedRx {
        type Error = &'static str;

        fn data_pending(&mut self) -> bool {
            !self.script.is_empty()
        }

        fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, ReadError<Self::Error>> {
            match self.script.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(ReadError::NoData),
            }
        }
    }

    fn ok(data: &'static [u8]) -> Result<&'static [u8], ReadError<&'static str>> {
        Ok(data)
    }

    fn drain(queue: &LineQueue) -> Vec<String> {
        core::iter::from_fn(|| queue.pop()).collect()
    }

    // ── LineQueue ───────────────────────────────────────────────────

    #[test]
    fn queue_is_fifo() {
        let queue = LineQueue::new();
        for s in ["a", "b", "c"] {
            queue.push(s.into());
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(drain(&queue), ["a", "b", "c"]);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn queue_clear_reports_discarded() {
        let queue = LineQueue::new();
        queue.push("x".into());
        queue.push("y".into());
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_preserves_order_across_threads() {
        let queue = LineQueue::new();
        let received = std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..1000 {
                    queue.push(std::format!("line {i}"));
                }
            });

            let mut received = Vec::new();
            while received.len() < 1000 {
                match queue.pop() {
                    Some(line) => received.push(line),
                    None => std::thread::yield_now(),
                }
            }
            received
        });

        for (i, line) in received.iter().enumerate() {
            assert_eq!(*line, std::format!("line {i}"));
        }
    }

    // ── LineReceiver ────────────────────────────────────────────────

    #[test]
    fn receiver_strips_terminators() {
        let queue = LineQueue::new();
        let rx = ScriptedRx::new(std::vec![
            ok(b"AT+CWLAP\r\r\n"),
            ok(b"\r\n"),
            ok(b"+CWLAP:(3,\"a\",-50,\"00:11:22:33:44:55\",1)\r\n"),
            ok(b"OK\r\n"),
        ]);
        let mut receiver = LineReceiver::new(rx, &queue);
        assert_eq!(receiver.poll(), 4);
        assert_eq!(
            drain(&queue),
            ["AT+CWLAP", "", "+CWLAP:(3,\"a\",-50,\"00:11:22:33:44:55\",1)", "OK"]
        );
    }

    #[test]
    fn receiver_idle_when_nothing_pending() {
        let queue = LineQueue::new();
        let mut receiver = LineReceiver::new(ScriptedRx::new(Vec::new()), &queue);
        assert_eq!(receiver.poll(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn receiver_stops_cycle_on_no_data() {
        let queue = LineQueue::new();
        let rx = ScriptedRx::new(std::vec![ok(b"first"), Err(ReadError::NoData), ok(b"later")]);
        let mut receiver = LineReceiver::new(rx, &queue);
        assert_eq!(receiver.poll(), 1);
        assert_eq!(receiver.poll(), 1);
        assert_eq!(drain(&queue), ["first", "later"]);
    }

    #[test]
    fn receiver_skips_failed_packet_and_recovers() {
        let queue = LineQueue::new();
        let rx = ScriptedRx::new(std::vec![
            ok(b"one"),
            Err(ReadError::Io("crc")),
            ok(b"two"),
            Err(ReadError::Incomplete),
            ok(b"three"),
        ]);
        let mut receiver = LineReceiver::new(rx, &queue);
        let mut total = 0;
        for _ in 0..3 {
            total += receiver.poll();
        }
        assert_eq!(total, 3);
        assert_eq!(drain(&queue), ["one", "two", "three"]);
    }

    #[test]
    fn receiver_keeps_draining_after_io_error() {
        let queue = LineQueue::new();
        let rx = ScriptedRx::new(std::vec![ok(b"one"), Err(ReadError::Io("crc")), ok(b"two")]);
        let mut receiver = LineReceiver::new(rx, &queue);
        assert_eq!(receiver.poll(), 2);
        assert_eq!(drain(&queue), ["one", "two"]);
    }

    #[test]
    fn receiver_replaces_invalid_utf8() {
        let queue = LineQueue::new();
        let rx = ScriptedRx::new(std::vec![ok(b"caf\xff\r\n")]);
        LineReceiver::new(rx, &queue).poll();
        assert_eq!(queue.pop().unwrap(), "caf\u{FFFD}");
    }

    // ── LineFramer ──────────────────────────────────────────────────

    fn feed_all(framer: &mut LineFramer, data: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &b in data {
            if let Some(line) = framer.feed(b) {
                lines.push(line.to_vec());
            }
        }
        lines
    }

    #[test]
    fn framer_splits_on_crlf() {
        let mut framer = LineFramer::new();
        let lines = feed_all(&mut framer, b"busy p...\r\n\r\nOK\r\n");
        assert_eq!(lines, [b"busy p...".to_vec(), b"OK".to_vec()]);
        assert!(!framer.has_partial());
    }

    #[test]
    fn framer_holds_partial_line() {
        let mut framer = LineFramer::new();
        assert!(feed_all(&mut framer, b"+CWLAP:(3,").is_empty());
        assert!(framer.has_partial());
        let lines = feed_all(&mut framer, b"\"a\")\n");
        assert_eq!(lines, [b"+CWLAP:(3,\"a\")".to_vec()]);
    }

    #[test]
    fn framer_discards_overlong_line() {
        let mut framer = LineFramer::new();
        let long = [b'x'; MAX_PACKET_LEN + 10];
        let mut lines = feed_all(&mut framer, &long);
        lines.extend(feed_all(&mut framer, b"\nOK\n"));
        assert_eq!(lines, [b"OK".to_vec()]);
    }

    #[test]
    fn framer_overlong_tail_cannot_end_a_command() {
        let mut framer = LineFramer::new();
        let mut data = std::vec![b'x'; MAX_PACKET_LEN];
        data.extend_from_slice(b"!ERROR busy\n");
        assert!(feed_all(&mut framer, &data).is_empty());
        assert!(!framer.has_partial());
        assert_eq!(feed_all(&mut framer, b"OK\r\n"), [b"OK".to_vec()]);
    }
}
