//! Host-side fakes shared by the unit tests.

use core::cell::Cell;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::command::Clock;
use crate::comm::LineQueue;
use crate::transport::PacketWrite;

/// Write half that answers the first packet with a scripted response,
/// pushing the lines straight onto the queue.
pub struct FakeModem<'q> {
    queue: &'q LineQueue,
    response: Vec<String>,
    pub sent: Vec<Vec<u8>>,
}

impl<'q> FakeModem<'q> {
    pub fn new(queue: &'q LineQueue, response: &[&str]) -> Self {
        Self::from_lines(queue, response.iter().map(|l| l.to_string()).collect())
    }

    pub fn from_lines(queue: &'q LineQueue, response: Vec<String>) -> Self {
        Self {
            queue,
            response,
            sent: Vec::new(),
        }
    }
}

impl PacketWrite for FakeModem<'_> {
    type Error = ();

    fn write_packet(&mut self, data: &[u8]) -> Result<(), ()> {
        self.sent.push(data.to_vec());
        for line in self.response.drain(..) {
            self.queue.push(line);
        }
        Ok(())
    }
}

/// Clock that advances a fixed step every time the caller relaxes.
pub struct StepClock {
    now: Cell<u64>,
    step: u64,
    pub relaxed: Cell<u32>,
}

impl StepClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
            relaxed: Cell::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn relax(&self) {
        self.now.set(self.now.get() + self.step);
        self.relaxed.set(self.relaxed.get() + 1);
    }
}

/// A well-formed `+CWLAP` line whose BSSID ends in `n`.
pub fn ap_line(n: u8) -> String {
    std::format!(
        "+CWLAP:(3,\"net{n}\",-{},\"02:00:00:00:00:{n:02x}\",{})",
        40 + n % 50,
        1 + n % 13
    )
}
