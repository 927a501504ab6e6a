//! devlocator library: device location over an ESP-AT WiFi co-processor.
//!
//! The host talks to the co-processor with AT commands over a packet
//! transport, lists the visible access points, and publishes them to a
//! geolocation integration. Platform code supplies the transport, a clock
//! and the cloud link; everything here is testable on any host with
//! `cargo test`.
//!
//! The crate is organized in three layers:
//! - **Line layer**: `transport`, `comm`: packets in, response lines out.
//! - **Command layer**: `command`, `scanner`: AT exchanges and `+CWLAP`
//!   parsing.
//! - **Locator layer**: `aggregator`, `protocol`, `locator`: payload
//!   building, the publish state machine and the location reply.
//!
//! `no_std` with `alloc` (the response line queue lives on the heap).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod aggregator;
pub mod board;
pub mod comm;
pub mod command;
pub mod defaults;
pub mod locator;
pub mod protocol;
pub mod scanner;
pub mod transport;

#[cfg(test)]
mod testutil;
