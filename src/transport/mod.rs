//! Transport module - byte-exact reads and writes over a stream socket.
//!
//! Provides:
//! - TCP connection setup (low-latency socket options)
//! - Accumulation of partial reads into whole frames
//! - Read timeouts and external cancellation

mod socket;

pub use socket::{Stream, Transport, TransportState};
