//! Bounded capture of sandbox streams.
//!
//! Reader threads drain the unit's stdout and stderr and the driver's
//! private event pipe while the process runs. Unit streams are capped; when
//! one overflows, the shared flag is raised so the waiting thread can kill
//! the process. The event pipe keeps at most a fixed number of events and
//! counts anything beyond it.

use super::driver::DriverEvent;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Longest accepted event line.
pub const MAX_EVENT_LINE: usize = 1024 * 1024;

const CHUNK: usize = 8192;

/// Bytes read from a unit stream up to a cap.
#[derive(Debug, Default)]
pub struct CappedBytes {
    /// Retained bytes.
    pub bytes: Vec<u8>,
    /// More bytes arrived than the cap allows.
    pub overflowed: bool,
}

impl CappedBytes {
    /// Retained bytes as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Drain a stream keeping at most `cap` bytes, raising `overflow` past it.
pub fn read_capped<R: Read>(mut reader: R, cap: usize, overflow: &AtomicBool) -> CappedBytes {
    let mut captured = CappedBytes::default();
    let mut chunk = [0_u8; CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.bytes.extend_from_slice(&chunk[..room]);
                    captured.overflowed = true;
                    overflow.store(true, Ordering::Relaxed);
                    break;
                }
                captured.bytes.extend_from_slice(&chunk[..n]);
            }
        }
    }
    captured
}

/// Events decoded from the driver's pipe.
#[derive(Debug, Default)]
pub struct EventLog {
    /// Events in arrival order.
    pub events: Vec<DriverEvent>,
    /// Lines that failed to decode.
    pub malformed: usize,
    /// Lines past the expected event count, discarded unread.
    pub excess: usize,
}

impl EventLog {
    /// Whether anything arrived that the driver never sends.
    pub fn is_clean(&self) -> bool {
        self.malformed == 0 && self.excess == 0
    }
}

/// Drain the event pipe, keeping at most `max_events` decoded events.
pub fn read_events<R: Read>(reader: R, max_events: usize) -> EventLog {
    let mut log = EventLog::default();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match (&mut reader).take(MAX_EVENT_LINE as u64).read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if log.events.len() + log.malformed >= max_events {
            log.excess += 1;
            continue;
        }
        let payload = line.strip_suffix(b"\n").unwrap_or(line.as_slice());
        match serde_json::from_slice::<DriverEvent>(payload) {
            Ok(event) => log.events.push(event),
            Err(e) => {
                debug!(error = %e, "undecodable driver event");
                log.malformed += 1;
            }
        }
    }
    log
}
