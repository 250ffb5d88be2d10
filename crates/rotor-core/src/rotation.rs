//! Rotation selection algorithms
//!
//! Three pure functions, one per job kind. They take the pool, the live
//! values, and the persisted cursor, and return the values to write plus
//! the cursor to persist. No I/O happens here; the evaluator gathers the
//! inputs and the engine applies the outputs, which keeps these testable
//! against literal scenarios.

use std::net::IpAddr;

/// One record update the engine should issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    /// Provider-assigned record id
    pub record_id: String,
    /// Value to write
    pub value: IpAddr,
}

/// The concrete work a job evaluation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Updates to apply, in order
    pub updates: Vec<RecordUpdate>,
    /// Cursor to persist once at least one update lands. `None` for
    /// cursor-less kinds (shuffle).
    pub new_cursor: Option<u32>,
}

/// Pick the next value for a single-record job.
///
/// Returns the chosen address and the cursor to persist (the index of
/// the chosen pool entry).
///
/// A one-entry pool always yields that entry, even when it equals the
/// live value; the firing still happens and the provider may short-
/// circuit the no-op. With two or more entries the candidate after the
/// cursor is taken, advancing once more if it equals the live value, so
/// the operator never sees a "same IP again" rotation while a distinct
/// alternative exists.
pub fn pick_single(pool: &[IpAddr], live: IpAddr, cursor: u32) -> (IpAddr, u32) {
    debug_assert!(!pool.is_empty());
    if pool.len() == 1 {
        return (pool[0], 0);
    }

    let n = pool.len() as u32;
    let mut index = (cursor + 1) % n;
    if pool[index as usize] == live {
        index = (cursor + 2) % n;
    }
    (pool[index as usize], index)
}

/// Compute the window of pool values for a multi-record job.
///
/// Record `i` receives `pool[(cursor + i) mod |pool|]`; the window
/// start slides forward by one position per firing.
pub fn pool_window(pool: &[IpAddr], records: usize, cursor: u32) -> (Vec<IpAddr>, u32) {
    debug_assert!(pool.len() >= records);
    let n = pool.len() as u32;
    let values = (0..records as u32)
        .map(|i| pool[((cursor + i) % n) as usize])
        .collect();
    (values, (cursor + 1) % n)
}

/// Cyclically shift live values: record `i` receives `live[(i + shift)
/// mod |live|]`.
///
/// The caller samples the live values once before calling so the
/// permutation is deterministic within the firing.
pub fn shuffle_values(live: &[IpAddr], shift: u32) -> Vec<IpAddr> {
    debug_assert!(live.len() >= 2);
    let n = live.len() as u32;
    (0..n).map(|i| live[((i + shift) % n) as usize]).collect()
}
