//! Serial numbers for events
//!
//! Every event carries a serial number taken from a [`SerialNumbers`]
//! generator. The generator is a cheap handle: containers derived from one
//! another share the same counter so that serials stay comparable when events
//! are cloned and moved between them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::midel::{Midel, MidelKind};

#[derive(Debug, Clone)]
pub struct SerialNumbers {
    next: Arc<AtomicU64>,
}

impl Default for SerialNumbers {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialNumbers {
    /// Serial 0 is never handed out; probes use it as a lower bound.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Take the next serial number
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The serial that the next call to [`next`](Self::next) will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Build an event at `tick` with a fresh serial number
    pub fn stamp(&self, tick: u64, kind: impl Into<MidelKind>) -> Midel {
        Midel::new(self.next(), tick, kind)
    }

    /// True when both handles draw from the same counter
    pub fn shares_with(&self, other: &SerialNumbers) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}
