//! The wall-clock collaborator.
//!
//! The engine never reads the host clock directly; it asks a [`Clock`] it
//! was constructed with. Production engines use [`SystemClock`]; tests that
//! need deterministic timestamps inject a [`FixedClock`].

use crate::types::TimeSpec;
use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic-enough wall clock.
pub trait Clock: Send {
    /// The current time since the epoch.
    fn now(&self) -> TimeSpec;
}

/// The host system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeSpec {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => TimeSpec {
                sec: d.as_secs() as i64,
                nsec: i64::from(d.subsec_nanos()),
            },
            // Host clock set before the epoch; report the epoch itself.
            Err(_) => TimeSpec::default(),
        }
    }
}

/// A clock pinned to one instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub TimeSpec);

impl Clock for FixedClock {
    fn now(&self) -> TimeSpec {
        self.0
    }
}
