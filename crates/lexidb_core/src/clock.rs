//! Time source for record timestamps.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces ISO-8601 timestamps that strictly increase within a process.
///
/// Stamps are UTC with microsecond precision (`2024-05-01T09:30:00.000000Z`),
/// so their text order is their time order. If the clock has not advanced
/// since the last stamp, the new stamp is one microsecond later.
#[derive(Debug)]
pub struct Timestamper {
    clock: Arc<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Timestamper {
    /// Creates a timestamper over `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> String {
        let mut last = self.last.lock();
        let mut stamp = self.clock.now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if stamp <= prev {
                stamp = prev + Duration::microseconds(1);
            }
        }
        *last = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl Default for Timestamper {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
