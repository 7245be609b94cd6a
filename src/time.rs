//! ROS timestamps and the clocks that produce them.

use chrono::{DateTime, Utc};
use std::{fmt, time::Duration};

/// A ROS 1 timestamp, seconds and nanoseconds since the unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

impl Time {
    pub const ZERO: Time = Time { secs: 0, nsecs: 0 };

    /// The latest representable time. Arithmetic saturates here.
    pub const MAX: Time = Time {
        secs: u32::MAX,
        nsecs: 999_999_999,
    };

    pub fn new(secs: u32, nsecs: u32) -> Self {
        // Normalize so that nsecs stays below one second.
        match secs.checked_add(nsecs / 1_000_000_000) {
            Some(secs) => Self {
                secs,
                nsecs: nsecs % 1_000_000_000,
            },
            None => Self::MAX,
        }
    }

    pub fn from_nanos(nanos: u64) -> Self {
        match u32::try_from(nanos / 1_000_000_000) {
            Ok(secs) => Self {
                secs,
                nsecs: (nanos % 1_000_000_000) as u32,
            },
            Err(_) => Self::MAX,
        }
    }

    pub fn as_nanos(&self) -> u64 {
        self.secs as u64 * 1_000_000_000 + self.nsecs as u64
    }

    /// Encodes the time as it appears in bag record headers.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.secs.to_le_bytes());
        bytes[4..].copy_from_slice(&self.nsecs.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        let [s0, s1, s2, s3, n0, n1, n2, n3] = bytes;
        Self {
            secs: u32::from_le_bytes([s0, s1, s2, s3]),
            nsecs: u32::from_le_bytes([n0, n1, n2, n3]),
        }
    }

    /// Returns the time elapsed since `earlier`, or zero if `earlier` is later.
    pub fn saturating_sub(&self, earlier: Time) -> Duration {
        Duration::from_nanos(self.as_nanos().saturating_sub(earlier.as_nanos()))
    }

    pub fn saturating_add(&self, duration: Duration) -> Time {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Time::from_nanos(self.as_nanos().saturating_add(nanos))
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(datetime: DateTime<Utc>) -> Self {
        // Times before the epoch or past 2106 do not fit a ROS time.
        let secs = datetime.timestamp().clamp(0, u32::MAX as i64) as u32;
        Self {
            secs,
            nsecs: datetime.timestamp_subsec_nanos().min(999_999_999),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nsecs)
    }
}

/// A source of timestamps.
pub trait Clock {
    fn now(&mut self) -> Time;
}

/// Reads the wall clock.
///
/// Successive readings never go backwards, even if the system clock is
/// adjusted between them.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Time,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Time {
        let now = Time::from(Utc::now()).max(self.last);
        self.last = now;
        now
    }
}

/// A clock that starts at a fixed time and advances by `step` on every reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    next: Time,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: Time, step: Duration) -> Self {
        Self { next: start, step }
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Time {
        let now = self.next;
        self.next = now.saturating_add(self.step);
        now
    }
}
