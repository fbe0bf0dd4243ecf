//! Simulation time model.
//!
//! # Design
//!
//! Time is wall-clock driven: agents run as independently scheduled tasks
//! with real sleeps and timeouts.  Absolute instants that cross task
//! boundaries (incident expiry, gossip payloads) are expressed as a
//! [`Timestamp`] — whole milliseconds since the simulation epoch — so they
//! compare exactly and serialize as a plain integer.
//!
//! [`SimClock`] maps the runtime's monotonic clock onto timestamps.  It reads
//! `tokio::time::Instant`, so tests running with a paused runtime clock
//! (`#[tokio::test(start_paused = true)]`) observe fully deterministic time.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// Milliseconds since the simulation epoch.
///
/// All peers of one simulation share the same epoch, which makes absolute
/// expiry times comparable across agents regardless of delivery delay.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        let ms = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(ms))
    }
}

impl std::ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn sub(self, rhs: Duration) -> Timestamp {
        let ms = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_sub(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{:.3}s", self.as_secs_f64())
    }
}

// ── SimClock ──────────────────────────────────────────────────────────────────

/// Converts the runtime's monotonic clock into [`Timestamp`]s.
///
/// `SimClock` is `Copy` and holds no heap data; every component of one
/// simulation is handed a copy of the same clock.
#[derive(Copy, Clone, Debug)]
pub struct SimClock {
    epoch: Instant,
}

impl SimClock {
    /// Start a clock whose epoch is "now".
    pub fn start() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Current time relative to the epoch.
    #[inline]
    pub fn now(&self) -> Timestamp {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        Timestamp(u64::try_from(ms).unwrap_or(u64::MAX))
    }

    /// Time elapsed since the epoch.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::start()
    }
}
