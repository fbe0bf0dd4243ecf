//! In-memory metrics recorder.
//!
//! Collects trip durations, emergency response times, congestion snapshots
//! and the replan count.  Durations are measured on the simulation clock, so
//! they are exact under paused test time.  Persistence and plotting are left
//! to the caller, which can serialize [`MetricsSummary`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

use tm_agents::TrafficObserver;
use tm_core::{AgentId, SimClock, Timestamp};

/// Aggregates reported at the end of a run.  Times are in seconds; `None`
/// when nothing was recorded.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub avg_trip_time:    Option<f64>,
    /// The most recent emergency response.
    pub ev_response_time: Option<f64>,
    pub avg_rho:          Option<f64>,
    pub n_trips:          usize,
    pub total_replans:    u64,
}

#[derive(Default)]
struct Records {
    trip_start:   FxHashMap<AgentId, Timestamp>,
    ev_start:     Option<Timestamp>,
    trips:        Vec<f64>,
    ev_responses: Vec<f64>,
    rho:          Vec<f64>,
}

/// [`TrafficObserver`] that keeps everything in memory.
pub struct MetricsRecorder {
    clock:   SimClock,
    records: Mutex<Records>,
    replans: AtomicU64,
}

impl MetricsRecorder {
    pub fn new(clock: SimClock) -> Self {
        Self { clock, records: Mutex::default(), replans: AtomicU64::new(0) }
    }

    /// Record one congestion sample (occupied nodes / total nodes).
    pub fn log_congestion(&self, rho: f64) {
        self.lock().rho.push(rho);
    }

    /// Completed trip durations in completion order.
    pub fn trip_times(&self) -> Vec<f64> {
        self.lock().trips.clone()
    }

    pub fn ev_responses(&self) -> Vec<f64> {
        self.lock().ev_responses.clone()
    }

    pub fn rho_snapshots(&self) -> Vec<f64> {
        self.lock().rho.clone()
    }

    pub fn total_replans(&self) -> u64 {
        self.replans.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> MetricsSummary {
        let records = self.lock();
        MetricsSummary {
            avg_trip_time:    mean(&records.trips),
            ev_response_time: records.ev_responses.last().copied(),
            avg_rho:          mean(&records.rho),
            n_trips:          records.trips.len(),
            total_replans:    self.total_replans(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TrafficObserver for MetricsRecorder {
    fn on_trip_start(&self, agent: AgentId) {
        let now = self.clock.now();
        self.lock().trip_start.insert(agent, now);
    }

    fn on_trip_end(&self, agent: AgentId) {
        let now = self.clock.now();
        let mut records = self.lock();
        if let Some(t0) = records.trip_start.remove(&agent) {
            let secs = now.saturating_since(t0).as_secs_f64();
            trace!(%agent, secs, "trip recorded");
            records.trips.push(secs);
        }
    }

    /// Only one response is timed at a time; a new start restarts the timer.
    fn on_emergency_start(&self) {
        let now = self.clock.now();
        self.lock().ev_start = Some(now);
    }

    fn on_emergency_end(&self) {
        let now = self.clock.now();
        let mut records = self.lock();
        if let Some(t0) = records.ev_start.take() {
            records.ev_responses.push(now.saturating_since(t0).as_secs_f64());
        }
    }

    fn on_replan(&self, _agent: AgentId) {
        self.replans.fetch_add(1, Ordering::Relaxed);
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
