//! Per-segment occupancy and congestion estimation.
//!
//! Each tracked segment holds the set of vehicles currently on it, an
//! optional capacity override, and an exponentially smoothed density:
//!
//! ```text
//! instant = min(|occupants| / capacity, 1.0)
//! ema     = α · instant + (1 − α) · ema_prev
//! ```
//!
//! Smoothing only advances when [`OccupancyTracker::density`] or
//! [`OccupancyTracker::advance_all`] is called, so callers that want
//! reproducible values must drive it at a fixed cadence.  Every other query
//! reads the smoothed value as of the last advance.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use tm_core::{AgentId, GridPos, OccupancyConfig, Segment};

use crate::{RoadNetwork, SpatialError, SpatialResult};

#[derive(Debug, Default)]
struct Record {
    occupants: FxHashSet<AgentId>,
    capacity:  Option<u32>,
    ema:       f64,
}

impl Record {
    #[inline]
    fn instant(&self, default_capacity: u32) -> f64 {
        let cap = self.capacity.unwrap_or(default_capacity).max(1);
        (self.occupants.len() as f64 / f64::from(cap)).min(1.0)
    }
}

// ── OccupancyTracker ──────────────────────────────────────────────────────────

/// Who is on which segment, and how congested each segment has been lately.
///
/// Internally synchronized; share as `Arc<OccupancyTracker>`.
pub struct OccupancyTracker {
    default_capacity: u32,
    alpha:            f64,
    records:          Mutex<FxHashMap<Segment, Record>>,
}

impl OccupancyTracker {
    /// `default_capacity` is clamped to at least 1 and `alpha` to `(0, 1]`.
    pub fn new(default_capacity: u32, alpha: f64) -> Self {
        let alpha = if alpha > 0.0 { alpha.min(1.0) } else { 1.0 };
        Self {
            default_capacity: default_capacity.max(1),
            alpha,
            records: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn from_config(cfg: &OccupancyConfig) -> Self {
        Self::new(cfg.default_capacity, cfg.ema_alpha)
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Record `agent` on `segment`.  Returns `false` if it was already there.
    pub fn enter(&self, segment: Segment, agent: AgentId) -> bool {
        let inserted = self.lock().entry(segment).or_default().occupants.insert(agent);
        trace!(%segment, %agent, inserted, "occupancy enter");
        inserted
    }

    /// Remove `agent` from `segment`.  Returns `false` if it was not there.
    pub fn leave(&self, segment: Segment, agent: AgentId) -> bool {
        let removed = self
            .lock()
            .get_mut(&segment)
            .is_some_and(|r| r.occupants.remove(&agent));
        trace!(%segment, %agent, removed, "occupancy leave");
        removed
    }

    /// Override the capacity of one segment.
    pub fn set_capacity(&self, segment: Segment, capacity: u32) -> SpatialResult<()> {
        if capacity == 0 {
            return Err(SpatialError::InvalidCapacity { segment });
        }
        self.lock().entry(segment).or_default().capacity = Some(capacity);
        Ok(())
    }

    /// Advance the smoothed density of `segment` by one step and return it.
    ///
    /// The result is always in `[0, 1]`.
    pub fn density(&self, segment: Segment) -> f64 {
        let mut map = self.lock();
        match map.get_mut(&segment) {
            Some(rec) => self.advance(rec),
            None => 0.0,
        }
    }

    /// Advance every tracked segment by one smoothing step.
    pub fn advance_all(&self) {
        let mut map = self.lock();
        for rec in map.values_mut() {
            self.advance(rec);
        }
    }

    #[inline]
    fn advance(&self, rec: &mut Record) -> f64 {
        let instant = rec.instant(self.default_capacity);
        rec.ema = (self.alpha * instant + (1.0 - self.alpha) * rec.ema).clamp(0.0, 1.0);
        rec.ema
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Vehicles currently on `segment`.
    pub fn count(&self, segment: Segment) -> usize {
        self.lock().get(&segment).map_or(0, |r| r.occupants.len())
    }

    pub fn capacity(&self, segment: Segment) -> u32 {
        self.lock()
            .get(&segment)
            .and_then(|r| r.capacity)
            .unwrap_or(self.default_capacity)
    }

    /// `occupants / capacity`, capped at 1, without smoothing.
    pub fn instant(&self, segment: Segment) -> f64 {
        self.lock()
            .get(&segment)
            .map_or(0.0, |r| r.instant(self.default_capacity))
    }

    /// The smoothed density as of the last advance.
    pub fn smoothed(&self, segment: Segment) -> f64 {
        self.lock().get(&segment).map_or(0.0, |r| r.ema)
    }

    /// `true` once the segment holds as many vehicles as its capacity.
    pub fn is_full(&self, segment: Segment) -> bool {
        self.instant(segment) >= 1.0
    }

    /// Mean smoothed density over tracked segments with at least one
    /// endpoint within Euclidean `radius` of `point`; 0 if there are none.
    pub fn local_density(&self, network: &RoadNetwork, point: GridPos, radius: f64) -> f64 {
        let near: FxHashSet<GridPos> = network.nodes_within(point, radius).into_iter().collect();
        if near.is_empty() {
            return 0.0;
        }
        let map = self.lock();
        let (sum, n) = map
            .iter()
            .filter(|(seg, _)| near.contains(&seg.a()) || near.contains(&seg.b()))
            .fold((0.0, 0usize), |(sum, n), (_, r)| (sum + r.ema, n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    }

    /// Smoothed density of every tracked segment, in canonical order.
    pub fn densities(&self) -> Vec<(Segment, f64)> {
        let mut out: Vec<(Segment, f64)> =
            self.lock().iter().map(|(seg, r)| (*seg, r.ema)).collect();
        out.sort_unstable_by_key(|(seg, _)| *seg);
        out
    }

    /// A consistent point-in-time view for the router.
    pub fn snapshot(&self) -> OccupancySnapshot {
        let map = self.lock();
        OccupancySnapshot {
            entries: map
                .iter()
                .map(|(seg, r)| (*seg, (r.ema, r.instant(self.default_capacity) >= 1.0)))
                .collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<Segment, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OccupancyTracker {
    fn default() -> Self {
        Self::from_config(&OccupancyConfig::default())
    }
}

// ── OccupancySnapshot ─────────────────────────────────────────────────────────

/// Frozen smoothed density and fullness of every tracked segment.
#[derive(Clone, Debug, Default)]
pub struct OccupancySnapshot {
    entries: FxHashMap<Segment, (f64, bool)>,
}

impl OccupancySnapshot {
    #[inline]
    pub fn density(&self, segment: Segment) -> f64 {
        self.entries.get(&segment).map_or(0.0, |e| e.0)
    }

    #[inline]
    pub fn is_full(&self, segment: Segment) -> bool {
        self.entries.get(&segment).is_some_and(|e| e.1)
    }
}
