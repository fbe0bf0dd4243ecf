//! The per-segment incident store.
//!
//! # Concurrency
//!
//! `EventStore` is internally synchronized: one mutex guards the incident
//! map and every public method takes `&self`, so a store can be shared as
//! `Arc<EventStore>` between the incident generator and intersection
//! controllers, or owned privately by one vehicle as its gossip replica.
//!
//! A poisoned lock is recovered rather than propagated.  Every mutation is
//! a single map insert/remove, so a panicking holder cannot leave a record
//! half-written.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use tm_core::{GridPos, Segment, SimClock, Timestamp};

use crate::{EventError, EventResult, Incident, IncidentFact};

/// Severity at or above which a segment counts as blocked by default.
pub const DEFAULT_BLOCK_THRESHOLD: f64 = 3.0;

/// Severity of the roadblocks spawned by [`EventStore::spawn_temporary_block`].
const ROADBLOCK_SEVERITY: f64 = 10.0;

// ── MergeOutcome ──────────────────────────────────────────────────────────────

/// What [`EventStore::merge_external`] did with a remote fact.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No active incident existed; the fact was recorded.
    Inserted,
    /// An active incident existed and was raised in severity or expiry.
    Refreshed,
    /// The local record already dominated the fact.
    Unchanged,
    /// The fact had already expired on arrival and was dropped.
    Expired,
}

impl MergeOutcome {
    /// `true` if the local view changed; only such facts are worth forwarding.
    #[inline]
    pub fn changed(self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Refreshed)
    }
}

// ── EventStore ────────────────────────────────────────────────────────────────

/// Active incidents keyed by normalized segment.
pub struct EventStore {
    clock:     SimClock,
    threshold: f64,
    incidents: Mutex<FxHashMap<Segment, Incident>>,
}

impl EventStore {
    /// Create an empty store reading time from `clock` and treating
    /// `severity >= threshold` as blocked.
    pub fn new(clock: SimClock, threshold: f64) -> Self {
        Self {
            clock,
            threshold,
            incidents: Mutex::new(FxHashMap::default()),
        }
    }

    /// Create an empty store with the default threshold of 3.0.
    pub fn with_default_threshold(clock: SimClock) -> Self {
        Self::new(clock, DEFAULT_BLOCK_THRESHOLD)
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[inline]
    pub fn clock(&self) -> SimClock {
        self.clock
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Create an incident on `segment`, or refresh the active one.
    ///
    /// Refreshing keeps `max(old, new)` severity and resets expiry to
    /// `now + ttl`.
    pub fn spawn(&self, segment: Segment, severity: f64, ttl: Duration) -> EventResult<Incident> {
        check_severity(segment, severity)?;
        let now = self.clock.now();
        let expires_at = now + ttl;

        let mut map = self.sweep_locked(now);
        let incident = match map.get_mut(&segment) {
            Some(existing) => {
                existing.severity = existing.severity.max(severity);
                existing.expires_at = expires_at;
                *existing
            }
            None => {
                let fresh = Incident { segment, severity, created_at: now, expires_at };
                map.insert(segment, fresh);
                fresh
            }
        };
        debug!(%segment, severity = incident.severity, expires_at = %incident.expires_at, "incident spawned");
        Ok(incident)
    }

    /// Spawn a severity-10 incident: a short full closure.
    pub fn spawn_temporary_block(&self, segment: Segment, ttl: Duration) -> EventResult<Incident> {
        self.spawn(segment, ROADBLOCK_SEVERITY, ttl)
    }

    /// Merge a remotely observed fact.
    ///
    /// Same refresh rule as [`spawn`](Self::spawn), except that expiry comes
    /// from the fact itself and only ever moves forward, so applying a fact
    /// twice or in a different order leaves the same state.
    pub fn merge_external(&self, fact: IncidentFact) -> EventResult<MergeOutcome> {
        check_severity(fact.segment, fact.severity)?;
        let now = self.clock.now();
        if fact.expires_at <= now {
            return Ok(MergeOutcome::Expired);
        }

        let mut map = self.sweep_locked(now);
        let outcome = match map.get_mut(&fact.segment) {
            Some(existing) => {
                let severity = existing.severity.max(fact.severity);
                let expires_at = existing.expires_at.max(fact.expires_at);
                if severity == existing.severity && expires_at == existing.expires_at {
                    MergeOutcome::Unchanged
                } else {
                    existing.severity = severity;
                    existing.expires_at = expires_at;
                    MergeOutcome::Refreshed
                }
            }
            None => {
                map.insert(fact.segment, Incident {
                    segment:    fact.segment,
                    severity:   fact.severity,
                    created_at: now,
                    expires_at: fact.expires_at,
                });
                MergeOutcome::Inserted
            }
        };
        Ok(outcome)
    }

    /// Remove every incident with `now >= expires_at`.  Returns how many
    /// were removed.
    ///
    /// Queries call this internally; calling it directly is only needed to
    /// release memory on an otherwise idle store.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, inc| inc.is_active(now));
        before - map.len()
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// `true` if an active incident on `segment` reaches the store threshold.
    pub fn is_blocked(&self, segment: Segment) -> bool {
        self.is_blocked_at(segment, self.threshold)
    }

    /// `true` if an active incident on `segment` reaches `threshold`.
    pub fn is_blocked_at(&self, segment: Segment, threshold: f64) -> bool {
        let map = self.sweep_locked(self.clock.now());
        map.get(&segment).is_some_and(|inc| inc.severity >= threshold)
    }

    /// Extra routing cost of `segment`: its severity, or 0 if clear.
    pub fn penalty(&self, segment: Segment) -> f64 {
        let map = self.sweep_locked(self.clock.now());
        map.get(&segment).map_or(0.0, |inc| inc.severity)
    }

    /// The active incident on `segment`, if any.
    pub fn get(&self, segment: Segment) -> Option<Incident> {
        let map = self.sweep_locked(self.clock.now());
        map.get(&segment).copied()
    }

    /// All segments blocked at `threshold`, in canonical order.
    pub fn blocked_segments(&self, threshold: f64) -> Vec<Segment> {
        let map = self.sweep_locked(self.clock.now());
        let mut blocked: Vec<Segment> = map
            .values()
            .filter(|inc| inc.severity >= threshold)
            .map(|inc| inc.segment)
            .collect();
        blocked.sort_unstable();
        blocked
    }

    /// Endpoints of every segment blocked at the store threshold.
    pub fn blocked_nodes(&self) -> Vec<GridPos> {
        let mut nodes: Vec<GridPos> = self
            .blocked_segments(self.threshold)
            .into_iter()
            .flat_map(Segment::endpoints)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Copies of all active incidents, in canonical segment order.
    pub fn active_incidents(&self) -> Vec<Incident> {
        let map = self.sweep_locked(self.clock.now());
        let mut all: Vec<Incident> = map.values().copied().collect();
        all.sort_unstable_by_key(|inc| inc.segment);
        all
    }

    /// A consistent point-in-time view for callers that query many segments
    /// (the router) and must not see the store change mid-search.
    pub fn snapshot(&self) -> IncidentSnapshot {
        let map = self.sweep_locked(self.clock.now());
        IncidentSnapshot {
            threshold:  self.threshold,
            severities: map.iter().map(|(seg, inc)| (*seg, inc.severity)).collect(),
        }
    }

    /// Number of active incidents.
    pub fn len(&self) -> usize {
        self.sweep_locked(self.clock.now()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, FxHashMap<Segment, Incident>> {
        self.incidents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock, drop expired entries, and hand back the guard.
    fn sweep_locked(&self, now: Timestamp) -> MutexGuard<'_, FxHashMap<Segment, Incident>> {
        let mut map = self.lock();
        map.retain(|_, inc| inc.is_active(now));
        map
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("threshold", &self.threshold)
            .field("active", &self.len())
            .finish()
    }
}

fn check_severity(segment: Segment, severity: f64) -> EventResult<()> {
    if severity.is_finite() && severity >= 0.0 {
        Ok(())
    } else {
        Err(EventError::InvalidSeverity { segment, severity })
    }
}

// ── IncidentSnapshot ──────────────────────────────────────────────────────────

/// Frozen severities of all incidents that were active when taken.
#[derive(Clone, Debug, Default)]
pub struct IncidentSnapshot {
    threshold:  f64,
    severities: FxHashMap<Segment, f64>,
}

impl IncidentSnapshot {
    #[inline]
    pub fn is_blocked(&self, segment: Segment) -> bool {
        self.severities.get(&segment).is_some_and(|s| *s >= self.threshold)
    }

    #[inline]
    pub fn penalty(&self, segment: Segment) -> f64 {
        self.severities.get(&segment).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.severities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.severities.is_empty()
    }
}
