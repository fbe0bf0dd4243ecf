//! Metrics notification hooks.

use tm_core::AgentId;

/// Callbacks invoked by the vehicle control loops.
///
/// Pure notifications: nothing the core does depends on them.  All methods
/// default to no-ops so implementors only override what they record.  Hooks
/// are called concurrently from many tasks, hence `&self` and `Send + Sync`.
pub trait TrafficObserver: Send + Sync {
    /// An ordinary vehicle picked a new goal.
    fn on_trip_start(&self, _agent: AgentId) {}

    /// An ordinary vehicle reached its goal.
    fn on_trip_end(&self, _agent: AgentId) {}

    /// An emergency vehicle left its base on a new response.
    fn on_emergency_start(&self) {}

    /// An emergency vehicle returned to base.
    fn on_emergency_end(&self) {}

    /// A vehicle invoked the router.
    fn on_replan(&self, _agent: AgentId) {}
}

/// A [`TrafficObserver`] that records nothing.
pub struct NoopObserver;

impl TrafficObserver for NoopObserver {}
