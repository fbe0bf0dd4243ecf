//! Routing trait and the default weighted-A* implementation.
//!
//! # Edge cost
//!
//! ```text
//! cost(u, v) = base(u, v) + congestion_coefficient · density(u, v) + penalty(u, v)
//! ```
//!
//! An edge is pruned outright when its segment is incident-blocked, or
//! (unless the mode ignores capacity) when the segment is full.  Hazards are
//! never ignored.
//!
//! # Cost units
//!
//! Search keys are integer **milli-cost** units (`u64`) so the heap orders
//! exactly; `Route::cost` reports the float total.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use tm_core::{AgentProfile, GridPos, Segment};
use tm_events::EventStore;

use crate::{OccupancyTracker, RoadNetwork, SpatialError, SpatialResult};

const MILLI: f64 = 1_000.0;

// ── Route ─────────────────────────────────────────────────────────────────────

/// The result of a routing query: the nodes to visit, start and goal included.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    pub nodes: Vec<GridPos>,
    /// Composite cost of the whole path at planning time.
    pub cost: f64,
}

impl Route {
    /// `true` if start and goal coincide.
    pub fn is_trivial(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Number of segment moves.
    pub fn steps(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// The segments traversed, in order.
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.nodes.windows(2).map(|w| Segment::new(w[0], w[1]))
    }
}

// ── RouteMode ─────────────────────────────────────────────────────────────────

/// Search parameters distinguishing exact from near-optimal routing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteMode {
    /// `f = g + heuristic_weight · h`.  1.0 is exact A*.
    pub heuristic_weight: f64,
    pub congestion_coefficient: f64,
    /// Do not prune full segments.
    pub ignore_capacity: bool,
}

impl RouteMode {
    /// Near-optimal, congestion-sensitive search for private vehicles.
    pub fn ordinary() -> Self {
        Self::from_profile(&AgentProfile::ordinary())
    }

    /// Exact search that only avoids hazards, for emergency vehicles.
    pub fn emergency() -> Self {
        Self::from_profile(&AgentProfile::emergency())
    }

    pub fn from_profile(profile: &AgentProfile) -> Self {
        Self {
            heuristic_weight:       profile.heuristic_weight.max(1.0),
            congestion_coefficient: profile.congestion_coefficient.max(0.0),
            ignore_capacity:        profile.ignore_capacity,
        }
    }
}

// ── RoutingView ───────────────────────────────────────────────────────────────

/// The three inputs a route is computed against.
#[derive(Clone, Copy)]
pub struct RoutingView<'a> {
    pub network:   &'a RoadNetwork,
    pub occupancy: &'a OccupancyTracker,
    /// The caller's own view of incidents (shared or gossip replica).
    pub events:    &'a EventStore,
}

impl<'a> RoutingView<'a> {
    pub fn new(
        network: &'a RoadNetwork,
        occupancy: &'a OccupancyTracker,
        events: &'a EventStore,
    ) -> Self {
        Self { network, occupancy, events }
    }
}

// ── Router trait ──────────────────────────────────────────────────────────────

/// Pluggable routing engine.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`: one router is shared by every
/// vehicle task.
pub trait Router: Send + Sync {
    /// Compute a path from `start` to `goal`.
    ///
    /// `start == goal` yields the single-node route.  An unreachable goal
    /// yields [`SpatialError::NoPath`]; a node outside the grid yields
    /// [`SpatialError::InvalidNode`].
    fn find_path(
        &self,
        view: &RoutingView<'_>,
        start: GridPos,
        goal: GridPos,
        mode: &RouteMode,
    ) -> SpatialResult<Route>;
}

// ── AStarRouter ───────────────────────────────────────────────────────────────

/// Weighted A* with a Manhattan heuristic.
///
/// Occupancy and incidents are snapshotted once per query, so a search sees
/// a single consistent state even while other tasks keep mutating it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AStarRouter;

impl Router for AStarRouter {
    fn find_path(
        &self,
        view: &RoutingView<'_>,
        start: GridPos,
        goal: GridPos,
        mode: &RouteMode,
    ) -> SpatialResult<Route> {
        astar(view, start, goal, mode)
    }
}

// ── A* internals ──────────────────────────────────────────────────────────────

#[inline]
fn to_milli(cost: f64) -> u64 {
    (cost * MILLI).round() as u64
}

fn astar(
    view: &RoutingView<'_>,
    start: GridPos,
    goal: GridPos,
    mode: &RouteMode,
) -> SpatialResult<Route> {
    let network = view.network;
    let start_i = network.index_of(start).ok_or(SpatialError::InvalidNode(start))?;
    let goal_i = network.index_of(goal).ok_or(SpatialError::InvalidNode(goal))?;
    if start_i == goal_i {
        return Ok(Route { nodes: vec![start], cost: 0.0 });
    }

    let occupancy = view.occupancy.snapshot();
    let incidents = view.events.snapshot();
    let heuristic = |n: GridPos| to_milli(f64::from(n.manhattan(goal)) * mode.heuristic_weight);

    let n = network.node_count();
    // g[v] = best known milli-cost to reach v.
    let mut g    = vec![u64::MAX; n];
    // prev[v] = index of the node that reached v; usize::MAX when unreached.
    let mut prev = vec![usize::MAX; n];
    let mut closed = vec![false; n];

    g[start_i] = 0;

    // Min-heap on (f, discovery sequence, node); the sequence breaks ties in
    // discovery order.
    let mut heap: BinaryHeap<Reverse<(u64, u64, usize)>> = BinaryHeap::new();
    let mut seq = 0u64;
    heap.push(Reverse((heuristic(start), seq, start_i)));

    while let Some(Reverse((_, _, u_i))) = heap.pop() {
        if u_i == goal_i {
            let route = reconstruct(network, &prev, goal_i, g[goal_i]);
            trace!(%start, %goal, steps = route.steps(), cost = route.cost, "path found");
            return Ok(route);
        }
        if closed[u_i] {
            continue;
        }
        closed[u_i] = true;

        let u = network.node_at(u_i);
        for (v, base) in network.links(u)? {
            let seg = Segment::new(u, v);
            if incidents.is_blocked(seg) {
                continue;
            }
            if !mode.ignore_capacity && occupancy.is_full(seg) {
                continue;
            }
            let Some(v_i) = network.index_of(v) else { continue };
            if closed[v_i] {
                continue;
            }

            let edge = base
                + mode.congestion_coefficient * occupancy.density(seg)
                + incidents.penalty(seg);
            let tentative = g[u_i].saturating_add(to_milli(edge));
            if tentative < g[v_i] {
                g[v_i] = tentative;
                prev[v_i] = u_i;
                seq += 1;
                heap.push(Reverse((tentative.saturating_add(heuristic(v)), seq, v_i)));
            }
        }
    }

    trace!(%start, %goal, "no path");
    Err(SpatialError::NoPath { from: start, to: goal })
}

fn reconstruct(network: &RoadNetwork, prev: &[usize], goal_i: usize, total_milli: u64) -> Route {
    let mut nodes = vec![network.node_at(goal_i)];
    let mut cur = goal_i;
    while prev[cur] != usize::MAX {
        cur = prev[cur];
        nodes.push(network.node_at(cur));
    }
    nodes.reverse();
    Route { nodes, cost: total_milli as f64 / MILLI }
}
