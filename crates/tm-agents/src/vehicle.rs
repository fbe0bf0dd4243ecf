//! Per-vehicle control loop.
//!
//! # One tick
//!
//! 1. **Gossip** — merge queued incident facts into the vehicle's own
//!    incident replica, forwarding novel ones with one hop less.
//! 2. **Arrival** — at the goal: notify the observer, dwell, clear the plan,
//!    and (emergency vehicles) toggle between heading to base and heading out.
//! 3. **Replan** — with no usable plan, after `replan_every` steps, or when a
//!    fresh incident lands within `incident_replan_radius`.
//! 4. **Step** — ask the controller guarding the next node (if any) for a
//!    grant, then claim the node on the position board.
//! 5. **Commit** — leave the previous segment and enter the new one.
//!
//! `NoPath`, negotiation exhaustion and board conflicts degrade to a
//! random-walk step or a wait; no error ends the loop.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use tm_core::{AgentId, AgentProfile, AgentRng, GridPos, Segment, VehicleKind};
use tm_events::{EventStore, GossipEnvelope};
use tm_protocol::{Endpoint, Message, MoveRequest, PeerAddress, RecvError, Reply, ReplyReason, RequestId};
use tm_spatial::{RouteMode, RoutingView, SpatialError};

use crate::{City, ControlResult};

// ── AgentState ────────────────────────────────────────────────────────────────

/// Where an emergency vehicle is heading.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmergencyPhase {
    ToHospital,
    ToRandom,
}

/// Mutable state of one vehicle, owned by its control loop.
#[derive(Clone, Debug)]
pub struct AgentState {
    pub position: GridPos,
    pub goal:     Option<GridPos>,
    /// Planned nodes; when non-empty the head equals `position`.
    pub path:     VecDeque<GridPos>,
    /// `None` for ordinary vehicles.
    pub phase:    Option<EmergencyPhase>,
    pub steps_since_replan: u32,
    /// The segment last traversed, as recorded in the occupancy tracker.
    pub segment:  Option<Segment>,
    /// A freshly merged incident lies near `position`.
    pub incident_nearby: bool,
}

impl AgentState {
    fn new(position: GridPos, phase: Option<EmergencyPhase>) -> Self {
        Self {
            position,
            goal: None,
            path: VecDeque::new(),
            phase,
            steps_since_replan: 0,
            segment: None,
            incident_nearby: false,
        }
    }

    /// The node after `position` on the plan, if the plan is usable.
    pub fn next_step(&self) -> Option<GridPos> {
        match (self.path.front(), self.path.get(1)) {
            (Some(head), Some(next)) if *head == self.position => Some(*next),
            _ => None,
        }
    }

    /// `true` when the vehicle stands on its goal.
    pub fn at_goal(&self) -> bool {
        self.goal == Some(self.position)
    }

    /// Forget the path but keep the goal, forcing a replan next tick.
    pub fn drop_path(&mut self) {
        self.path.clear();
        self.steps_since_replan = 0;
    }

    /// Forget path and goal.
    pub fn clear_plan(&mut self) {
        self.drop_path();
        self.goal = None;
    }
}

// ── VehicleAgent ──────────────────────────────────────────────────────────────

/// One vehicle's control loop, ordinary or emergency.
///
/// Role differences come only from the [`AgentProfile`] and the kind: cost
/// coefficients, capacity ignoring, request type and collision exception.
pub struct VehicleAgent {
    id:         AgentId,
    kind:       VehicleKind,
    profile:    AgentProfile,
    mode:       RouteMode,
    city:       Arc<City>,
    endpoint:   Endpoint,
    rng:        AgentRng,
    incidents:  EventStore,
    fixed_base: Option<GridPos>,
    next_request: RequestId,
    state:      AgentState,
}

impl VehicleAgent {
    /// Create the vehicle at `start`, declare it on the position board and
    /// register its mailbox.
    ///
    /// `AgentId`s must be unique across both kinds.
    pub fn new(city: Arc<City>, id: AgentId, kind: VehicleKind, start: GridPos) -> Self {
        let profile = match kind {
            VehicleKind::Ordinary  => city.config.ordinary.clone(),
            VehicleKind::Emergency => city.config.emergency.clone(),
        };
        let phase = kind.is_emergency().then(|| {
            if city.is_hospital(start) { EmergencyPhase::ToRandom } else { EmergencyPhase::ToHospital }
        });
        let endpoint = Endpoint::connect(city.switchboard.clone(), PeerAddress::vehicle(kind, id));
        city.board.place(id, kind, start);

        Self {
            id,
            kind,
            mode: RouteMode::from_profile(&profile),
            profile,
            rng: AgentRng::new(city.config.seed, kind, id),
            incidents: EventStore::new(city.clock, city.config.incidents.block_threshold),
            fixed_base: None,
            next_request: 0,
            state: AgentState::new(start, phase),
            endpoint,
            city,
        }
    }

    /// Tie an emergency vehicle to one hospital instead of the nearest.
    pub fn with_fixed_base(mut self, base: GridPos) -> Self {
        if self.kind.is_emergency() {
            self.fixed_base = Some(base);
            self.state.phase = Some(if self.state.position == base {
                EmergencyPhase::ToRandom
            } else {
                EmergencyPhase::ToHospital
            });
        }
        self
    }

    #[inline]
    pub fn id(&self) -> AgentId {
        self.id
    }

    #[inline]
    pub fn addr(&self) -> PeerAddress {
        self.endpoint.addr()
    }

    #[inline]
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// The vehicle's own incident replica.
    #[inline]
    pub fn incidents(&self) -> &EventStore {
        &self.incidents
    }

    /// Run ticks until the task is aborted.
    pub async fn run(mut self) {
        info!(agent = %self.addr(), at = %self.state.position, "vehicle started");
        let period = self.profile.tick();
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if let Err(e) = self.tick().await {
                warn!(agent = %self.addr(), error = %e, "tick failed; dropping plan");
                self.state.clear_plan();
            }
        }
    }

    /// One pass of the control loop.
    pub async fn tick(&mut self) -> ControlResult<()> {
        self.drain_inbox();

        if self.state.at_goal() {
            self.arrive().await;
            return Ok(());
        }

        if self.needs_plan() {
            match self.state.goal {
                Some(_) => self.plan()?,
                None => {
                    let goal = self.choose_goal();
                    self.head_for(goal)?;
                }
            }
        }

        match self.state.next_step() {
            Some(next) => self.advance(next).await,
            None => {
                self.random_step();
                Ok(())
            }
        }
    }

    // ── Arrival ───────────────────────────────────────────────────────────

    async fn arrive(&mut self) {
        info!(agent = %self.addr(), at = %self.state.position, "reached goal");
        let at_base = self.at_base();
        match self.state.phase {
            None => self.city.observer.on_trip_end(self.id),
            Some(EmergencyPhase::ToHospital) if at_base => self.city.observer.on_emergency_end(),
            Some(_) => {}
        }

        sleep(self.profile.dwell()).await;

        if self.state.phase.is_some() {
            self.state.phase = Some(if at_base {
                EmergencyPhase::ToRandom
            } else {
                EmergencyPhase::ToHospital
            });
        }
        self.state.clear_plan();
    }

    fn at_base(&self) -> bool {
        match self.fixed_base {
            Some(base) => self.state.position == base,
            None => self.city.is_hospital(self.state.position),
        }
    }

    fn notify_departure(&self) {
        match self.state.phase {
            None => self.city.observer.on_trip_start(self.id),
            Some(EmergencyPhase::ToRandom) if self.at_base() => {
                self.city.observer.on_emergency_start();
            }
            Some(_) => {}
        }
    }

    // ── Planning ──────────────────────────────────────────────────────────

    /// `true` when the next tick must route before moving.
    pub fn needs_plan(&self) -> bool {
        self.state.goal.is_none()
            || self.state.next_step().is_none()
            || self.state.steps_since_replan >= self.profile.replan_every
            || self.state.incident_nearby
    }

    /// Pick the next goal.
    pub fn choose_goal(&mut self) -> GridPos {
        if self.state.phase == Some(EmergencyPhase::ToHospital) {
            let base = self.fixed_base.or_else(|| self.city.nearest_hospital(self.state.position));
            if let Some(base) = base {
                return base;
            }
        }
        self.far_goal()
    }

    /// A random node at least `min_goal_distance` away, or any other node if
    /// the grid is too small.
    fn far_goal(&mut self) -> GridPos {
        let here = self.state.position;
        let min = self.profile.min_goal_distance;
        let far: Vec<GridPos> = self
            .city
            .network
            .nodes()
            .filter(|n| n.manhattan(here) >= min)
            .collect();
        if let Some(goal) = self.rng.choose(&far) {
            return *goal;
        }
        let other: Vec<GridPos> = self.city.network.nodes().filter(|n| *n != here).collect();
        self.rng.choose(&other).copied().unwrap_or(here)
    }

    /// Start a trip to `goal` and route to it.
    pub fn head_for(&mut self, goal: GridPos) -> ControlResult<()> {
        self.state.goal = Some(goal);
        self.notify_departure();
        self.plan()
    }

    /// Route from the current position to the goal.  `NoPath` clears the
    /// plan so this tick falls back to a random step.
    fn plan(&mut self) -> ControlResult<()> {
        self.state.incident_nearby = false;
        let Some(goal) = self.state.goal else { return Ok(()) };
        self.city.observer.on_replan(self.id);

        let view = RoutingView::new(&self.city.network, &self.city.occupancy, &self.incidents);
        match self.city.router.find_path(&view, self.state.position, goal, &self.mode) {
            Ok(route) => {
                debug!(agent = %self.addr(), %goal, steps = route.steps(), cost = route.cost, "planned");
                self.state.path = route.nodes.into();
                self.state.steps_since_replan = 0;
                Ok(())
            }
            Err(SpatialError::NoPath { .. }) => {
                debug!(agent = %self.addr(), %goal, "no path; random walk");
                self.state.clear_plan();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Movement ──────────────────────────────────────────────────────────

    async fn advance(&mut self, next: GridPos) -> ControlResult<()> {
        if !self.negotiate(self.state.position, next).await? {
            self.state.drop_path();
            self.random_step();
            return Ok(());
        }
        if self.commit_move(next) {
            self.state.path.pop_front();
            self.state.steps_since_replan += 1;
        }
        Ok(())
    }

    /// Claim `to` on the board and update occupancy.  On conflict the path
    /// is dropped and `false` returned.
    pub fn commit_move(&mut self, to: GridPos) -> bool {
        let from = self.state.position;
        if let Err(conflict) = self.city.board.try_move(self.id, self.kind, to, self.city.hospitals()) {
            info!(agent = %self.addr(), %from, target = %to, occupant = %conflict.occupant, "target occupied; dropping plan");
            self.state.drop_path();
            return false;
        }

        let seg = Segment::new(from, to);
        if let Some(prev) = self.state.segment.replace(seg) {
            self.city.occupancy.leave(prev, self.id);
        }
        self.city.occupancy.enter(seg, self.id);
        self.state.position = to;
        trace!(agent = %self.addr(), %from, %to, "moved");
        true
    }

    /// Move to a random neighbour that needs no negotiation and is not
    /// known to be blocked.  Stays put if there is none or it is taken.
    fn random_step(&mut self) {
        let here = self.state.position;
        let Ok(neighbors) = self.city.network.neighbors(here) else { return };
        let open: Vec<GridPos> = neighbors
            .iter()
            .copied()
            .filter(|n| !self.city.has_light(*n))
            .filter(|n| !self.incidents.is_blocked(Segment::new(here, *n)))
            .collect();
        if let Some(&to) = self.rng.choose(&open) {
            self.commit_move(to);
        }
    }

    // ── Negotiation ───────────────────────────────────────────────────────

    /// Obtain a grant for `from → to` from the controller at `to`.
    ///
    /// A request that times out is resent once after `retry_backoff`; a
    /// second timeout counts as a denial.  Phase denials wait `denial_wait`
    /// and ask again, up to `max_denials`.  Hazard and direction denials
    /// give up at once.  Returns `false` when the plan should be abandoned.
    pub async fn negotiate(&mut self, from: GridPos, to: GridPos) -> ControlResult<bool> {
        if !self.city.has_light(to) {
            return Ok(true);
        }
        let light = PeerAddress::Light(to);
        let mut denials = 0;

        loop {
            let request = MoveRequest { request_id: self.next_request_id(), from, to };
            let reply = match self.exchange(light, request).await? {
                Some(reply) => reply,
                None => {
                    warn!(agent = %self.addr(), %light, "no reply; retrying once");
                    sleep(self.profile.retry_backoff()).await;
                    self.exchange(light, request).await?.unwrap_or_else(|| {
                        warn!(agent = %self.addr(), %light, "no reply after retry; treating as denial");
                        Reply::deny(request.request_id, ReplyReason::PhaseCheck)
                    })
                }
            };

            if reply.granted {
                trace!(agent = %self.addr(), %light, reason = %reply.reason, "granted");
                return Ok(true);
            }
            if matches!(reply.reason, ReplyReason::BlockedByIncident | ReplyReason::UnknownDirection) {
                info!(agent = %self.addr(), %light, reason = %reply.reason, "denied; abandoning plan");
                return Ok(false);
            }

            denials += 1;
            if denials >= self.profile.max_denials {
                info!(agent = %self.addr(), %light, denials, "negotiation exhausted; abandoning plan");
                return Ok(false);
            }
            debug!(agent = %self.addr(), %light, denials, reason = %reply.reason, "denied; waiting");
            sleep(self.profile.denial_wait()).await;
        }
    }

    /// Send one request and wait for the matching reply.  `None` on timeout.
    async fn exchange(&mut self, light: PeerAddress, request: MoveRequest) -> ControlResult<Option<Reply>> {
        let message = match self.kind {
            VehicleKind::Ordinary  => Message::PassageRequest(request),
            VehicleKind::Emergency => Message::PriorityRequest(request),
        };
        self.endpoint.send(light, message)?;

        let deadline = Instant::now() + self.profile.reply_timeout();
        loop {
            match self.endpoint.recv_until(deadline).await {
                Ok(env) => match env.message {
                    Message::PassageReply(reply) if reply.request_id == request.request_id => {
                        return Ok(Some(reply));
                    }
                    Message::PassageReply(stale) => {
                        trace!(agent = %self.addr(), request_id = stale.request_id, "stale reply discarded");
                    }
                    Message::IncidentGossip(gossip) => self.on_gossip(env.from, gossip),
                    other => trace!(agent = %self.addr(), kind = other.kind(), "ignored"),
                },
                Err(RecvError::Malformed { .. }) => {}
                Err(RecvError::Timeout | RecvError::Closed | RecvError::Empty) => return Ok(None),
            }
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        self.next_request
    }

    // ── Gossip ────────────────────────────────────────────────────────────

    fn drain_inbox(&mut self) {
        loop {
            match self.endpoint.try_recv() {
                Ok(env) => match env.message {
                    Message::IncidentGossip(gossip) => self.on_gossip(env.from, gossip),
                    other => trace!(agent = %self.addr(), kind = other.kind(), "ignored"),
                },
                Err(RecvError::Malformed { .. }) => {}
                Err(_) => break,
            }
        }
    }

    /// Merge a gossiped fact; if it changed the local view, flag a nearby
    /// incident and pass it on to a few random peers.
    pub fn on_gossip(&mut self, sender: PeerAddress, gossip: GossipEnvelope) {
        let fact = gossip.fact;
        let outcome = match self.incidents.merge_external(fact) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent = %self.addr(), %sender, error = %e, "rejected incident fact");
                return;
            }
        };
        if !outcome.changed() {
            return;
        }
        let distance = fact.segment.manhattan_to(self.state.position);
        debug!(agent = %self.addr(), %sender, segment = %fact.segment, severity = fact.severity, distance, ?outcome, "incident merged");
        if distance <= self.profile.incident_replan_radius {
            self.state.incident_nearby = true;
        }

        let Some(forward) = gossip.forwarded() else { return };
        let me = self.addr();
        let peers: Vec<PeerAddress> = self
            .endpoint
            .board()
            .vehicles()
            .into_iter()
            .filter(|p| *p != me && *p != sender)
            .collect();
        let targets = self.rng.choose_multiple(&peers, self.profile.gossip_fanout);
        let sent = self
            .endpoint
            .board()
            .broadcast(me, targets, &Message::IncidentGossip(forward));
        trace!(agent = %me, segment = %fact.segment, hop_ttl = forward.hop_ttl, sent, "gossip forwarded");
    }
}
