//! Intersection controllers.
//!
//! # Phases
//!
//! | phase | permitted directions |
//! |-------|----------------------|
//! | 0     | N, S                 |
//! | 1     | E, W                 |
//!
//! Every control tick the green time is recomputed from local density,
//! `min + (max − min) · ρ` (3 s to 8 s by default), and the phase flips once
//! it has been green that long.
//!
//! # Decisions
//!
//! | request             | condition                     | reply                          |
//! |---------------------|-------------------------------|--------------------------------|
//! | any                 | not a single axis step        | deny `unknown_direction`       |
//! | any                 | segment incident-blocked      | deny `blocked_by_incident`     |
//! | `priority_request`  | otherwise                     | grant `emergency`              |
//! | `passage_request`   | otherwise                     | grant iff phase permits, `phase_check` |
//!
//! [`IntersectionController`] is a plain state machine driven by explicit
//! timestamps; [`IntersectionAgent`] wraps it in a task with a mailbox.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use tm_core::{Direction, GridPos, IntersectionConfig, Segment, Timestamp};
use tm_events::EventStore;
use tm_protocol::{Endpoint, Message, MoveRequest, PeerAddress, RecvError, Reply, ReplyReason};

use crate::City;

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Phase 0.
    NorthSouth,
    /// Phase 1.
    EastWest,
}

impl Phase {
    #[inline]
    pub fn allows(self, dir: Direction) -> bool {
        match self {
            Phase::NorthSouth => dir.is_north_south(),
            Phase::EastWest   => !dir.is_north_south(),
        }
    }

    #[inline]
    pub fn flipped(self) -> Phase {
        match self {
            Phase::NorthSouth => Phase::EastWest,
            Phase::EastWest   => Phase::NorthSouth,
        }
    }

    #[inline]
    pub fn index(self) -> u8 {
        match self {
            Phase::NorthSouth => 0,
            Phase::EastWest   => 1,
        }
    }
}

// ── IntersectionController ────────────────────────────────────────────────────

/// Phase state and request policy of one intersection.
#[derive(Debug, Clone)]
pub struct IntersectionController {
    position:       GridPos,
    phase:          Phase,
    phase_duration: Duration,
    last_switch:    Timestamp,
    min_phase:      Duration,
    max_phase:      Duration,
}

impl IntersectionController {
    /// A controller starting in phase 0 at `now`.
    pub fn new(position: GridPos, cfg: &IntersectionConfig, now: Timestamp) -> Self {
        let min_phase = Duration::from_millis(cfg.min_phase_ms);
        let max_phase = Duration::from_millis(cfg.max_phase_ms.max(cfg.min_phase_ms));
        Self {
            position,
            phase: Phase::NorthSouth,
            phase_duration: min_phase,
            last_switch: now,
            min_phase,
            max_phase,
        }
    }

    #[inline]
    pub fn position(&self) -> GridPos {
        self.position
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn phase_duration(&self) -> Duration {
        self.phase_duration
    }

    /// Green time for a local density of `density`.
    pub fn duration_for(&self, density: f64) -> Duration {
        let rho = if density.is_finite() { density.clamp(0.0, 1.0) } else { 0.0 };
        let span = self.max_phase.saturating_sub(self.min_phase);
        (self.min_phase + span.mul_f64(rho)).clamp(self.min_phase, self.max_phase)
    }

    /// One control tick: adapt the green time, then flip if it has elapsed.
    /// Returns the new phase on a switch.
    pub fn tick(&mut self, now: Timestamp, density: f64) -> Option<Phase> {
        self.phase_duration = self.duration_for(density);
        if now.saturating_since(self.last_switch) >= self.phase_duration {
            self.phase = self.phase.flipped();
            self.last_switch = now;
            Some(self.phase)
        } else {
            None
        }
    }

    /// Answer a request against the current phase and `events`.
    ///
    /// A light only judges single steps into or out of its own node; any
    /// other move has no direction here and is denied.
    pub fn decide(&self, request: &MoveRequest, priority: bool, events: &EventStore) -> Reply {
        let id = request.request_id;
        if request.from != self.position && request.to != self.position {
            return Reply::deny(id, ReplyReason::UnknownDirection);
        }
        let Some(dir) = Direction::between(request.from, request.to) else {
            return Reply::deny(id, ReplyReason::UnknownDirection);
        };
        if events.is_blocked(Segment::new(request.from, request.to)) {
            return Reply::deny(id, ReplyReason::BlockedByIncident);
        }
        if priority {
            return Reply::grant(id, ReplyReason::Emergency);
        }
        Reply { request_id: id, granted: self.phase.allows(dir), reason: ReplyReason::PhaseCheck }
    }
}

// ── IntersectionAgent ─────────────────────────────────────────────────────────

/// Task driving one [`IntersectionController`].
pub struct IntersectionAgent {
    controller: IntersectionController,
    endpoint:   Endpoint,
    city:       Arc<City>,
}

impl IntersectionAgent {
    /// Register the controller for `position` on the city's switchboard.
    pub fn new(city: Arc<City>, position: GridPos) -> Self {
        let controller =
            IntersectionController::new(position, &city.config.intersection, city.clock.now());
        let endpoint = Endpoint::connect(city.switchboard.clone(), PeerAddress::Light(position));
        Self { controller, endpoint, city }
    }

    pub fn controller(&self) -> &IntersectionController {
        &self.controller
    }

    /// Run until the mailbox closes or the task is aborted.
    pub async fn run(mut self) {
        let cfg = self.city.config.intersection.clone();
        let pos = self.controller.position();
        info!(light = %self.endpoint.addr(), phase = self.controller.phase().index(), "intersection started");

        loop {
            let rho = self.city.occupancy.local_density(&self.city.network, pos, cfg.density_radius);
            if let Some(phase) = self.controller.tick(self.city.clock.now(), rho) {
                debug!(
                    light = %self.endpoint.addr(),
                    phase = phase.index(),
                    duration_ms = self.controller.phase_duration().as_millis() as u64,
                    "phase switched"
                );
            }

            match self.endpoint.recv(cfg.control_tick()).await {
                Ok(env) => self.handle(env.from, env.message),
                Err(RecvError::Timeout | RecvError::Empty) => {}
                Err(RecvError::Malformed { from: Some(from), .. }) => {
                    self.reply(from, Reply::deny(0, ReplyReason::InvalidBody));
                }
                Err(RecvError::Malformed { from: None, .. }) => {}
                Err(RecvError::Closed) => break,
            }
        }
        info!(light = %self.endpoint.addr(), "intersection stopped");
    }

    fn handle(&mut self, from: PeerAddress, message: Message) {
        let (request, priority) = match message {
            Message::PassageRequest(r)  => (r, false),
            Message::PriorityRequest(r) => (r, true),
            other => {
                trace!(light = %self.endpoint.addr(), kind = other.kind(), "ignored");
                return;
            }
        };
        let reply = self.controller.decide(&request, priority, &self.city.events);
        match reply.reason {
            ReplyReason::UnknownDirection => {
                warn!(light = %self.endpoint.addr(), %from, req_from = %request.from, req_to = %request.to, "unknown direction");
            }
            reason if reply.granted => {
                trace!(light = %self.endpoint.addr(), %from, req_to = %request.to, %reason, "request granted");
            }
            reason => {
                debug!(
                    light = %self.endpoint.addr(),
                    %from,
                    req_from = %request.from,
                    req_to = %request.to,
                    phase = self.controller.phase().index(),
                    %reason,
                    "request denied"
                );
            }
        }
        self.reply(from, reply);
    }

    fn reply(&self, to: PeerAddress, reply: Reply) {
        if let Err(e) = self.endpoint.send(to, Message::PassageReply(reply)) {
            debug!(light = %self.endpoint.addr(), %to, error = %e, "reply undeliverable");
        }
    }
}
