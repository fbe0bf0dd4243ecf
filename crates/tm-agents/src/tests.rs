//! Unit tests for tm-agents.
//!
//! Anything that waits on a message runs under `start_paused` so timeouts and
//! dwell times elapse instantly and deterministically.

#[cfg(test)]
mod helpers {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tm_core::{AgentId, GridPos, SimClock, SimConfig};
    use tm_spatial::{AStarRouter, RoadNetwork};

    use crate::{City, NoopObserver, TrafficObserver};

    pub fn p(x: i32, y: i32) -> GridPos {
        GridPos::new(x, y)
    }

    pub fn config(width: u32, height: u32, light_spacing: u32) -> SimConfig {
        SimConfig {
            grid_width: width,
            grid_height: height,
            light_spacing,
            ..SimConfig::default()
        }
    }

    pub fn city_with(cfg: SimConfig, observer: Arc<dyn TrafficObserver>) -> Arc<City> {
        let network = RoadNetwork::grid(cfg.grid_width, cfg.grid_height).unwrap();
        Arc::new(City::new(cfg, SimClock::start(), network, Box::new(AStarRouter), observer))
    }

    pub fn city(cfg: SimConfig) -> Arc<City> {
        city_with(cfg, Arc::new(NoopObserver))
    }

    /// Counts every observer callback.
    #[derive(Default)]
    pub struct Counter {
        pub trip_starts:      AtomicUsize,
        pub trip_ends:        AtomicUsize,
        pub emergency_starts: AtomicUsize,
        pub emergency_ends:   AtomicUsize,
        pub replans:          AtomicUsize,
    }

    impl Counter {
        pub fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    impl TrafficObserver for Counter {
        fn on_trip_start(&self, _agent: AgentId) {
            self.trip_starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_trip_end(&self, _agent: AgentId) {
            self.trip_ends.fetch_add(1, Ordering::SeqCst);
        }
        fn on_emergency_start(&self) {
            self.emergency_starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_emergency_end(&self) {
            self.emergency_ends.fetch_add(1, Ordering::SeqCst);
        }
        fn on_replan(&self, _agent: AgentId) {
            self.replans.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Position board ────────────────────────────────────────────────────────────

#[cfg(test)]
mod board {
    use std::sync::{Arc, Barrier};

    use tm_core::{AgentId, VehicleKind};

    use super::helpers::p;
    use crate::{MoveConflict, PositionBoard};

    const ORD: VehicleKind = VehicleKind::Ordinary;
    const EMG: VehicleKind = VehicleKind::Emergency;

    #[test]
    fn ordinary_never_shares_a_node() {
        let board = PositionBoard::new();
        board.place(AgentId(0), ORD, p(1, 1));
        board.place(AgentId(1), ORD, p(1, 2));
        assert_eq!(
            board.try_move(AgentId(1), ORD, p(1, 1), &[p(1, 1)]),
            Err(MoveConflict { target: p(1, 1), occupant: AgentId(0) })
        );
        assert_eq!(board.position(AgentId(1)), Some(p(1, 2)));
    }

    #[test]
    fn emergency_vehicles_share_only_hospitals() {
        let hospitals = [p(3, 3)];
        let board = PositionBoard::new();
        board.place(AgentId(10), EMG, p(3, 3));
        board.place(AgentId(11), EMG, p(3, 2));
        board.place(AgentId(12), EMG, p(5, 5));
        board.place(AgentId(13), EMG, p(5, 4));

        assert!(board.try_move(AgentId(11), EMG, p(3, 3), &hospitals).is_ok());
        assert_eq!(board.occupants_at(p(3, 3)), vec![AgentId(10), AgentId(11)]);
        assert!(board.try_move(AgentId(13), EMG, p(5, 5), &hospitals).is_err());
    }

    #[test]
    fn emergency_never_joins_an_ordinary_vehicle() {
        let hospitals = [p(3, 3)];
        let board = PositionBoard::new();
        board.place(AgentId(0), ORD, p(3, 3));
        board.place(AgentId(10), EMG, p(3, 2));
        assert!(board.try_move(AgentId(10), EMG, p(3, 3), &hospitals).is_err());
    }

    #[test]
    fn moving_onto_own_node_is_allowed() {
        let board = PositionBoard::new();
        board.place(AgentId(0), ORD, p(2, 2));
        assert!(board.try_move(AgentId(0), ORD, p(2, 2), &[]).is_ok());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn concurrent_race_for_one_node_has_one_winner() {
        let board = Arc::new(PositionBoard::new());
        board.place(AgentId(0), ORD, p(4, 5));
        board.place(AgentId(1), ORD, p(5, 4));
        let barrier = Arc::new(Barrier::new(2));

        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = [AgentId(0), AgentId(1)]
                .into_iter()
                .map(|id| {
                    let board = board.clone();
                    let barrier = barrier.clone();
                    s.spawn(move || {
                        barrier.wait();
                        board.try_move(id, ORD, p(5, 5), &[]).is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(board.occupants_at(p(5, 5)).len(), 1);
        assert_eq!(board.occupied_node_count(), 2);
    }

    #[test]
    fn snapshot_is_sorted_by_agent() {
        let board = PositionBoard::new();
        board.place(AgentId(7), ORD, p(0, 0));
        board.place(AgentId(2), EMG, p(1, 0));
        let ids: Vec<AgentId> = board.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![AgentId(2), AgentId(7)]);
        assert!(board.remove(AgentId(7)).is_some());
        assert!(!board.is_occupied(p(0, 0)));
    }
}

// ── City ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod city {
    use tm_core::SimConfig;

    use super::helpers::{city, config, p};

    #[tokio::test(start_paused = true)]
    async fn default_hospitals_and_light_lattice() {
        let c = city(config(10, 10, 4));
        assert_eq!(c.hospitals(), &[p(2, 8), p(5, 5), p(7, 7)]);
        assert!(c.is_hospital(p(5, 5)));
        assert!(c.has_light(p(4, 4)));
        assert!(c.has_light(p(8, 0)));
        assert!(!c.has_light(p(4, 5)));
        assert_eq!(c.lights().len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn nearest_hospital_breaks_ties_by_node() {
        let cfg = SimConfig { hospitals: vec![p(4, 0), p(0, 4)], ..config(5, 5, 0) };
        let c = city(cfg);
        assert_eq!(c.nearest_hospital(p(0, 0)), Some(p(0, 4)));
        assert_eq!(c.nearest_hospital(p(4, 1)), Some(p(4, 0)));
        assert!(c.lights().is_empty());
    }
}

// ── Intersection controller ───────────────────────────────────────────────────

#[cfg(test)]
mod controller {
    use std::time::Duration;

    use tm_core::{IntersectionConfig, Segment, SimClock, Timestamp};
    use tm_events::EventStore;
    use tm_protocol::{MoveRequest, ReplyReason};

    use super::helpers::p;
    use crate::{IntersectionController, Phase};

    fn controller() -> IntersectionController {
        IntersectionController::new(p(4, 4), &IntersectionConfig::default(), Timestamp(0))
    }

    fn req(id: u64, from: (i32, i32), to: (i32, i32)) -> MoveRequest {
        MoveRequest { request_id: id, from: p(from.0, from.1), to: p(to.0, to.1) }
    }

    #[tokio::test(start_paused = true)]
    async fn phase_zero_admits_north_south_only() {
        let events = EventStore::with_default_threshold(SimClock::start());
        let c = controller();
        assert_eq!(c.phase(), Phase::NorthSouth);

        let ns = c.decide(&req(1, (4, 4), (4, 5)), false, &events);
        assert!(ns.granted);
        assert_eq!(ns.reason, ReplyReason::PhaseCheck);
        assert_eq!(ns.request_id, 1);

        let ew = c.decide(&req(2, (4, 4), (5, 4)), false, &events);
        assert!(!ew.granted);
        assert_eq!(ew.reason, ReplyReason::PhaseCheck);
    }

    #[tokio::test(start_paused = true)]
    async fn priority_is_granted_against_the_phase() {
        let events = EventStore::with_default_threshold(SimClock::start());
        let reply = controller().decide(&req(3, (3, 4), (4, 4)), true, &events);
        assert!(reply.granted);
        assert_eq!(reply.reason, ReplyReason::Emergency);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_segment_denies_everyone() {
        let events = EventStore::with_default_threshold(SimClock::start());
        events
            .spawn_temporary_block(Segment::new(p(4, 3), p(4, 4)), Duration::from_secs(5))
            .unwrap();
        let c = controller();
        for priority in [false, true] {
            let reply = c.decide(&req(4, (4, 3), (4, 4)), priority, &events);
            assert!(!reply.granted);
            assert_eq!(reply.reason, ReplyReason::BlockedByIncident);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_adjacent_request_is_unknown_direction() {
        let events = EventStore::with_default_threshold(SimClock::start());
        let c = controller();
        for (from, to) in [((2, 4), (4, 4)), ((3, 3), (4, 4)), ((4, 4), (4, 4))] {
            let reply = c.decide(&req(5, from, to), true, &events);
            assert!(!reply.granted);
            assert_eq!(reply.reason, ReplyReason::UnknownDirection);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn moves_away_from_the_light_are_denied() {
        let events = EventStore::with_default_threshold(SimClock::start());
        let c = controller();
        for priority in [false, true] {
            let reply = c.decide(&req(6, (6, 6), (6, 7)), priority, &events);
            assert!(!reply.granted);
            assert_eq!(reply.reason, ReplyReason::UnknownDirection);
        }
        let far = c.decide(&req(7, (i32::MAX, 0), (i32::MIN, 0)), true, &events);
        assert_eq!(far.reason, ReplyReason::UnknownDirection);
    }

    #[test]
    fn green_time_scales_with_density() {
        let c = controller();
        assert_eq!(c.duration_for(0.0), Duration::from_millis(3_000));
        assert_eq!(c.duration_for(0.5), Duration::from_millis(5_500));
        assert_eq!(c.duration_for(1.0), Duration::from_millis(8_000));
        assert_eq!(c.duration_for(7.0), Duration::from_millis(8_000));
        assert_eq!(c.duration_for(f64::NAN), Duration::from_millis(3_000));
    }

    #[test]
    fn tick_flips_once_green_time_elapses() {
        let mut c = controller();
        assert_eq!(c.tick(Timestamp(2_999), 0.0), None);
        assert_eq!(c.tick(Timestamp(3_000), 0.0), Some(Phase::EastWest));
        // congested: green time stretches to 8 s
        assert_eq!(c.tick(Timestamp(6_000), 1.0), None);
        assert_eq!(c.phase_duration(), Duration::from_millis(8_000));
        assert_eq!(c.tick(Timestamp(11_000), 1.0), Some(Phase::NorthSouth));
    }

    #[test]
    fn phases_partition_directions() {
        use tm_core::Direction;
        for dir in Direction::ALL {
            assert_ne!(Phase::NorthSouth.allows(dir), Phase::EastWest.allows(dir));
        }
        assert_eq!(Phase::NorthSouth.flipped().index(), 1);
    }
}

// ── Intersection task ─────────────────────────────────────────────────────────

#[cfg(test)]
mod intersection_agent {
    use std::time::Duration;

    use tm_core::AgentId;
    use tm_protocol::{Endpoint, Message, MoveRequest, PeerAddress, ReplyReason};

    use super::helpers::{city, config, p};
    use crate::IntersectionAgent;

    const LIGHT: PeerAddress = PeerAddress::Light(tm_core::GridPos::new(4, 4));

    #[tokio::test(start_paused = true)]
    async fn answers_passage_request() {
        let c = city(config(10, 10, 4));
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let me = PeerAddress::Vehicle(AgentId(0));
        let mut car = Endpoint::connect(c.switchboard.clone(), me);

        car.send(LIGHT, Message::PassageRequest(MoveRequest { request_id: 11, from: p(4, 3), to: p(4, 4) }))
            .unwrap();
        let env = car.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(env.from, LIGHT);
        let Message::PassageReply(reply) = env.message else { panic!("expected reply") };
        assert_eq!(reply.request_id, 11);
        assert!(reply.granted);
        assert_eq!(reply.reason, ReplyReason::PhaseCheck);
    }

    #[tokio::test(start_paused = true)]
    async fn priority_request_needs_one_exchange() {
        let c = city(config(10, 10, 4));
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut amb = Endpoint::connect(c.switchboard.clone(), PeerAddress::Ambulance(AgentId(3)));

        amb.send(LIGHT, Message::PriorityRequest(MoveRequest { request_id: 1, from: p(3, 4), to: p(4, 4) }))
            .unwrap();
        let env = amb.recv(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            env.message,
            Message::PassageReply(r) if r.granted && r.reason == ReplyReason::Emergency
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_coordinates_are_denied_and_the_light_keeps_running() {
        let c = city(config(10, 10, 4));
        let light = tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut car = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(0)));

        let wild = MoveRequest { request_id: 21, from: p(i32::MAX, 0), to: p(i32::MIN, 0) };
        car.send(LIGHT, Message::PassageRequest(wild)).unwrap();
        let env = car.recv(Duration::from_secs(1)).await.unwrap();
        let Message::PassageReply(reply) = env.message else { panic!("expected reply") };
        assert_eq!(reply.request_id, 21);
        assert!(!reply.granted);
        assert_eq!(reply.reason, ReplyReason::UnknownDirection);

        // still answering
        car.send(LIGHT, Message::PassageRequest(MoveRequest { request_id: 22, from: p(4, 3), to: p(4, 4) }))
            .unwrap();
        let env = car.recv(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(env.message, Message::PassageReply(r) if r.request_id == 22 && r.granted));
        assert!(!light.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_request_gets_invalid_body() {
        let c = city(config(10, 10, 4));
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut car = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(0)));

        c.switchboard
            .send_frame(LIGHT, br#"{"from":{"vehicle":0},"message":{"kind":"passage_request","requestId":4}}"#.to_vec())
            .unwrap();
        let env = car.recv(Duration::from_secs(1)).await.unwrap();
        let Message::PassageReply(reply) = env.message else { panic!("expected reply") };
        assert!(!reply.granted);
        assert_eq!(reply.request_id, 0);
        assert_eq!(reply.reason, ReplyReason::InvalidBody);
    }
}

// ── Incident source ───────────────────────────────────────────────────────────

#[cfg(test)]
mod incident_source {
    use rustc_hash::FxHashSet;

    use tm_core::{AgentId, SimRng};
    use tm_protocol::{Endpoint, Message, PeerAddress};

    use super::helpers::{city, config};
    use crate::IncidentSource;

    #[tokio::test(start_paused = true)]
    async fn inject_blocks_and_notifies_every_vehicle() {
        let c = city(config(6, 6, 0));
        let mut a = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(0)));
        let mut b = Endpoint::connect(c.switchboard.clone(), PeerAddress::Ambulance(AgentId(1)));
        let mut source = IncidentSource::new(c.clone(), SimRng::new(7));

        let spawned = source.inject();
        assert_eq!(spawned.len(), 3);
        for incident in &spawned {
            assert!(c.events.is_blocked(incident.segment));
        }

        for endpoint in [&mut a, &mut b] {
            for _ in 0..3 {
                let env = endpoint.try_recv().unwrap();
                assert_eq!(env.from, PeerAddress::IncidentSource);
                let Message::IncidentGossip(g) = env.message else { panic!("expected gossip") };
                assert_eq!(g.hop_ttl, 4);
                assert!(spawned.iter().any(|i| i.segment == g.fact.segment));
            }
            assert!(endpoint.try_recv().is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn already_blocked_segments_are_not_chosen_again() {
        let c = city(config(6, 6, 0));
        let mut source = IncidentSource::new(c.clone(), SimRng::new(9));
        let first: FxHashSet<_> = source.inject().into_iter().map(|i| i.segment).collect();
        let second: FxHashSet<_> = source.inject().into_iter().map(|i| i.segment).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert!(first.is_disjoint(&second));
        assert_eq!(c.events.len(), 6);
    }
}

// ── Vehicle control loop ──────────────────────────────────────────────────────

#[cfg(test)]
mod vehicle {
    use std::sync::Arc;
    use std::time::Duration;

    use tm_core::{AgentId, Segment, SimConfig, Timestamp, VehicleKind};
    use tm_events::{GossipEnvelope, IncidentFact};
    use tm_protocol::{Endpoint, Message, PeerAddress, RecvError};

    use super::helpers::{city, city_with, config, p, Counter};
    use crate::{ControlError, EmergencyPhase, IntersectionAgent, VehicleAgent};

    const ORD: VehicleKind = VehicleKind::Ordinary;
    const EMG: VehicleKind = VehicleKind::Emergency;

    fn fact(a: (i32, i32), b: (i32, i32), expires_ms: u64) -> IncidentFact {
        IncidentFact {
            segment:    Segment::new(p(a.0, a.1), p(b.0, b.1)),
            severity:   10.0,
            expires_at: Timestamp(expires_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_vehicle_is_on_board_and_switchboard() {
        let c = city(config(6, 6, 0));
        let v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(1, 1));
        assert_eq!(c.board.position(AgentId(0)), Some(p(1, 1)));
        assert!(c.switchboard.is_registered(PeerAddress::Vehicle(AgentId(0))));
        assert_eq!(v.state().phase, None);
        drop(v);
        assert!(!c.switchboard.is_registered(PeerAddress::Vehicle(AgentId(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_phase_depends_on_start() {
        let c = city(config(10, 10, 0));
        let at_base = VehicleAgent::new(c.clone(), AgentId(1), EMG, p(5, 5));
        assert_eq!(at_base.state().phase, Some(EmergencyPhase::ToRandom));

        let mut away = VehicleAgent::new(c.clone(), AgentId(2), EMG, p(0, 0));
        assert_eq!(away.state().phase, Some(EmergencyPhase::ToHospital));
        // (2, 8) and (5, 5) are both 10 away; the smaller node wins
        assert_eq!(away.choose_goal(), p(2, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_base_overrides_nearest_hospital() {
        let c = city(config(10, 10, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(1), EMG, p(5, 5)).with_fixed_base(p(7, 7));
        assert_eq!(v.state().phase, Some(EmergencyPhase::ToHospital));
        assert_eq!(v.choose_goal(), p(7, 7));
    }

    #[tokio::test(start_paused = true)]
    async fn ordinary_goal_is_far_enough() {
        let c = city(config(10, 10, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));
        for _ in 0..20 {
            assert!(v.choose_goal().manhattan(p(0, 0)) >= 8);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn commit_move_tracks_segments_and_conflicts() {
        let c = city(config(6, 6, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(1, 1));
        let first = Segment::new(p(1, 1), p(1, 2));
        let second = Segment::new(p(1, 2), p(1, 3));

        assert!(v.commit_move(p(1, 2)));
        assert_eq!(c.occupancy.count(first), 1);
        assert!(v.commit_move(p(1, 3)));
        assert_eq!(c.occupancy.count(first), 0);
        assert_eq!(c.occupancy.count(second), 1);

        c.board.place(AgentId(9), ORD, p(1, 4));
        assert!(!v.commit_move(p(1, 4)));
        assert_eq!(v.state().position, p(1, 3));
        assert_eq!(c.board.position(AgentId(0)), Some(p(1, 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn two_vehicles_claiming_one_node() {
        let c = city(config(10, 10, 0));
        let mut a = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(2, 3));
        let mut b = VehicleAgent::new(c.clone(), AgentId(1), ORD, p(3, 2));
        a.head_for(p(6, 3)).unwrap();
        b.head_for(p(3, 6)).unwrap();
        assert_eq!(a.state().next_step(), Some(p(3, 3)));
        assert_eq!(b.state().next_step(), Some(p(3, 3)));
        assert!(!b.needs_plan());

        assert!(a.commit_move(p(3, 3)));
        assert!(!b.commit_move(p(3, 3)));

        assert_eq!(c.board.occupants_at(p(3, 3)), vec![AgentId(0)]);
        assert_eq!(b.state().position, p(3, 2));
        assert_eq!(c.board.position(AgentId(1)), Some(p(3, 2)));
        // loser keeps its goal and replans next tick
        assert!(b.state().path.is_empty());
        assert_eq!(b.state().goal, Some(p(3, 6)));
        assert!(b.needs_plan());
        assert!(!a.state().path.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unguarded_node_needs_no_negotiation() {
        let c = city(config(6, 6, 4));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(1, 1));
        let start = tokio::time::Instant::now();
        assert!(v.negotiate(p(1, 1), p(1, 2)).await.unwrap());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_light_is_an_error() {
        let c = city(config(6, 6, 4));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(4, 3));
        assert!(matches!(v.negotiate(p(4, 3), p(4, 4)).await, Err(ControlError::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_light_is_retried_then_given_up() {
        let mut cfg = config(6, 6, 4);
        cfg.ordinary.max_denials = 2;
        let c = city(cfg);
        let mut light = Endpoint::connect(c.switchboard.clone(), PeerAddress::Light(p(4, 4)));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(4, 3));

        let start = tokio::time::Instant::now();
        assert!(!v.negotiate(p(4, 3), p(4, 4)).await.unwrap());
        // 2 × (800 wait + 400 backoff + 800 wait) + 500 denial wait
        assert_eq!(start.elapsed(), Duration::from_millis(4_500));

        let mut ids = Vec::new();
        while let Ok(env) = light.try_recv() {
            let Message::PassageRequest(r) = env.message else { panic!("expected request") };
            ids.push(r.request_id);
        }
        assert_eq!(ids, vec![1, 1, 2, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_denial_abandons_at_once() {
        let c = city(config(10, 10, 4));
        c.events
            .spawn_temporary_block(Segment::new(p(4, 3), p(4, 4)), Duration::from_secs(8))
            .unwrap();
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(4, 3));

        let start = tokio::time::Instant::now();
        assert!(!v.negotiate(p(4, 3), p(4, 4)).await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn phase_denial_waits_for_green() {
        let mut cfg = config(10, 10, 4);
        cfg.ordinary.max_denials = 20;
        let c = city(cfg);
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(3, 4));

        let start = tokio::time::Instant::now();
        assert!(v.negotiate(p(3, 4), p(4, 4)).await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn ambulance_is_granted_against_the_phase() {
        let c = city(config(10, 10, 4));
        tokio::spawn(IntersectionAgent::new(c.clone(), p(4, 4)).run());
        let mut v = VehicleAgent::new(c.clone(), AgentId(5), EMG, p(3, 4));

        let start = tokio::time::Instant::now();
        assert!(v.negotiate(p(3, 4), p(4, 4)).await.unwrap());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn gossip_is_merged_and_forwarded_with_one_hop_less() {
        let c = city(config(6, 6, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));
        let mut b = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(1)));
        let mut amb = Endpoint::connect(c.switchboard.clone(), PeerAddress::Ambulance(AgentId(2)));
        let f = fact((5, 5), (5, 4), 60_000);

        v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(f, 2));
        assert!(v.incidents().is_blocked(f.segment));
        for peer in [&mut b, &mut amb] {
            let env = peer.try_recv().unwrap();
            assert_eq!(env.from, PeerAddress::Vehicle(AgentId(0)));
            assert!(matches!(env.message, Message::IncidentGossip(g) if g.hop_ttl == 1 && g.fact == f));
        }

        // nothing new: not forwarded again
        v.on_gossip(PeerAddress::Vehicle(AgentId(1)), GossipEnvelope::new(f, 2));
        assert!(matches!(b.try_recv(), Err(RecvError::Empty)));
        assert!(matches!(amb.try_recv(), Err(RecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn gossip_is_not_echoed_to_sender_or_past_zero_hops() {
        let c = city(config(6, 6, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));
        let mut b = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(1)));
        let mut d = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(3)));

        v.on_gossip(PeerAddress::Vehicle(AgentId(1)), GossipEnvelope::new(fact((2, 2), (2, 3), 60_000), 3));
        assert!(matches!(b.try_recv(), Err(RecvError::Empty)));
        assert!(d.try_recv().is_ok());

        v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(fact((3, 3), (3, 4), 60_000), 0));
        assert!(v.incidents().is_blocked(Segment::new(p(3, 3), p(3, 4))));
        assert!(matches!(b.try_recv(), Err(RecvError::Empty)));
        assert!(matches!(d.try_recv(), Err(RecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_gossip_is_ignored() {
        let c = city(config(6, 6, 0));
        tokio::time::advance(Duration::from_secs(5)).await;
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));
        let mut b = Endpoint::connect(c.switchboard.clone(), PeerAddress::Vehicle(AgentId(1)));

        v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(fact((0, 0), (0, 1), 4_000), 3));
        assert!(v.incidents().is_empty());
        assert!(matches!(b.try_recv(), Err(RecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn nearby_incident_requests_replan() {
        let c = city(config(10, 10, 0));
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));

        v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(fact((9, 9), (9, 8), 60_000), 0));
        assert!(!v.state().incident_nearby);
        v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(fact((1, 1), (1, 2), 60_000), 0));
        assert!(v.state().incident_nearby);
    }

    #[tokio::test(start_paused = true)]
    async fn ordinary_vehicle_completes_a_trip() {
        let counter = Arc::new(Counter::default());
        let c = city_with(config(6, 6, 0), counter.clone());
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));

        v.tick().await.unwrap();
        assert_eq!(Counter::get(&counter.trip_starts), 1);
        assert_eq!(Counter::get(&counter.replans), 1);
        assert_eq!(v.state().position.manhattan(p(0, 0)), 1);
        let goal = v.state().goal.unwrap();

        for _ in 0..20 {
            if Counter::get(&counter.trip_ends) > 0 {
                break;
            }
            v.tick().await.unwrap();
        }
        assert_eq!(Counter::get(&counter.trip_ends), 1);
        assert_eq!(c.board.position(AgentId(0)), Some(goal));
        assert_eq!(v.state().goal, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ambulance_returns_to_base_then_heads_out() {
        let counter = Arc::new(Counter::default());
        let c = city_with(config(10, 10, 0), counter.clone());
        let mut v = VehicleAgent::new(c.clone(), AgentId(4), EMG, p(0, 0));

        for _ in 0..30 {
            if Counter::get(&counter.emergency_ends) > 0 {
                break;
            }
            v.tick().await.unwrap();
        }
        assert_eq!(Counter::get(&counter.emergency_ends), 1);
        assert!(c.is_hospital(v.state().position));
        assert_eq!(v.state().phase, Some(EmergencyPhase::ToRandom));

        v.tick().await.unwrap();
        assert_eq!(Counter::get(&counter.emergency_starts), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_path_falls_back_to_a_random_step() {
        let cfg = SimConfig { hospitals: vec![p(0, 0)], ..config(3, 3, 0) };
        let c = city(cfg);
        // wall off the far corner
        for seg in [Segment::new(p(2, 2), p(1, 2)), Segment::new(p(2, 2), p(2, 1))] {
            c.events.spawn_temporary_block(seg, Duration::from_secs(60)).unwrap();
        }
        let mut v = VehicleAgent::new(c.clone(), AgentId(0), ORD, p(0, 0));
        for seg in c.events.blocked_segments(c.events.threshold()) {
            let f = c.events.get(seg).unwrap().fact();
            v.on_gossip(PeerAddress::IncidentSource, GossipEnvelope::new(f, 0));
        }

        for _ in 0..10 {
            v.tick().await.unwrap();
            assert_ne!(v.state().position, p(2, 2));
        }
    }
}
