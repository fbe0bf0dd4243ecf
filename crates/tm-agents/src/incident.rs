//! Periodic roadblock generator.

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use tm_core::{Segment, SimRng};
use tm_events::{GossipEnvelope, Incident};
use tm_protocol::{Endpoint, Message, PeerAddress};

use crate::City;

/// Blocks random segments every `interval_ms` and tells every vehicle.
///
/// The infrastructure store (`City::events`) is written directly, so
/// intersection controllers see a block at once; vehicles learn of it only
/// through the gossip broadcast that follows.
pub struct IncidentSource {
    city:     Arc<City>,
    endpoint: Endpoint,
    rng:      SimRng,
}

impl IncidentSource {
    pub fn new(city: Arc<City>, rng: SimRng) -> Self {
        let endpoint = Endpoint::connect(city.switchboard.clone(), PeerAddress::IncidentSource);
        Self { city, endpoint, rng }
    }

    /// Block up to `max_blocks` currently unblocked segments and broadcast
    /// one gossip message per new incident.
    pub fn inject(&mut self) -> Vec<Incident> {
        let cfg = &self.city.config.incidents;
        self.city.events.sweep_expired();

        let blocked = self.city.events.snapshot();
        let candidates: Vec<Segment> = self
            .city
            .network
            .segments()
            .into_iter()
            .filter(|s| !blocked.is_blocked(*s))
            .collect();
        let chosen = self.rng.choose_multiple(&candidates, cfg.max_blocks);

        let audience = self.endpoint.board().vehicles();
        let mut spawned = Vec::with_capacity(chosen.len());
        for segment in chosen {
            let incident = match self.city.events.spawn(segment, cfg.severity, cfg.ttl()) {
                Ok(incident) => incident,
                Err(e) => {
                    warn!(%segment, error = %e, "incident rejected");
                    continue;
                }
            };
            let gossip = GossipEnvelope::new(incident.fact(), cfg.hop_ttl);
            let sent = self.endpoint.board().broadcast(
                self.endpoint.addr(),
                audience.iter().copied(),
                &Message::IncidentGossip(gossip),
            );
            info!(
                %segment,
                severity = incident.severity,
                ttl_ms = cfg.ttl_ms,
                notified = sent,
                "incident injected"
            );
            spawned.push(incident);
        }
        spawned
    }

    /// Inject every `interval_ms`, first after one full interval.
    pub async fn run(mut self) {
        let period = self.city.config.incidents.interval();
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            self.inject();
        }
    }
}
