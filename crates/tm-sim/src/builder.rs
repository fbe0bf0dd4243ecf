//! Fluent builder for constructing a [`Sim`].

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tracing::info;

use tm_agents::{City, IncidentSource, IntersectionAgent, VehicleAgent};
use tm_core::{AgentId, GridPos, SimClock, SimConfig, SimRng, VehicleKind};
use tm_spatial::{AStarRouter, RoadNetwork, Router};

use crate::{MetricsRecorder, Sim, SimError, SimResult};

/// Stream offset of the incident source's RNG.
const INCIDENT_STREAM: u64 = 1;

/// Fluent builder for [`Sim`].
///
/// # Optional inputs
///
/// | Method                  | Default                                      |
/// |-------------------------|----------------------------------------------|
/// | `.network(n)`           | `RoadNetwork::grid(width, height)`           |
/// | `.router(r)`            | `AStarRouter`                                |
/// | `.placements(v)`        | distinct random nodes drawn from the seed    |
/// | `.emergency_bases(v)`   | none: each ambulance uses its nearest hospital |
/// | `.sample_period(d)`     | 1 s                                          |
pub struct SimBuilder {
    config:          SimConfig,
    network:         Option<RoadNetwork>,
    router:          Option<Box<dyn Router>>,
    placements:      Option<Vec<GridPos>>,
    emergency_bases: Vec<GridPos>,
    sample_period:   Duration,
}

impl SimBuilder {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            network:         None,
            router:          None,
            placements:      None,
            emergency_bases: Vec::new(),
            sample_period:   Duration::from_secs(1),
        }
    }

    /// Use a custom network (e.g. with removed or weighted segments).  Its
    /// dimensions must match the configured grid.
    pub fn network(mut self, network: RoadNetwork) -> Self {
        self.network = Some(network);
        self
    }

    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Some(Box::new(router));
        self
    }

    /// Starting nodes: ordinary vehicles first, then ambulances.  Must hold
    /// exactly `vehicle_count + emergency_count` distinct grid nodes.
    pub fn placements(mut self, nodes: Vec<GridPos>) -> Self {
        self.placements = Some(nodes);
        self
    }

    /// Tie ambulances to fixed hospitals, assigned round-robin.
    pub fn emergency_bases(mut self, bases: Vec<GridPos>) -> Self {
        self.emergency_bases = bases;
        self
    }

    pub fn sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Validate inputs, build the city and every agent, and return a
    /// ready-to-run [`Sim`].  Nothing is spawned yet.
    pub fn build(self) -> SimResult<Sim> {
        self.config.validate()?;
        if self.sample_period.is_zero() {
            return Err(SimError::Config("sample_period must be > 0".into()));
        }

        let network = match self.network {
            Some(n) => n,
            None => RoadNetwork::grid(self.config.grid_width, self.config.grid_height)?,
        };
        if network.width() != self.config.grid_width || network.height() != self.config.grid_height {
            return Err(SimError::Config(format!(
                "network is {}x{} but config says {}x{}",
                network.width(),
                network.height(),
                self.config.grid_width,
                self.config.grid_height
            )));
        }
        if let Some(b) = self.emergency_bases.iter().find(|b| !network.contains(**b)) {
            return Err(SimError::Config(format!("emergency base {b} lies outside the grid")));
        }

        let mut rng = SimRng::new(self.config.seed);
        let ordinary = self.config.vehicle_count;
        let needed = ordinary + self.config.emergency_count;
        let starts = match self.placements {
            Some(nodes) => check_placements(nodes, needed, &network)?,
            None => {
                let free: Vec<GridPos> = network.nodes().collect();
                if free.len() < needed {
                    return Err(SimError::Placement { needed, free: free.len() });
                }
                rng.choose_multiple(&free, needed)
            }
        };

        let clock = SimClock::start();
        let metrics = Arc::new(MetricsRecorder::new(clock));
        let router = self.router.unwrap_or_else(|| Box::new(AStarRouter));
        let city = Arc::new(City::new(self.config, clock, network, router, metrics.clone()));

        let intersections: Vec<IntersectionAgent> = city
            .lights()
            .into_iter()
            .map(|pos| IntersectionAgent::new(city.clone(), pos))
            .collect();

        let mut vehicles = Vec::with_capacity(needed);
        for (i, start) in starts.into_iter().enumerate() {
            let id = AgentId(i as u32);
            let vehicle = if i < ordinary {
                VehicleAgent::new(city.clone(), id, VehicleKind::Ordinary, start)
            } else {
                let v = VehicleAgent::new(city.clone(), id, VehicleKind::Emergency, start);
                match self.emergency_bases.get((i - ordinary) % self.emergency_bases.len().max(1)) {
                    Some(base) => v.with_fixed_base(*base),
                    None => v,
                }
            };
            vehicles.push(vehicle);
        }

        let incidents = IncidentSource::new(city.clone(), rng.child(INCIDENT_STREAM));

        info!(
            width = city.network.width(),
            height = city.network.height(),
            vehicles = ordinary,
            ambulances = needed - ordinary,
            lights = intersections.len(),
            hospitals = city.hospitals().len(),
            "simulation built"
        );

        Ok(Sim {
            city,
            metrics,
            intersections,
            vehicles,
            incidents,
            sample_period: self.sample_period,
        })
    }
}

fn check_placements(nodes: Vec<GridPos>, needed: usize, network: &RoadNetwork) -> SimResult<Vec<GridPos>> {
    if nodes.len() != needed {
        return Err(SimError::Config(format!(
            "{} placements given for {needed} vehicles",
            nodes.len()
        )));
    }
    if let Some(n) = nodes.iter().find(|n| !network.contains(**n)) {
        return Err(SimError::Config(format!("placement {n} lies outside the grid")));
    }
    let distinct: FxHashSet<GridPos> = nodes.iter().copied().collect();
    if distinct.len() != nodes.len() {
        return Err(SimError::Config("placements must be distinct nodes".into()));
    }
    Ok(nodes)
}
