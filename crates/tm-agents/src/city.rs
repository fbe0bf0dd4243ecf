//! State shared by every task of one simulation.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use tm_core::{GridPos, SimClock, SimConfig};
use tm_events::EventStore;
use tm_protocol::Switchboard;
use tm_spatial::{OccupancyTracker, RoadNetwork, Router};

use crate::{PositionBoard, TrafficObserver};

/// The environment agents act in.
///
/// Built once and handed to every task as `Arc<City>`.  The network and the
/// placement of hospitals and lights are immutable; occupancy, incidents and
/// the position board synchronize internally.
pub struct City {
    pub config:      SimConfig,
    pub clock:       SimClock,
    pub network:     RoadNetwork,
    pub occupancy:   OccupancyTracker,
    /// Infrastructure view of incidents: written by the incident source,
    /// read by intersection controllers.  Vehicles keep their own replicas.
    pub events:      EventStore,
    pub board:       PositionBoard,
    pub router:      Box<dyn Router>,
    pub observer:    Arc<dyn TrafficObserver>,
    pub switchboard: Arc<Switchboard>,

    hospitals: Vec<GridPos>,
    lights:    FxHashSet<GridPos>,
}

impl City {
    pub fn new(
        config:   SimConfig,
        clock:    SimClock,
        network:  RoadNetwork,
        router:   Box<dyn Router>,
        observer: Arc<dyn TrafficObserver>,
    ) -> Self {
        let mut hospitals = config.hospital_nodes();
        hospitals.sort_unstable();
        hospitals.dedup();
        let lights = config
            .light_nodes()
            .into_iter()
            .filter(|n| network.contains(*n))
            .collect();
        Self {
            occupancy:   OccupancyTracker::from_config(&config.occupancy),
            events:      EventStore::new(clock, config.incidents.block_threshold),
            board:       PositionBoard::new(),
            switchboard: Arc::new(Switchboard::new()),
            config,
            clock,
            network,
            router,
            observer,
            hospitals,
            lights,
        }
    }

    /// Hospital nodes, sorted.
    #[inline]
    pub fn hospitals(&self) -> &[GridPos] {
        &self.hospitals
    }

    #[inline]
    pub fn is_hospital(&self, node: GridPos) -> bool {
        self.hospitals.contains(&node)
    }

    /// `true` if an intersection controller guards `node`.
    #[inline]
    pub fn has_light(&self, node: GridPos) -> bool {
        self.lights.contains(&node)
    }

    /// Every guarded node, sorted.
    pub fn lights(&self) -> Vec<GridPos> {
        let mut out: Vec<GridPos> = self.lights.iter().copied().collect();
        out.sort_unstable();
        out
    }

    /// The hospital closest to `from` (Manhattan; ties go to the smaller node).
    pub fn nearest_hospital(&self, from: GridPos) -> Option<GridPos> {
        self.hospitals.iter().copied().min_by_key(|h| (h.manhattan(from), *h))
    }
}

impl std::fmt::Debug for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("City")
            .field("network", &self.network)
            .field("hospitals", &self.hospitals)
            .field("lights", &self.lights.len())
            .finish()
    }
}
