//! The `Sim` struct and its task supervisor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tm_agents::{City, IncidentSource, IntersectionAgent, VehicleAgent};

use crate::{MetricsRecorder, MetricsSummary, SimResult};

/// A fully wired simulation, ready to run.
///
/// Create via [`SimBuilder`][crate::SimBuilder].  Every vehicle and
/// intersection is already registered on the switchboard and the position
/// board; [`run`](Self::run) spawns one task per participant.
pub struct Sim {
    pub(crate) city:          Arc<City>,
    pub(crate) metrics:       Arc<MetricsRecorder>,
    pub(crate) intersections: Vec<IntersectionAgent>,
    pub(crate) vehicles:      Vec<VehicleAgent>,
    pub(crate) incidents:     IncidentSource,
    pub(crate) sample_period: Duration,
}

impl Sim {
    /// Shared state, for visualization or inspection after the run.
    pub fn city(&self) -> &Arc<City> {
        &self.city
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    /// Run every participant for `duration`, then cancel them all and
    /// return the metrics summary.
    ///
    /// A task that panics fails the run once the others are stopped.
    pub async fn run(self, duration: Duration) -> SimResult<MetricsSummary> {
        let Sim { city, metrics, intersections, vehicles, incidents, sample_period } = self;
        let mut tasks = JoinSet::new();

        for light in intersections {
            tasks.spawn(light.run());
        }
        for vehicle in vehicles {
            tasks.spawn(vehicle.run());
        }
        tasks.spawn(incidents.run());
        tasks.spawn(sample_loop(city.clone(), metrics.clone(), sample_period));
        info!(tasks = tasks.len(), secs = duration.as_secs_f64(), "simulation running");

        sleep(duration).await;
        tasks.abort_all();

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    warn!(error = %e, "task failed");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        let summary = metrics.summary();
        info!(
            n_trips = summary.n_trips,
            total_replans = summary.total_replans,
            avg_trip_time = ?summary.avg_trip_time,
            ev_response_time = ?summary.ev_response_time,
            avg_rho = ?summary.avg_rho,
            "simulation finished"
        );
        Ok(summary)
    }
}

/// One congestion sample: advance every smoothed density by one step and
/// record the share of nodes holding at least one vehicle.
pub fn sample_congestion(city: &City, metrics: &MetricsRecorder) -> f64 {
    city.occupancy.advance_all();
    let nodes = city.network.node_count();
    let rho = if nodes == 0 {
        0.0
    } else {
        city.board.occupied_node_count() as f64 / nodes as f64
    };
    metrics.log_congestion(rho);
    rho
}

async fn sample_loop(city: Arc<City>, metrics: Arc<MetricsRecorder>, period: Duration) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        let rho = sample_congestion(&city, &metrics);
        let swept = city.events.sweep_expired();
        debug!(rho, active_incidents = city.events.len(), swept, "congestion sampled");
    }
}
