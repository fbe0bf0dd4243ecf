//! Simulation configuration.
//!
//! Every tunable of the engine lives here as plain data.  Behaviour
//! differences between ordinary and emergency vehicles are expressed as two
//! [`AgentProfile`]s rather than as separate code paths.
//!
//! With the `serde` feature all structs deserialize with `#[serde(default)]`,
//! so a config file only needs the fields it overrides.  The one exception
//! is a partially given `emergency` profile: its missing fields fall back to
//! the ordinary defaults, so spell that profile out in full.

use std::time::Duration;

use crate::{CoreError, CoreResult, GridPos, VehicleKind};

// ── AgentProfile ──────────────────────────────────────────────────────────────

/// Per-role parameters of the vehicle control loop and its router.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AgentProfile {
    pub kind: VehicleKind,

    /// Period of the decision loop.
    pub tick_ms: u64,

    /// Weighted-A* heuristic weight (1.0 = exact A*).
    pub heuristic_weight: f64,

    /// Multiplier applied to segment density in the edge cost.
    pub congestion_coefficient: f64,

    /// Skip capacity-based pruning of full segments.
    pub ignore_capacity: bool,

    /// Force a replan after this many committed steps.
    pub replan_every: u32,

    /// A freshly merged incident within this Manhattan radius triggers a replan.
    pub incident_replan_radius: u32,

    /// Random goals are at least this far (Manhattan) from the current node.
    pub min_goal_distance: u32,

    /// Pause at the goal before picking the next one.
    pub dwell_ms: u64,

    /// Deadline for a reply to a passage or priority request.
    pub reply_timeout_ms: u64,

    /// Wait before the single resend after a timeout.
    pub retry_backoff_ms: u64,

    /// Wait before asking again after a denial.
    pub denial_wait_ms: u64,

    /// Denials tolerated before the plan is abandoned.
    pub max_denials: u32,

    /// Number of peers a novel gossip fact is forwarded to.
    pub gossip_fanout: usize,
}

impl AgentProfile {
    /// Near-optimal, congestion-sensitive profile for private vehicles.
    pub fn ordinary() -> Self {
        Self {
            kind:                   VehicleKind::Ordinary,
            tick_ms:                1_500,
            heuristic_weight:       1.2,
            congestion_coefficient: 0.6,
            ignore_capacity:        false,
            replan_every:           10,
            incident_replan_radius: 4,
            min_goal_distance:      8,
            dwell_ms:               3_000,
            reply_timeout_ms:       800,
            retry_backoff_ms:       400,
            denial_wait_ms:         500,
            max_denials:            6,
            gossip_fanout:          3,
        }
    }

    /// Exact, capacity-ignoring profile for ambulances.
    pub fn emergency() -> Self {
        Self {
            kind:                   VehicleKind::Emergency,
            tick_ms:                1_000,
            heuristic_weight:       1.0,
            congestion_coefficient: 0.3,
            ignore_capacity:        true,
            min_goal_distance:      10,
            reply_timeout_ms:       600,
            retry_backoff_ms:       300,
            denial_wait_ms:         300,
            max_denials:            3,
            ..Self::ordinary()
        }
    }

    #[inline]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[inline]
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    #[inline]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[inline]
    pub fn denial_wait(&self) -> Duration {
        Duration::from_millis(self.denial_wait_ms)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.tick_ms == 0 {
            return Err(CoreError::Config(format!("{} tick_ms must be > 0", self.kind)));
        }
        if !(self.heuristic_weight >= 1.0) {
            return Err(CoreError::Config(format!(
                "{} heuristic_weight must be >= 1.0, got {}",
                self.kind, self.heuristic_weight
            )));
        }
        if !(self.congestion_coefficient >= 0.0) {
            return Err(CoreError::Config(format!(
                "{} congestion_coefficient must be >= 0.0",
                self.kind
            )));
        }
        Ok(())
    }
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self::ordinary()
    }
}

// ── OccupancyConfig ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OccupancyConfig {
    /// Vehicles a segment holds before it counts as full.
    pub default_capacity: u32,
    /// EMA smoothing factor α in `(0, 1]`.
    pub ema_alpha: f64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self { default_capacity: 5, ema_alpha: 0.3 }
    }
}

// ── IncidentConfig ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IncidentConfig {
    /// Period of the random roadblock generator.
    pub interval_ms: u64,
    /// Lifetime of a generated roadblock.
    pub ttl_ms: u64,
    /// Severity of a generated roadblock.
    pub severity: f64,
    /// Roadblocks spawned per generator round.
    pub max_blocks: usize,
    /// Initial hop budget of a gossip payload.
    pub hop_ttl: u8,
    /// Minimum severity for a segment to count as blocked.
    pub block_threshold: f64,
}

impl IncidentConfig {
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            interval_ms:     3_000,
            ttl_ms:          8_000,
            severity:        10.0,
            max_blocks:      3,
            hop_ttl:         4,
            block_threshold: 3.0,
        }
    }
}

// ── IntersectionConfig ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IntersectionConfig {
    /// How long the controller waits for a request before re-evaluating its phase.
    pub control_tick_ms: u64,
    /// Green time at zero local density.
    pub min_phase_ms: u64,
    /// Green time cap under full congestion.
    pub max_phase_ms: u64,
    /// Euclidean radius of the local density aggregate.
    pub density_radius: f64,
}

impl IntersectionConfig {
    #[inline]
    pub fn control_tick(&self) -> Duration {
        Duration::from_millis(self.control_tick_ms)
    }
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            control_tick_ms: 100,
            min_phase_ms:    3_000,
            max_phase_ms:    8_000,
            density_radius:  2.0,
        }
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
///
/// Typically loaded from a JSON file by the application crate and passed to
/// the simulation builder.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Grid columns.
    pub grid_width: u32,
    /// Grid rows.
    pub grid_height: u32,

    /// Master RNG seed.
    pub seed: u64,

    pub vehicle_count: usize,
    pub emergency_count: usize,

    /// Intersections with `x % spacing == 0 && y % spacing == 0` get a
    /// controller.  `0` disables traffic lights.
    pub light_spacing: u32,

    /// Hospital nodes.  Empty means "use the default three".
    pub hospitals: Vec<GridPos>,

    pub occupancy:    OccupancyConfig,
    pub incidents:    IncidentConfig,
    pub intersection: IntersectionConfig,
    pub ordinary:     AgentProfile,
    pub emergency:    AgentProfile,
}

impl SimConfig {
    /// Hospitals in use: the configured list or the default placement
    /// (north-west, north-east, centre).
    pub fn hospital_nodes(&self) -> Vec<GridPos> {
        if !self.hospitals.is_empty() {
            return self.hospitals.clone();
        }
        let w = self.grid_width as i32;
        let h = self.grid_height as i32;
        let mut nodes = vec![
            GridPos::new(2.min(w - 1), (h - 2).max(0)),
            GridPos::new((w - 3).max(0), (h - 3).max(0)),
            GridPos::new(w / 2, h / 2),
        ];
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Nodes guarded by an intersection controller.
    pub fn light_nodes(&self) -> Vec<GridPos> {
        if self.light_spacing == 0 {
            return Vec::new();
        }
        let step = self.light_spacing as usize;
        let mut nodes = Vec::new();
        for x in (0..self.grid_width as i32).step_by(step) {
            for y in (0..self.grid_height as i32).step_by(step) {
                nodes.push(GridPos::new(x, y));
            }
        }
        nodes
    }

    /// `true` if `node` lies inside the grid.
    #[inline]
    pub fn contains(&self, node: GridPos) -> bool {
        node.x >= 0
            && node.y >= 0
            && (node.x as u32) < self.grid_width
            && (node.y as u32) < self.grid_height
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(CoreError::Config(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.occupancy.default_capacity == 0 {
            return Err(CoreError::Config("default_capacity must be >= 1".into()));
        }
        let alpha = self.occupancy.ema_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(CoreError::Config(format!("ema_alpha must be in (0, 1], got {alpha}")));
        }
        if self.intersection.min_phase_ms > self.intersection.max_phase_ms {
            return Err(CoreError::Config("min_phase_ms exceeds max_phase_ms".into()));
        }
        if self.incidents.interval_ms == 0 {
            return Err(CoreError::Config("incident interval_ms must be > 0".into()));
        }
        if let Some(h) = self.hospitals.iter().find(|h| !self.contains(**h)) {
            return Err(CoreError::Config(format!("hospital {h} lies outside the grid")));
        }
        if self.ordinary.kind != VehicleKind::Ordinary
            || self.emergency.kind != VehicleKind::Emergency
        {
            return Err(CoreError::Config("agent profile kinds are swapped".into()));
        }
        self.ordinary.validate()?;
        self.emergency.validate()?;
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_width:      20,
            grid_height:     20,
            seed:            42,
            vehicle_count:   10,
            emergency_count: 5,
            light_spacing:   4,
            hospitals:       Vec::new(),
            occupancy:       OccupancyConfig::default(),
            incidents:       IncidentConfig::default(),
            intersection:    IntersectionConfig::default(),
            ordinary:        AgentProfile::ordinary(),
            emergency:       AgentProfile::emergency(),
        }
    }
}
