//! Vehicle role enum shared across the routing and control crates.
//!
//! Behaviour differences between roles (cost coefficients, capacity
//! ignoring, priority override) are carried by
//! [`AgentProfile`](crate::AgentProfile), not by the kind itself.  The kind
//! only decides labels, the request type sent to intersections, and the
//! collision rule on the position board.

/// The role a vehicle plays in the simulation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VehicleKind {
    /// Private vehicle travelling between random far-apart nodes.
    #[default]
    Ordinary,
    /// Ambulance cycling between hospitals and incident locations.
    Emergency,
}

impl VehicleKind {
    #[inline]
    pub fn is_emergency(self) -> bool {
        matches!(self, VehicleKind::Emergency)
    }

    /// Label prefix, e.g. `vehicle-3` / `ambulance-1`.
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleKind::Ordinary  => "vehicle",
            VehicleKind::Emergency => "ambulance",
        }
    }
}

impl std::fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
