//! Peer addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use tm_core::{AgentId, GridPos, VehicleKind};

/// Address of a participant on the switchboard.
///
/// Labels follow the `role-index` convention: `vehicle-3`, `ambulance-12`,
/// `light-4-8`, `incident-source`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerAddress {
    Vehicle(AgentId),
    Ambulance(AgentId),
    /// The intersection controller guarding a node.
    Light(GridPos),
    IncidentSource,
}

impl PeerAddress {
    /// The address of a vehicle of the given kind.
    pub fn vehicle(kind: VehicleKind, id: AgentId) -> Self {
        match kind {
            VehicleKind::Ordinary  => PeerAddress::Vehicle(id),
            VehicleKind::Emergency => PeerAddress::Ambulance(id),
        }
    }

    /// `true` for ordinary and emergency vehicles, the gossip audience.
    #[inline]
    pub fn is_vehicle(&self) -> bool {
        matches!(self, PeerAddress::Vehicle(_) | PeerAddress::Ambulance(_))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddress::Vehicle(id)    => write!(f, "vehicle-{}", id.0),
            PeerAddress::Ambulance(id)  => write!(f, "ambulance-{}", id.0),
            PeerAddress::Light(pos)     => write!(f, "light-{}-{}", pos.x, pos.y),
            PeerAddress::IncidentSource => f.write_str("incident-source"),
        }
    }
}
