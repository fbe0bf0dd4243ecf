//! Incident records.

use tm_core::{Segment, Timestamp};

/// A temporary, severity-weighted obstruction on one segment.
///
/// Owned exclusively by an [`EventStore`](crate::EventStore); callers only
/// ever receive copies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Incident {
    pub segment: Segment,
    /// `>= 0`; at or above the store's threshold the segment is blocked.
    pub severity: f64,
    /// When this store first learned of the incident.
    pub created_at: Timestamp,
    /// The incident is active while `now < expires_at`.
    pub expires_at: Timestamp,
}

impl Incident {
    #[inline]
    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// The transferable part of this incident.
    #[inline]
    pub fn fact(&self) -> IncidentFact {
        IncidentFact {
            segment:    self.segment,
            severity:   self.severity,
            expires_at: self.expires_at,
        }
    }
}

/// A remotely observed incident: what gossip carries between peers.
///
/// Expiry is absolute so a fact means the same thing no matter how late it
/// arrives.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct IncidentFact {
    pub segment:    Segment,
    pub severity:   f64,
    pub expires_at: Timestamp,
}
