//! Hop-bounded gossip payload.

use crate::IncidentFact;

/// Default hop budget of a freshly broadcast fact.
pub const DEFAULT_HOP_TTL: u8 = 4;

/// An incident fact travelling between peers.
///
/// Each forward decrements `hop_ttl`; a payload arriving with `hop_ttl == 0`
/// is merged but not forwarded, which bounds propagation depth and
/// guarantees termination.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GossipEnvelope {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub fact:    IncidentFact,
    pub hop_ttl: u8,
}

impl GossipEnvelope {
    #[inline]
    pub fn new(fact: IncidentFact, hop_ttl: u8) -> Self {
        Self { fact, hop_ttl }
    }

    /// A fresh broadcast with the default hop budget.
    #[inline]
    pub fn origin(fact: IncidentFact) -> Self {
        Self::new(fact, DEFAULT_HOP_TTL)
    }

    /// The payload to pass on, or `None` once the hop budget is spent.
    #[inline]
    pub fn forwarded(self) -> Option<Self> {
        self.hop_ttl
            .checked_sub(1)
            .map(|hop_ttl| Self { fact: self.fact, hop_ttl })
    }
}
