//! Message kinds exchanged between vehicles, intersections and the incident
//! source.
//!
//! | kind               | payload          | sender → receiver                  |
//! |--------------------|------------------|------------------------------------|
//! | `passage_request`  | [`MoveRequest`]  | vehicle → intersection             |
//! | `priority_request` | [`MoveRequest`]  | emergency vehicle → intersection   |
//! | `passage_reply`    | [`Reply`]        | intersection → vehicle             |
//! | `incident_gossip`  | `GossipEnvelope` | incident source / any vehicle → peers |

use std::fmt;

use serde::{Deserialize, Serialize};

use tm_core::GridPos;
use tm_events::GossipEnvelope;

/// Correlates a reply with the request it answers.  Unique per sender.
pub type RequestId = u64;

// ── Message ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    PassageRequest(MoveRequest),
    PriorityRequest(MoveRequest),
    PassageReply(Reply),
    IncidentGossip(GossipEnvelope),
}

impl Message {
    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PassageRequest(_)  => "passage_request",
            Message::PriorityRequest(_) => "priority_request",
            Message::PassageReply(_)    => "passage_reply",
            Message::IncidentGossip(_)  => "incident_gossip",
        }
    }
}

// ── MoveRequest ───────────────────────────────────────────────────────────────

/// A request to move along the segment `from → to` into the node guarded by
/// the receiving intersection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub request_id: RequestId,
    pub from:       GridPos,
    pub to:         GridPos,
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// Why an intersection granted or denied a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyReason {
    /// Passage was judged against the current phase (granted or not).
    PhaseCheck,
    /// The segment carries an incident at or above the block threshold.
    BlockedByIncident,
    /// The move is not a single axis-aligned step.
    UnknownDirection,
    /// Priority override for an emergency vehicle.
    Emergency,
    /// The request frame could not be decoded.
    InvalidBody,
}

impl ReplyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyReason::PhaseCheck        => "phase_check",
            ReplyReason::BlockedByIncident => "blocked_by_incident",
            ReplyReason::UnknownDirection  => "unknown_direction",
            ReplyReason::Emergency         => "emergency",
            ReplyReason::InvalidBody       => "invalid_body",
        }
    }
}

impl fmt::Display for ReplyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract-Net answer to a [`MoveRequest`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub request_id: RequestId,
    pub granted:    bool,
    pub reason:     ReplyReason,
}

impl Reply {
    pub fn grant(request_id: RequestId, reason: ReplyReason) -> Self {
        Self { request_id, granted: true, reason }
    }

    pub fn deny(request_id: RequestId, reason: ReplyReason) -> Self {
        Self { request_id, granted: false, reason }
    }

    /// Contract-Net performative: `accept-proposal` or `reject-proposal`.
    pub fn performative(&self) -> &'static str {
        if self.granted { "accept-proposal" } else { "reject-proposal" }
    }
}
