//! JSON wire codec.

use serde::{Deserialize, Serialize};

use crate::{Message, PeerAddress, ProtocolError, ProtocolResult};

/// One frame on the wire: a message and who sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from:    PeerAddress,
    pub message: Message,
}

impl Envelope {
    pub fn new(from: PeerAddress, message: Message) -> Self {
        Self { from, message }
    }
}

/// Frame header read on its own when the full frame fails to decode.
#[derive(Deserialize)]
struct Header {
    from: PeerAddress,
}

pub fn encode(envelope: &Envelope) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
}

pub fn decode(frame: &[u8]) -> ProtocolResult<Envelope> {
    decode_json(frame).map_err(ProtocolError::Decode)
}

pub(crate) fn decode_json(frame: &[u8]) -> serde_json::Result<Envelope> {
    serde_json::from_slice(frame)
}

/// Best-effort sender of a frame that failed to decode.
pub(crate) fn sender_of(frame: &[u8]) -> Option<PeerAddress> {
    serde_json::from_slice::<Header>(frame).ok().map(|h| h.from)
}
