//! Protocol and transport error types.

use thiserror::Error;

use crate::PeerAddress;

/// Delivery failure on the sending side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("no peer registered as {0}")]
    UnknownPeer(PeerAddress),

    #[error("mailbox of {0} is closed")]
    Disconnected(PeerAddress),
}

/// Failure while waiting for the next frame.
#[derive(Debug, Error)]
pub enum RecvError {
    #[error("no message within the deadline")]
    Timeout,

    /// Returned by non-blocking receives only.
    #[error("mailbox is empty")]
    Empty,

    #[error("mailbox is closed")]
    Closed,

    /// The frame did not decode.  `from` is set when at least the sender
    /// address could be read, so the receiver can answer it.
    #[error("malformed frame from {}: {source}", sender_label(.from))]
    Malformed {
        from: Option<PeerAddress>,
        #[source]
        source: serde_json::Error,
    },
}

fn sender_label(from: &Option<PeerAddress>) -> String {
    from.as_ref().map_or_else(|| "unknown peer".to_string(), ToString::to_string)
}

/// Errors produced by `tm-protocol`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
