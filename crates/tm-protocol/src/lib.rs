//! `tm-protocol` — the messages peers exchange and the transport they use.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                     |
//! |---------------|--------------------------------------------------------------|
//! | [`message`]   | `Message` sum type, `MoveRequest`, `Reply`, `ReplyReason`    |
//! | [`address`]   | `PeerAddress`                                                |
//! | [`codec`]     | `Envelope`, JSON `encode` / `decode`                         |
//! | [`transport`] | `Switchboard` (peer registry), `Mailbox`, `Endpoint`         |
//! | [`error`]     | `ProtocolError`, `SendError`, `RecvError`                    |
//!
//! # Wire format
//!
//! Every frame is one JSON object: the sender's address plus a message
//! tagged by `kind`:
//!
//! ```json
//! {"from":{"vehicle":3},"message":{"kind":"passage_request","requestId":7,"from":[4,4],"to":[4,5]}}
//! ```
//!
//! Frames are decoded at the receiving mailbox.  A frame that does not match
//! the schema of its kind is reported as [`RecvError::Malformed`] and never
//! reaches agent logic as a half-parsed value.

pub mod address;
pub mod codec;
pub mod error;
pub mod message;
pub mod transport;


pub use address::PeerAddress;
pub use codec::{decode, encode, Envelope};
pub use error::{ProtocolError, ProtocolResult, RecvError, SendError};
pub use message::{Message, MoveRequest, Reply, ReplyReason, RequestId};
pub use transport::{Endpoint, Mailbox, Switchboard};
