//! `tm-events` — incident records, the per-segment incident store, and the
//! gossip payload used to propagate incidents between peers.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                 |
//! |--------------|----------------------------------------------------------|
//! | [`incident`] | `Incident`, `IncidentFact`                               |
//! | [`store`]    | `EventStore`, `IncidentSnapshot`, `MergeOutcome`         |
//! | [`gossip`]   | `GossipEnvelope` — a fact plus a hop budget              |
//! | [`error`]    | `EventError`, `EventResult<T>`                           |
//!
//! # Consistency model
//!
//! Every query sweeps expired incidents first, so callers always see a live
//! view without manual cleanup.  Remote facts carry an absolute expiry and
//! are merged with max-wins on both severity and expiry, which makes merges
//! idempotent and commutative: peers converge regardless of the order or
//! delay in which gossip reaches them.

pub mod error;
pub mod gossip;
pub mod incident;
pub mod store;


pub use error::{EventError, EventResult};
pub use gossip::{GossipEnvelope, DEFAULT_HOP_TTL};
pub use incident::{Incident, IncidentFact};
pub use store::{EventStore, IncidentSnapshot, MergeOutcome, DEFAULT_BLOCK_THRESHOLD};
