//! `tm-core` — foundational types for the `rust_tm` traffic coordination engine.
//!
//! This crate is a dependency of every other `tm-*` crate.  It has no `tm-*`
//! dependencies and few external ones (`rand`, `thiserror`, `tokio`'s clock,
//! plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                   |
//! |-------------|------------------------------------------------------------|
//! | [`ids`]     | `AgentId`                                                  |
//! | [`geo`]     | `GridPos` (node), `Segment`, `Direction`, Manhattan helpers |
//! | [`time`]    | `Timestamp`, `SimClock`                                    |
//! | [`rng`]     | `AgentRng` (per-agent), `SimRng` (global)                  |
//! | [`kind`]    | `VehicleKind` enum                                         |
//! | [`config`]  | `SimConfig` and its sub-configs, `AgentProfile`            |
//! | [`error`]   | `CoreError`, `CoreResult`                                  |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |
//!           | Required by `tm-protocol` and config file loading.         |

pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod kind;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{
    AgentProfile, IncidentConfig, IntersectionConfig, OccupancyConfig, SimConfig,
};
pub use error::{CoreError, CoreResult};
pub use geo::{Direction, GridPos, Segment};
pub use ids::AgentId;
pub use kind::VehicleKind;
pub use rng::{AgentRng, SimRng};
pub use time::{SimClock, Timestamp};
