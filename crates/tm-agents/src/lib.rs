//! `tm-agents` — the concurrent participants of a traffic simulation.
//!
//! # Crate layout
//!
//! | Module           | Contents                                                  |
//! |------------------|-----------------------------------------------------------|
//! | [`city`]         | `City`: state shared by every task                        |
//! | [`board`]        | `PositionBoard`: who stands on which node                 |
//! | [`observer`]     | `TrafficObserver` metrics hooks, `NoopObserver`           |
//! | [`intersection`] | `IntersectionController` state machine, `IntersectionAgent` task |
//! | [`vehicle`]      | `VehicleAgent` control loop (ordinary and emergency)      |
//! | [`incident`]     | `IncidentSource` roadblock generator                      |
//! | [`error`]        | `ControlError`, `ControlResult<T>`                        |
//!
//! # Concurrency
//!
//! Every vehicle and every intersection runs as its own tokio task and talks
//! to others only through `tm-protocol` messages with explicit deadlines.
//! The shared pieces (occupancy, the infrastructure incident store and the
//! position board) are internally synchronized and checked at commit time,
//! so two agents racing for the same node or grant resolve without any
//! global ordering.

pub mod board;
pub mod city;
pub mod error;
pub mod incident;
pub mod intersection;
pub mod observer;
pub mod vehicle;

#[cfg(test)]
mod tests;

pub use board::{BoardEntry, MoveConflict, PositionBoard};
pub use city::City;
pub use error::{ControlError, ControlResult};
pub use incident::IncidentSource;
pub use intersection::{IntersectionAgent, IntersectionController, Phase};
pub use observer::{NoopObserver, TrafficObserver};
pub use vehicle::{AgentState, EmergencyPhase, VehicleAgent};
