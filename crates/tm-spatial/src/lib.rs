//! `tm-spatial` — road network, occupancy tracking, and routing.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                      |
//! |---------------|---------------------------------------------------------------|
//! | [`network`]   | `RoadNetwork` (CSR + R-tree), `RoadNetworkBuilder`            |
//! | [`occupancy`] | `OccupancyTracker`, `OccupancySnapshot`                       |
//! | [`router`]    | `Router` trait, `Route`, `RouteMode`, `RoutingView`, `AStarRouter` |
//! | [`error`]     | `SpatialError`, `SpatialResult<T>`                            |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on `Route` and `RouteMode`. |

pub mod error;
pub mod network;
pub mod occupancy;
pub mod router;


pub use error::{SpatialError, SpatialResult};
pub use network::{RoadNetwork, RoadNetworkBuilder};
pub use occupancy::{OccupancySnapshot, OccupancyTracker};
pub use router::{AStarRouter, Route, RouteMode, Router, RoutingView};
