//! `tm-sim` — wires a city together and runs it.
//!
//! # Lifecycle
//!
//! ```text
//! SimBuilder::new(config)      validate config, build network + City
//!   .build()?                  place vehicles on distinct random nodes,
//!                              register every mailbox
//! Sim::run(duration).await     spawn intersections, vehicles, the
//!                              incident source and the congestion sampler;
//!                              after `duration` abort them all and
//!                              return the metrics summary
//! ```
//!
//! | Module      | Contents                                      |
//! |-------------|-----------------------------------------------|
//! | [`builder`] | `SimBuilder`                                  |
//! | [`sim`]     | `Sim`, the congestion sampler                 |
//! | [`metrics`] | `MetricsRecorder`, `MetricsSummary`           |
//! | [`error`]   | `SimError`, `SimResult<T>`                    |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tm_core::SimConfig;
//! use tm_sim::SimBuilder;
//!
//! let sim = SimBuilder::new(SimConfig::default()).build()?;
//! let summary = sim.run(Duration::from_secs(60)).await?;
//! ```

pub mod builder;
pub mod error;
pub mod metrics;
pub mod sim;


pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use metrics::{MetricsRecorder, MetricsSummary};
pub use sim::{sample_congestion, Sim};
