//! Actor-based monitoring pipeline
//!
//! Each component runs as an independent tokio task. Cross-task state only
//! travels as immutable records over the two bounded buses.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌────────────┐
//!                  │ Controller │
//!                  └─────┬──────┘
//!                        │ spawns, stops via ActiveSwitch
//!        ┌───────────────┼──────────────────┐
//!        │               │                  │
//!  ┌─────▼──────┐  ┌─────▼──────┐   ┌───────▼──────┐
//!  │ Sampler ×N │  │ Aggregator │   │ AlertHandler │
//!  └──┬──────┬──┘  └─────▲──────┘   └───────▲──────┘
//!     │      │           │                  │
//!     │      └───────────┘ Metric Bus       │
//!     │                                     │
//!     └─────────────────────────────────────┘ Alert Bus
//! ```
//!
//! ## Actor Types
//!
//! - **SamplerActor**: one per collector; measures, publishes, evaluates thresholds
//! - **AggregatorActor**: owns the retention windows and writes snapshots
//! - **AlertActor**: logs alerts by severity and appends them to the alert log
//!
//! ## Communication Patterns
//!
//! 1. **Records**: samplers publish with `try_publish`; a full bus drops the record
//! 2. **Commands**: consumer actors answer read-only queries over mpsc + oneshot
//! 3. **Stop flag**: a watch channel every loop checks at the top of each iteration

pub mod active;
pub mod aggregator;
pub mod alert;
pub mod bus;
pub mod controller;
pub mod messages;
pub mod sampler;

pub use controller::{Controller, LifecycleState};
