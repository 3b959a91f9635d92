//! RADOLAN point fetcher.
//!
//! Periodically downloads DWD RADOLAN composites, decodes them and reports
//! the value of the cell nearest a fixed location, one tracker per product.
//!
//! - [`fetch`]: conditional (ETag) download of the latest composite
//! - [`tracker`]: the per-product update cycle and its cache
//! - [`scheduler`]: runs all trackers on an interval
//! - [`server`]: status API
//! - [`config`]: YAML configuration

pub mod config;
pub mod fetch;
pub mod product;
pub mod scheduler;
pub mod server;
pub mod tracker;

pub use config::{FetcherConfig, ProductConfig};
pub use fetch::{CompositeSource, FetchFailure, FetchOutcome, HttpCompositeSource, DEFAULT_BASE_URL};
pub use product::{Location, RadarProduct};
pub use scheduler::{CycleError, CycleReport, Scheduler};
pub use server::{create_router, run_server, ServerState};
pub use tracker::{
    CycleOutcome, Measurement, ProductTracker, TrackerPhase, TrackerSnapshot, UpdateError,
};
