//! Coordinate handling for the RADOLAN composite grid.
//!
//! Implements the fixed DWD polar stereographic projection from scratch,
//! a shared cache of projected (lat/lon) grids, and the nearest-cell search
//! used to pick a single value out of a composite.

pub mod error;
pub mod grid;
pub mod nearest;
pub mod stereographic;

pub use error::{ProjectionError, Result};
pub use grid::{GridProjector, LatLon, ProjectedGrid, DEFAULT_MAX_GRID_AGE_HOURS};
pub use nearest::locate;
pub use stereographic::{GridLayout, RadolanStereographic};
