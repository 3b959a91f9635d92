//! Projected (lat/lon) grids and the shared grid cache.
//!
//! Computing the geographic position of every composite cell costs one
//! inverse projection per cell (810k for the national grid), so grids are
//! cached per dimensions and only rebuilt once they are older than the
//! configured maximum age.
//!
//! Cached grids are immutable `Arc` snapshots. A refresh builds the new grid
//! outside the cache lock and swaps it in under the write lock, so readers
//! only ever hold a complete old grid or a complete new one. Builds are
//! serialized per dimensions: concurrent misses wait for the first builder
//! and reuse its grid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info};

use crate::error::{ProjectionError, Result};
use crate::stereographic::{GridLayout, RadolanStereographic};

/// Grids older than this are recomputed on the next request.
pub const DEFAULT_MAX_GRID_AGE_HOURS: i64 = 24;

/// Geographic position of a grid cell, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Geographic coordinates of every cell of a composite grid.
///
/// Stored row-major; row 0 is the southernmost row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGrid {
    rows: usize,
    cols: usize,
    coords: Vec<LatLon>,
    computed_at: DateTime<Utc>,
}

impl ProjectedGrid {
    /// Build a grid from explicit row-major coordinates.
    pub fn from_coords(
        rows: usize,
        cols: usize,
        coords: Vec<LatLon>,
        computed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let expected = rows * cols;
        if coords.len() != expected {
            return Err(ProjectionError::SizeMismatch {
                expected,
                actual: coords.len(),
            });
        }

        Ok(Self {
            rows,
            cols,
            coords,
            computed_at,
        })
    }

    /// Project every cell of a RADOLAN grid with the given dimensions.
    pub fn compute(
        proj: &RadolanStereographic,
        rows: usize,
        cols: usize,
        computed_at: DateTime<Utc>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(ProjectionError::InvalidGeometry { rows, cols });
        }

        let layout = GridLayout::for_dimensions(rows, cols);
        let (x0, y0) = layout.origin(proj);

        let mut coords = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let y = y0 + row as f64 * layout.res;
            for col in 0..cols {
                let x = x0 + col as f64 * layout.res;
                let (lat, lon) = proj.xy_to_geo(x, y);
                coords.push(LatLon { lat, lon });
            }
        }

        Ok(Self {
            rows,
            cols,
            coords,
            computed_at,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Grid dimensions as (rows, cols).
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// When this grid was computed.
    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Coordinate of cell `(row, col)`, or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<LatLon> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.coords.get(row * self.cols + col).copied()
    }

    /// Row-major coordinate slice.
    pub fn coords(&self) -> &[LatLon] {
        &self.coords
    }

    /// Whether the grid is older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.computed_at) > max_age
    }
}

/// Shared, lazily refreshed cache of projected grids keyed by dimensions.
///
/// One instance is meant to be shared (`Arc<GridProjector>`) by every
/// product tracker in the process; grids depend only on the composite
/// geometry, never on the target coordinate.
pub struct GridProjector {
    projection: RadolanStereographic,
    max_age: Duration,
    grids: RwLock<HashMap<(usize, usize), Arc<ProjectedGrid>>>,
    builds: Mutex<HashMap<(usize, usize), Arc<Mutex<()>>>>,
    recomputations: AtomicU64,
}

impl Default for GridProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl GridProjector {
    /// Create a projector with the RADOLAN projection and a 24 hour grid age.
    pub fn new() -> Self {
        Self::with_max_age(Duration::hours(DEFAULT_MAX_GRID_AGE_HOURS))
    }

    /// Create a projector that recomputes grids older than `max_age`.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            projection: RadolanStereographic::radolan(),
            max_age,
            grids: RwLock::new(HashMap::new()),
            builds: Mutex::new(HashMap::new()),
            recomputations: AtomicU64::new(0),
        }
    }

    /// Get the projected grid for the given dimensions.
    ///
    /// Returns the cached grid when it exists and is no older than the
    /// maximum age at `now`; otherwise computes a new one and replaces the
    /// cache entry.
    pub fn get_grid(&self, rows: usize, cols: usize, now: DateTime<Utc>) -> Result<Arc<ProjectedGrid>> {
        if rows == 0 || cols == 0 {
            return Err(ProjectionError::InvalidGeometry { rows, cols });
        }

        let key = (rows, cols);

        if let Some(grid) = self.fresh_cached(key, now) {
            debug!(rows, cols, "Projected grid cache hit");
            return Ok(grid);
        }

        let build_lock = self.build_lock(key);
        let _building = build_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have built the grid while we waited.
        if let Some(grid) = self.fresh_cached(key, now) {
            debug!(rows, cols, "Projected grid built by concurrent caller");
            return Ok(grid);
        }

        if let Some(stale) = self.cached(key) {
            info!(
                rows,
                cols,
                computed_at = %stale.computed_at(),
                "Projected grid is stale, recomputing"
            );
        }

        let fresh = Arc::new(ProjectedGrid::compute(&self.projection, rows, cols, now)?);
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        counter!("radolan_grid_recomputations_total").increment(1);

        self.grids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&fresh));
        info!(rows, cols, "Projected grid computed");

        Ok(fresh)
    }

    /// Number of grid computations performed so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    fn fresh_cached(&self, key: (usize, usize), now: DateTime<Utc>) -> Option<Arc<ProjectedGrid>> {
        self.cached(key).filter(|grid| !grid.is_stale(now, self.max_age))
    }

    fn build_lock(&self, key: (usize, usize)) -> Arc<Mutex<()>> {
        let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(builds.entry(key).or_default())
    }

    fn cached(&self, key: (usize, usize)) -> Option<Arc<ProjectedGrid>> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}
