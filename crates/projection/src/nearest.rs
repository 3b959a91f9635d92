//! Nearest-cell search on a projected grid.
//!
//! Distance is the Chebyshev distance in degree space,
//! `max(|Δlat|, |Δlon|)`. RADOLAN cells are close to uniform in the
//! projected plane, which keeps this cheap metric adequate for picking the
//! cell under a point; it is not a geodesic distance.

use crate::error::{ProjectionError, Result};
use crate::grid::ProjectedGrid;

/// Find the `(row, col)` of the cell closest to the target coordinate.
///
/// Ties resolve to the first cell in row-major order (lowest row, then
/// lowest column).
pub fn locate(grid: &ProjectedGrid, target_lat: f64, target_lon: f64) -> Result<(usize, usize)> {
    if grid.rows() == 0 || grid.cols() == 0 {
        return Err(ProjectionError::EmptyGrid);
    }

    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;

    for (idx, cell) in grid.coords().iter().enumerate() {
        let dist = (cell.lat - target_lat).abs().max((cell.lon - target_lon).abs());
        if dist < best_dist {
            best_dist = dist;
            best_idx = idx;
        }
    }

    Ok((best_idx / grid.cols(), best_idx % grid.cols()))
}
