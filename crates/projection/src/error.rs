//! Error types for grid projection and lookup.

use thiserror::Error;

/// Errors raised while building or searching a projected grid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// Grid dimensions that cannot describe a composite.
    #[error("invalid grid geometry: {rows} rows x {cols} cols")]
    InvalidGeometry { rows: usize, cols: usize },

    /// Nearest-cell search on a grid without cells.
    #[error("cannot locate a point on an empty grid")]
    EmptyGrid,

    /// Coordinate buffer does not match the declared dimensions.
    #[error("grid holds {actual} coordinates, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
