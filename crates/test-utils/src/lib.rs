//! Shared test utilities for the radolan-point workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A builder for synthetic RADOLAN composites (raw and bz2-compressed)
//! - Cell value generators with predictable patterns
//! - Common fixtures (locations, product codes, header samples)
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{CompositeBuilder, assert_approx_eq};
//! ```

pub mod composite;
pub mod fixtures;
pub mod generators;

pub use composite::{compress_bz2, CompositeBuilder};
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of a decoded cell that must carry a value.
///
/// Fails if the cell is `None` (no data) or differs by more than epsilon.
///
/// ```ignore
/// use test_utils::assert_cell_eq;
///
/// assert_cell_eq!(Some(0.5_f32), 0.5, 1e-6);
/// ```
#[macro_export]
macro_rules! assert_cell_eq {
    ($cell:expr, $expected:expr, $epsilon:expr) => {{
        match $cell {
            Some(value) => $crate::assert_approx_eq!(value, $expected, $epsilon),
            None => panic!(
                "assertion failed: expected cell value {:?}, got no data",
                $expected
            ),
        }
    }};
}
