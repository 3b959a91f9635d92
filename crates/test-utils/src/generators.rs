//! Cell value generators for synthetic composites.
//!
//! These generators create predictable, verifiable value patterns
//! that can be used across the test suite.

/// Creates cell values that encode their own position.
///
/// Each cell value is `(row * cols + col) * step`, so a decoded value
/// identifies the cell it came from.
///
/// # Returns
///
/// A row-major `Vec<Option<f32>>` (row 0 first), every cell present.
///
/// # Example
///
/// ```
/// use test_utils::create_index_values;
///
/// let values = create_index_values(3, 3, 0.1);
/// assert_eq!(values.len(), 9);
/// assert_eq!(values[0], Some(0.0));
/// assert!((values[4].unwrap() - 0.4).abs() < 1e-6); // row 1, col 1
/// ```
pub fn create_index_values(rows: usize, cols: usize, step: f32) -> Vec<Option<f32>> {
    (0..rows * cols).map(|idx| Some(idx as f32 * step)).collect()
}

/// Creates index values with every cell on the grid border marked as no data.
///
/// Mirrors real composites, whose edges lie outside radar coverage.
pub fn create_masked_border_values(rows: usize, cols: usize, step: f32) -> Vec<Option<f32>> {
    let mut values = create_index_values(rows, cols, step);
    for row in 0..rows {
        for col in 0..cols {
            if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
                values[row * cols + col] = None;
            }
        }
    }
    values
}

/// Serialises raw 2-byte cells in little-endian order.
pub fn words_to_le_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
