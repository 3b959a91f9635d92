//! Composite decompression and cell decoding.

use std::io::Read;

use bzip2::read::BzDecoder;
use tracing::{debug, warn};

use crate::error::{RadolanError, Result};
use crate::header::CompositeHeader;

// 2-byte cell layout
const WORD_VALUE_MASK: u16 = 0x0FFF;
// 0x1000 marks secondary cells; their value is kept
const WORD_NO_DATA: u16 = 0x2000;
const WORD_NEGATIVE: u16 = 0x4000;
const WORD_CLUTTER: u16 = 0x8000;

// 1-byte cell layout
const BYTE_CLUTTER: u8 = 249;
const BYTE_NO_DATA: u8 = 250;

/// How cells are stored in the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEncoding {
    /// Little-endian u16 with flag bits, scaled by the header precision
    Word,
    /// u8 reflectivity in half dBZ steps from -32.5 dBZ
    Byte,
}

impl CellEncoding {
    /// Encoding used by a product id (case-insensitive).
    pub fn for_product(product: &str) -> Self {
        match product.to_ascii_uppercase().as_str() {
            "RX" | "EX" | "WX" => CellEncoding::Byte,
            _ => CellEncoding::Word,
        }
    }

    pub fn bytes_per_cell(self) -> usize {
        match self {
            CellEncoding::Word => 2,
            CellEncoding::Byte => 1,
        }
    }

    /// Decode one cell; `None` for no-data and clutter cells.
    fn decode_cell(self, raw: &[u8], precision: f32) -> Option<f32> {
        match self {
            CellEncoding::Word => {
                let word = u16::from_le_bytes([raw[0], raw[1]]);
                if word & (WORD_NO_DATA | WORD_CLUTTER) != 0 {
                    return None;
                }
                let value = (word & WORD_VALUE_MASK) as f32 * precision;
                if word & WORD_NEGATIVE != 0 {
                    Some(-value)
                } else {
                    Some(value)
                }
            }
            CellEncoding::Byte => match raw[0] {
                BYTE_NO_DATA | BYTE_CLUTTER => None,
                level => Some(level as f32 * 0.5 - 32.5),
            },
        }
    }
}

/// Decoded cell values in physical units.
///
/// Row-major with row 0 as the southernmost row, matching the
/// projected grid of the same dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeGrid {
    rows: usize,
    cols: usize,
    values: Vec<Option<f32>>,
}

impl CompositeGrid {
    pub fn new(rows: usize, cols: usize, values: Vec<Option<f32>>) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(RadolanError::corrupt(format!(
                "{} values for a {}x{} grid",
                values.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Cell value, `None` when the cell has no data or is out of range.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        if !self.contains(row, col) {
            return None;
        }
        self.values[row * self.cols + col]
    }

    pub fn values(&self) -> &[Option<f32>] {
        &self.values
    }

    /// Number of cells carrying a value.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// A decoded composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub header: CompositeHeader,
    pub grid: CompositeGrid,
}

impl Composite {
    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn encoding(&self) -> CellEncoding {
        CellEncoding::for_product(&self.header.product)
    }
}

/// Fully decompress a bz2 stream in memory.
pub fn decompress(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() {
        return Err(RadolanError::DecompressionError("empty payload".to_string()));
    }

    let mut data = Vec::with_capacity(raw.len() * 4);
    BzDecoder::new(raw)
        .read_to_end(&mut data)
        .map_err(|e| RadolanError::DecompressionError(e.to_string()))?;

    if data.is_empty() {
        return Err(RadolanError::DecompressionError(
            "stream decompressed to nothing".to_string(),
        ));
    }

    Ok(data)
}

/// Decode an already decompressed composite.
pub fn decode_uncompressed(data: &[u8]) -> Result<Composite> {
    let header = CompositeHeader::parse(data)?;

    if header.rows == 0 || header.cols == 0 {
        return Err(RadolanError::corrupt(format!(
            "empty grid {}x{}",
            header.rows, header.cols
        )));
    }

    if let Some(declared) = header.declared_length {
        if declared != data.len() {
            warn!(
                product = %header.product,
                declared = declared,
                actual = data.len(),
                "Composite length differs from header"
            );
        }
    }

    let encoding = CellEncoding::for_product(&header.product);
    let payload = &data[header.header_len..];
    let expected = header
        .rows
        .checked_mul(header.cols)
        .and_then(|cells| cells.checked_mul(encoding.bytes_per_cell()))
        .ok_or_else(|| RadolanError::corrupt("grid dimensions overflow"))?;

    if payload.len() != expected {
        return Err(RadolanError::corrupt(format!(
            "expected {} data bytes for {}x{} {:?} cells, found {}",
            expected,
            header.rows,
            header.cols,
            encoding,
            payload.len()
        )));
    }

    let values: Vec<Option<f32>> = payload
        .chunks_exact(encoding.bytes_per_cell())
        .map(|cell| encoding.decode_cell(cell, header.precision))
        .collect();

    let grid = CompositeGrid::new(header.rows, header.cols, values)?;

    debug!(
        product = %header.product,
        timestamp = %header.timestamp,
        rows = grid.rows(),
        cols = grid.cols(),
        valid_cells = grid.valid_count(),
        "Decoded composite"
    );

    Ok(Composite { header, grid })
}

/// Decompress and decode a composite as published (bz2).
pub fn decode(raw: &[u8]) -> Result<Composite> {
    let data = decompress(raw)?;
    decode_uncompressed(&data)
}
