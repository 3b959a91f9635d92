//! Decoder for DWD RADOLAN radar composites.
//!
//! RADOLAN composites are published as bz2-compressed files holding an
//! ASCII header followed by a raw grid of cells. This crate decompresses
//! the file, parses the header and converts every cell to physical units.
//!
//! # Cell encodings
//!
//! - Precipitation products (RW, SF, ...) store little-endian `u16` cells.
//!   The low 12 bits hold the value, scaled by the header precision; flag
//!   bits mark negative, no-data and clutter cells.
//! - Reflectivity products (RX, EX, WX) store one byte per cell in half
//!   dBZ steps starting at -32.5 dBZ.
//!
//! No-data and clutter cells decode to `None`.
//!
//! # Example
//!
//! ```ignore
//! let composite = radolan_parser::decode(&bytes)?;
//! println!("{} {}x{}", composite.header.product, composite.rows(), composite.cols());
//! ```

pub mod decode;
pub mod error;
pub mod header;

pub use decode::{decode, decode_uncompressed, decompress, CellEncoding, Composite, CompositeGrid};
pub use error::{RadolanError, Result};
pub use header::{CompositeHeader, ETX};
