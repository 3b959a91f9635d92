//! Builder for synthetic RADOLAN composites.
//!
//! Produces files with the same layout DWD publishes: an ASCII header
//! terminated by ETX, followed by row-major cell data (row 0 south), the
//! whole thing optionally bz2-compressed.
//!
//! # Example
//!
//! ```
//! use test_utils::CompositeBuilder;
//!
//! let bytes = CompositeBuilder::new("RW", 3, 3)
//!     .set(1, 1, Some(4.2))
//!     .build();
//! assert!(!bytes.is_empty());
//! ```

use std::io::Write;

use bzip2::write::BzEncoder;
use bzip2::Compression;

/// Header terminator.
pub const ETX: u8 = 0x03;

/// Raw 2-byte cell marked as "no data".
pub const WORD_NO_DATA: u16 = 0x29C4;

/// Raw 1-byte cell marked as "no data".
pub const BYTE_NO_DATA: u8 = 250;

/// Builder for synthetic composite files.
#[derive(Debug, Clone)]
pub struct CompositeBuilder {
    product: String,
    rows: usize,
    cols: usize,
    timestamp: (u32, u32, u32, u32, u32),
    precision_exponent: i32,
    interval_minutes: u32,
    sites: Vec<String>,
    values: Vec<Option<f32>>,
    raw_data: Option<Vec<u8>>,
    declared_length: Option<usize>,
}

impl CompositeBuilder {
    /// Start a composite of the given product with every cell set to 0.0.
    pub fn new(product: &str, rows: usize, cols: usize) -> Self {
        let product = product.to_uppercase();
        let interval_minutes = match product.as_str() {
            "SF" => 1440,
            "RX" | "EX" | "WX" => 5,
            _ => 60,
        };

        Self {
            product,
            rows,
            cols,
            timestamp: (2024, 5, 7, 22, 50),
            precision_exponent: -1,
            interval_minutes,
            sites: vec!["boo".to_string(), "ros".to_string(), "umd".to_string()],
            values: vec![Some(0.0); rows * cols],
            raw_data: None,
            declared_length: None,
        }
    }

    /// Set the product timestamp (UTC).
    pub fn timestamp(mut self, year: u32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        self.timestamp = (year, month, day, hour, minute);
        self
    }

    /// Set the precision exponent written as `PR E{exp}`.
    pub fn precision_exponent(mut self, exp: i32) -> Self {
        self.precision_exponent = exp;
        self
    }

    pub fn interval_minutes(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes;
        self
    }

    /// Set the radar site list written in the `MS` token.
    pub fn sites(mut self, sites: &[&str]) -> Self {
        self.sites = sites.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace all cell values (row-major, row 0 south).
    pub fn values(mut self, values: Vec<Option<f32>>) -> Self {
        assert_eq!(
            values.len(),
            self.rows * self.cols,
            "value count must match {}x{}",
            self.rows,
            self.cols
        );
        self.values = values;
        self
    }

    /// Set a single cell.
    pub fn set(mut self, row: usize, col: usize, value: Option<f32>) -> Self {
        self.values[row * self.cols + col] = value;
        self
    }

    /// Write these bytes as the data section instead of encoding the values.
    pub fn raw_data(mut self, data: Vec<u8>) -> Self {
        self.raw_data = Some(data);
        self
    }

    /// Override the `BY` product length.
    pub fn declared_length(mut self, len: usize) -> Self {
        self.declared_length = Some(len);
        self
    }

    /// Whether the product stores one byte per cell.
    pub fn is_byte_product(&self) -> bool {
        matches!(self.product.as_str(), "RX" | "EX" | "WX")
    }

    /// Encode the cell values into the product's data layout.
    pub fn encode_cells(&self) -> Vec<u8> {
        if self.is_byte_product() {
            return self
                .values
                .iter()
                .map(|value| match value {
                    None => BYTE_NO_DATA,
                    Some(v) => {
                        let raw = ((v + 32.5) * 2.0).round();
                        assert!((0.0..249.0).contains(&raw), "{} dBZ is not encodable", v);
                        raw as u8
                    }
                })
                .collect();
        }

        let precision = 10f32.powi(self.precision_exponent);
        let mut data = Vec::with_capacity(self.values.len() * 2);
        for value in &self.values {
            let raw = match value {
                None => WORD_NO_DATA,
                Some(v) => {
                    let magnitude = (v.abs() / precision).round();
                    assert!(magnitude <= 4095.0, "{} does not fit in 12 bits", v);
                    let mut raw = magnitude as u16;
                    if *v < 0.0 {
                        raw |= 0x4000;
                    }
                    raw
                }
            };
            data.extend_from_slice(&raw.to_le_bytes());
        }
        data
    }

    /// Header text (without ETX) for a data section of `data_len` bytes.
    pub fn header(&self, data_len: usize) -> String {
        let (year, month, day, hour, minute) = self.timestamp;
        let prefix = format!(
            "{}{:02}{:02}{:02}10000{:02}{:02}",
            self.product,
            day,
            hour,
            minute,
            month,
            year % 100
        );

        let sites = format!("<{}>", self.sites.join(","));
        let tail = format!(
            "VS 3SW   2.28.0PR E{:+03}INT{:>4}GP{:>4}x{:>4}MS{:>3}{}",
            self.precision_exponent,
            self.interval_minutes,
            self.rows,
            self.cols,
            sites.len(),
            sites
        );

        // prefix + "BY" + 7 digits + tail + ETX + data
        let total = prefix.len() + 2 + 7 + tail.len() + 1 + data_len;
        let declared = self.declared_length.unwrap_or(total);

        format!("{}BY{:>7}{}", prefix, declared, tail)
    }

    /// Build the uncompressed composite bytes.
    pub fn build_uncompressed(&self) -> Vec<u8> {
        let data = self.raw_data.clone().unwrap_or_else(|| self.encode_cells());
        let header = self.header(data.len());

        let mut out = Vec::with_capacity(header.len() + 1 + data.len());
        out.extend_from_slice(header.as_bytes());
        out.push(ETX);
        out.extend_from_slice(&data);
        out
    }

    /// Build the bz2-compressed composite bytes, as served by DWD.
    pub fn build(&self) -> Vec<u8> {
        compress_bz2(&self.build_uncompressed())
    }
}

/// Compress bytes into a single bz2 stream.
pub fn compress_bz2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .expect("writing to an in-memory bz2 encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory bz2 encoder cannot fail")
}
