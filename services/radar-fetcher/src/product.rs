//! Monitored products and the target location.

use radolan_parser::CellEncoding;
use serde::{Deserialize, Serialize};

/// Geographic point whose nearest composite cell is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Static description of a RADOLAN product code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductKind {
    pub code: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub interval_minutes: u32,
}

const KNOWN_PRODUCTS: &[ProductKind] = &[
    ProductKind {
        code: "rw",
        description: "Radolan RW 1h",
        unit: "mm",
        interval_minutes: 60,
    },
    ProductKind {
        code: "sf",
        description: "Radolan SF 24h",
        unit: "mm",
        interval_minutes: 1440,
    },
    ProductKind {
        code: "sq",
        description: "Radolan SQ 6h",
        unit: "mm",
        interval_minutes: 360,
    },
    ProductKind {
        code: "ry",
        description: "Radolan RY 5min",
        unit: "mm",
        interval_minutes: 5,
    },
    ProductKind {
        code: "rx",
        description: "Radolan RX reflectivity",
        unit: "dBZ",
        interval_minutes: 5,
    },
    ProductKind {
        code: "wx",
        description: "Radolan WX reflectivity",
        unit: "dBZ",
        interval_minutes: 5,
    },
    ProductKind {
        code: "ex",
        description: "Radolan EX reflectivity",
        unit: "dBZ",
        interval_minutes: 5,
    },
];

impl ProductKind {
    /// Look up a product code (case-insensitive).
    pub fn lookup(code: &str) -> Option<&'static ProductKind> {
        KNOWN_PRODUCTS
            .iter()
            .find(|kind| kind.code.eq_ignore_ascii_case(code))
    }
}

/// One monitored product.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarProduct {
    /// Lower-case product code as used in download URLs
    pub code: String,
    /// Display name
    pub name: String,
    pub location: Location,
}

impl RadarProduct {
    /// Create a product; `name` defaults to the known description of the code.
    pub fn new(code: &str, name: Option<String>, location: Location) -> Self {
        let code = code.to_ascii_lowercase();
        let name = name.unwrap_or_else(|| match ProductKind::lookup(&code) {
            Some(kind) => kind.description.to_string(),
            None => format!("Radolan {}", code.to_ascii_uppercase()),
        });

        Self {
            code,
            name,
            location,
        }
    }

    pub fn kind(&self) -> Option<&'static ProductKind> {
        ProductKind::lookup(&self.code)
    }

    /// Physical unit of decoded values.
    pub fn unit(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.unit,
            None => match self.encoding() {
                CellEncoding::Byte => "dBZ",
                CellEncoding::Word => "mm",
            },
        }
    }

    pub fn encoding(&self) -> CellEncoding {
        CellEncoding::for_product(&self.code)
    }

}

/// Name of the "latest" composite file for a product code.
pub fn latest_file_name(code: &str) -> String {
    format!("raa01-{}_10000-latest-dwd---bin.bz2", code)
}
