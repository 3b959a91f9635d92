//! RADOLAN polar stereographic projection.
//!
//! DWD composites live on a polar stereographic plane over a sphere:
//! - Earth radius: 6370.04 km
//! - True latitude: 60°N
//! - Central meridian: 10°E
//!
//! Plane coordinates are kilometres. Each composite size has a fixed
//! placement relative to the reference point 9°E / 51°N, so the geographic
//! position of every cell follows from the grid dimensions alone.

use std::f64::consts::PI;

/// Reference point used to anchor every RADOLAN grid (lat, lon in degrees).
pub const REFERENCE_POINT: (f64, f64) = (51.0, 9.0);

/// Spherical polar stereographic projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadolanStereographic {
    /// Sphere radius in kilometres
    pub earth_radius_km: f64,
    /// Latitude of true scale in radians
    pub lat_ts: f64,
    /// Central meridian in radians
    pub lon0: f64,
}

impl Default for RadolanStereographic {
    fn default() -> Self {
        Self::radolan()
    }
}

impl RadolanStereographic {
    /// DWD RADOLAN projection constants.
    pub fn radolan() -> Self {
        Self {
            earth_radius_km: 6370.04,
            lat_ts: 60.0_f64.to_radians(),
            lon0: 10.0_f64.to_radians(),
        }
    }

    /// Convert geographic coordinates (degrees) to plane coordinates (km).
    ///
    /// Returns (x, y). y is negative over the whole composite domain.
    pub fn geo_to_xy(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let dlon = lon_deg.to_radians() - self.lon0;

        let scale = (1.0 + self.lat_ts.sin()) / (1.0 + lat.sin());
        let rho = self.earth_radius_km * scale * lat.cos();

        (rho * dlon.sin(), -rho * dlon.cos())
    }

    /// Convert plane coordinates (km) to geographic coordinates (degrees).
    ///
    /// Returns (lat, lon).
    pub fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let k = (self.earth_radius_km * (1.0 + self.lat_ts.sin())).powi(2);
        let r2 = x * x + y * y;

        let lat = ((k - r2) / (k + r2)).asin();
        let mut lon = x.atan2(-y) + self.lon0;
        if lon > PI {
            lon -= 2.0 * PI;
        } else if lon < -PI {
            lon += 2.0 * PI;
        }

        (lat.to_degrees(), lon.to_degrees())
    }
}

/// Placement of a composite grid on the stereographic plane.
///
/// Cell `(row, col)` is at `(xc - j0 + col * res, yc - i0 + row * res)`
/// where `(xc, yc)` is the projected reference point. Row 0 is the
/// southernmost row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    /// Offset of the first column west of the reference point (km)
    pub j0: f64,
    /// Offset of the first row south of the reference point (km)
    pub i0: f64,
    /// Cell size (km)
    pub res: f64,
}

impl GridLayout {
    /// Layout for the given composite dimensions.
    ///
    /// Published RADOLAN sizes use their documented offsets; any other size
    /// gets a 1 km grid centred on the reference point.
    pub fn for_dimensions(rows: usize, cols: usize) -> Self {
        let (j0, i0, res) = match (rows, cols) {
            (450, 450) => (450.0, 450.0, 2.0),
            (460, 460) => (460.0, 460.0, 2.0),
            (900, 900) => (450.0, 450.0, 1.0),
            (1100, 900) => (370.0, 550.0, 1.0),
            (1200, 1100) => (470.0, 600.0, 1.0),
            (1500, 1400) => (600.0, 800.0, 1.0),
            _ => ((cols / 2) as f64, (rows / 2) as f64, 1.0),
        };

        Self {
            rows,
            cols,
            j0,
            i0,
            res,
        }
    }

    /// Whether the dimensions match one of the published composite sizes.
    pub fn is_published(&self) -> bool {
        matches!(
            (self.rows, self.cols),
            (450, 450) | (460, 460) | (900, 900) | (1100, 900) | (1200, 1100) | (1500, 1400)
        )
    }

    /// Plane coordinates (km) of the lower-left cell.
    pub fn origin(&self, proj: &RadolanStereographic) -> (f64, f64) {
        let (xc, yc) = proj.geo_to_xy(REFERENCE_POINT.0, REFERENCE_POINT.1);
        (xc - self.j0, yc - self.i0)
    }
}
