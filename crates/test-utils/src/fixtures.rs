//! Common test fixtures for radolan-point tests.
//!
//! This module provides pre-defined test data that represents common
//! scenarios in composite processing.

/// Target locations (latitude, longitude in degrees).
pub mod locations {
    /// Grid reference point of every RADOLAN composite
    pub const REFERENCE: (f64, f64) = (51.0, 9.0);

    /// Berlin, well inside the national composite
    pub const BERLIN: (f64, f64) = (52.52, 13.405);
}

/// Product codes as used in download URLs.
pub mod products {
    /// Hourly precipitation sum
    pub const RW: &str = "rw";

    /// 24 hour precipitation sum
    pub const SF: &str = "sf";

    /// Reflectivity composite (one byte per cell)
    pub const RX: &str = "rx";
}

/// Header text samples.
pub mod headers {
    /// National RW header in the layout DWD publishes
    pub const RW_NATIONAL: &str = "RW072250100000524BY1620140VS 3SW   2.28.0PR E-01INT  60GP 900x 900MF 00000001MS 69<asb,boo,ros,hnr,umd,pro,ess,fld,drs,neu,nhb,oft,eis,tur,isn,fbg,mem>";

    /// Extended SF header with a prediction token
    pub const SF_EXTENDED: &str = "SF010050100000124BY2000000VS 5SW   2.30.1PR E-01INT1440GP1100x 900VV 000MF 00000008MS  9<boo,ros>";

    /// RX reflectivity header
    pub const RX_NATIONAL: &str = "RX072250100000524BY 810135VS 3SW   2.28.0PR E+00INT   5GP 900x 900MS  9<boo,ros>";
}
