//! RADOLAN composite header parsing.
//!
//! The header is plain ASCII terminated by ETX (0x03). It starts with a
//! fixed 17 character prefix followed by key/value tokens:
//!
//! ```text
//! RW 072250 10000 0524 BY1620140 VS 3 SW   2.28.0 PR E-01 INT  60 GP 900x 900 MS 69<asb,boo,...>
//! ^  ^      ^     ^    ^ key/value tokens, values run until the next key
//! |  |      |     MMYY
//! |  |      WMO id
//! |  DDhhmm (UTC)
//! product
//! ```
//!
//! `MS` and `ST` carry free text and are prefixed with a 3 digit length.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::{RadolanError, Result};

/// Header terminator.
pub const ETX: u8 = 0x03;

/// Length of the fixed product/time/WMO prefix.
const PREFIX_LEN: usize = 17;

/// Token keys, longest first so `INT` is tried before two letter keys.
const KEYS: &[&str] = &[
    "INT", "BY", "VS", "SW", "PR", "GP", "VV", "MF", "QN", "MS", "ST", "VR", "LV", "CS", "MH",
];

/// Keys whose value is a 3 digit length followed by that many characters.
const LENGTH_PREFIXED: &[&str] = &["MS", "ST"];

/// Metadata from a composite header.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeHeader {
    /// Product id, e.g. `RW`
    pub product: String,
    /// Measurement time (end of the accumulation interval)
    pub timestamp: DateTime<Utc>,
    /// WMO station id of the compositing centre
    pub radar_id: String,
    /// Total product length in bytes as declared by `BY`
    pub declared_length: Option<usize>,
    pub format_version: Option<u32>,
    pub software_version: Option<String>,
    /// Cell value multiplier from `PR` (e.g. 0.1 for `E-01`)
    pub precision: f32,
    /// Accumulation interval in minutes
    pub interval_minutes: Option<u32>,
    pub rows: usize,
    pub cols: usize,
    /// Forecast lead time in minutes (`VV`)
    pub prediction_minutes: Option<u32>,
    pub module_flags: Option<String>,
    pub quantification: Option<String>,
    /// Radar sites contributing to the composite
    pub radar_sites: Vec<String>,
    pub site_status: Option<String>,
    /// Header length in bytes including ETX; the data section starts here
    pub header_len: usize,
}

impl CompositeHeader {
    /// Parse the header at the start of an uncompressed composite.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let etx = data
            .iter()
            .position(|&b| b == ETX)
            .ok_or_else(|| RadolanError::corrupt("header terminator (ETX) not found"))?;

        let text = std::str::from_utf8(&data[..etx])
            .ok()
            .filter(|text| text.is_ascii())
            .ok_or_else(|| RadolanError::corrupt("header is not ASCII"))?;

        let mut header = Self::parse_text(text)?;
        header.header_len = etx + 1;
        Ok(header)
    }

    /// Parse header text without its terminator.
    pub fn parse_text(text: &str) -> Result<Self> {
        if !text.is_ascii() {
            return Err(RadolanError::corrupt("header is not ASCII"));
        }
        if text.len() < PREFIX_LEN {
            return Err(RadolanError::corrupt(format!(
                "header too short: {} bytes",
                text.len()
            )));
        }

        let product = &text[0..2];
        if !product.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(RadolanError::corrupt(format!(
                "invalid product id {:?}",
                product
            )));
        }

        let timestamp = parse_timestamp(&text[2..8], &text[13..17])?;
        let radar_id = text[8..13].to_string();

        let mut declared_length = None;
        let mut format_version = None;
        let mut software_version = None;
        let mut precision = None;
        let mut interval_minutes = None;
        let mut dimensions = None;
        let mut prediction_minutes = None;
        let mut module_flags = None;
        let mut quantification = None;
        let mut radar_sites = Vec::new();
        let mut site_status = None;

        for (key, value) in tokenize(&text[PREFIX_LEN..])? {
            match key {
                "BY" => declared_length = parse_number(key, value).map(Some)?,
                "VS" => format_version = parse_number(key, value).map(Some)?,
                "SW" => software_version = Some(value.trim().to_string()),
                "PR" => precision = Some(parse_precision(value)?),
                "INT" => interval_minutes = parse_number(key, value).map(Some)?,
                "GP" => dimensions = Some(parse_dimensions(value)?),
                "VV" => prediction_minutes = parse_number(key, value).map(Some)?,
                "MF" => module_flags = Some(value.trim().to_string()),
                "QN" => quantification = Some(value.trim().to_string()),
                "MS" => radar_sites = parse_sites(value),
                "ST" => site_status = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let (rows, cols) =
            dimensions.ok_or_else(|| RadolanError::corrupt("missing grid dimensions (GP)"))?;
        let precision =
            precision.ok_or_else(|| RadolanError::corrupt("missing precision (PR)"))?;

        Ok(Self {
            product: product.to_string(),
            timestamp,
            radar_id,
            declared_length,
            format_version,
            software_version,
            precision,
            interval_minutes,
            rows,
            cols,
            prediction_minutes,
            module_flags,
            quantification,
            radar_sites,
            site_status,
            header_len: text.len(),
        })
    }

    /// Number of cells the data section must hold.
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Split the token section into `(key, value)` pairs.
///
/// Characters before the first recognised key are skipped.
fn tokenize(text: &str) -> Result<Vec<(&'static str, &str)>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let key = match key_at(text, pos) {
            Some(key) => key,
            None => {
                pos += 1;
                continue;
            }
        };

        let start = pos + key.len();
        let (value, end) = if LENGTH_PREFIXED.contains(&key) {
            match length_prefixed(text, start)? {
                Some(span) => span,
                None => {
                    let end = next_key(text, start);
                    (&text[start..end], end)
                }
            }
        } else {
            let end = next_key(text, start);
            (&text[start..end], end)
        };

        tokens.push((key, value));
        pos = end;
    }

    Ok(tokens)
}

fn key_at(text: &str, pos: usize) -> Option<&'static str> {
    KEYS.iter().copied().find(|key| text[pos..].starts_with(key))
}

fn next_key(text: &str, from: usize) -> usize {
    (from..text.len())
        .find(|&pos| key_at(text, pos).is_some())
        .unwrap_or(text.len())
}

/// Value of a length-prefixed token and the position after it.
///
/// Returns `None` when no 3 digit length follows the key.
fn length_prefixed(text: &str, start: usize) -> Result<Option<(&str, usize)>> {
    let len = match text
        .get(start..start + 3)
        .and_then(|digits| digits.trim().parse::<usize>().ok())
    {
        Some(len) => len,
        None => return Ok(None),
    };

    let value_start = start + 3;
    let end = value_start + len;
    if end > text.len() {
        return Err(RadolanError::corrupt(format!(
            "token declares {} characters but only {} remain",
            len,
            text.len() - value_start
        )));
    }

    Ok(Some((&text[value_start..end], end)))
}

fn parse_timestamp(ddhhmm: &str, mmyy: &str) -> Result<DateTime<Utc>> {
    let field = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| RadolanError::corrupt(format!("invalid timestamp field {:?}", s)))
    };

    let day = field(&ddhhmm[0..2])?;
    let hour = field(&ddhhmm[2..4])?;
    let minute = field(&ddhhmm[4..6])?;
    let month = field(&mmyy[0..2])?;
    let year = 2000 + field(&mmyy[2..4])? as i32;

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            RadolanError::corrupt(format!(
                "invalid timestamp {}-{:02}-{:02} {:02}:{:02}",
                year, month, day, hour, minute
            ))
        })?;

    Ok(Utc.from_utc_datetime(&naive))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RadolanError::corrupt(format!("invalid {} value {:?}", key, value)))
}

/// `PR` carries a power of ten, e.g. ` E-01` for 0.1.
fn parse_precision(value: &str) -> Result<f32> {
    let exponent = value
        .trim()
        .strip_prefix('E')
        .and_then(|exp| exp.parse::<i32>().ok())
        .ok_or_else(|| RadolanError::corrupt(format!("invalid PR value {:?}", value)))?;

    Ok(10f32.powi(exponent))
}

/// `GP` is `rows x cols`, each right-aligned to 4 characters.
fn parse_dimensions(value: &str) -> Result<(usize, usize)> {
    let invalid = || RadolanError::corrupt(format!("invalid GP value {:?}", value));

    let (rows, cols) = value.split_once('x').ok_or_else(invalid)?;
    let rows = rows.trim().parse().map_err(|_| invalid())?;
    let cols = cols.trim().parse().map_err(|_| invalid())?;

    Ok((rows, cols))
}

fn parse_sites(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .split(',')
        .filter_map(|site| site.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
