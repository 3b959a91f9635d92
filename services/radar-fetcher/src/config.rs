//! Fetcher configuration.
//!
//! Loaded from an optional YAML file; every field has a default so an
//! empty file (or none at all) monitors RW and SF at the given location:
//!
//! ```yaml
//! location: { latitude: 52.52, longitude: 13.40 }
//! base_url: https://opendata.dwd.de/weather/radar/radolan
//! interval_secs: 300
//! cycle_timeout_secs: 120
//! products:
//!   - code: rw
//!     name: "Radolan RW 1h"
//!   - code: sf
//!     name: "Radolan SF 24h"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fetch::DEFAULT_BASE_URL;
use crate::product::{Location, RadarProduct};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Target location; may instead come from the command line
    #[serde(default)]
    pub location: Option<Location>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    #[serde(default = "default_products")]
    pub products: Vec<ProductConfig>,
}

/// One monitored product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_cycle_timeout_secs() -> u64 {
    120
}

fn default_products() -> Vec<ProductConfig> {
    vec![
        ProductConfig {
            code: "rw".to_string(),
            name: Some("Radolan RW 1h".to_string()),
        },
        ProductConfig {
            code: "sf".to_string(),
            name: Some("Radolan SF 24h".to_string()),
        },
    ]
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            location: None,
            base_url: default_base_url(),
            interval_secs: default_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            products: default_products(),
        }
    }
}

impl FetcherConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        info!(
            path = %path.display(),
            products = config.products.len(),
            "Loaded fetcher configuration"
        );

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.location {
            Some(location) if !location.is_valid() => bail!(
                "Location out of range: latitude {}, longitude {}",
                location.latitude,
                location.longitude
            ),
            Some(_) => {}
            None => bail!("No location configured (set `location` or pass --latitude/--longitude)"),
        }

        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }
        if self.cycle_timeout_secs == 0 {
            bail!("cycle_timeout_secs must be greater than zero");
        }
        if self.products.is_empty() {
            bail!("At least one product must be configured");
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            let code = product.code.trim().to_ascii_lowercase();
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                bail!("Invalid product code {:?}", product.code);
            }
            if !seen.insert(code) {
                bail!("Duplicate product code {:?}", product.code);
            }
        }

        Ok(())
    }

    /// Products to monitor at the configured location.
    pub fn radar_products(&self) -> Result<Vec<RadarProduct>> {
        let location = self
            .location
            .ok_or_else(|| anyhow!("No location configured"))?;

        Ok(self
            .products
            .iter()
            .map(|p| RadarProduct::new(p.code.trim(), p.name.clone(), location))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetcherConfig::default();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.cycle_timeout(), Duration::from_secs(120));
        let codes: Vec<_> = config.products.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["rw", "sf"]);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
location:
  latitude: 52.52
  longitude: 13.40
base_url: http://localhost:9000/radolan
interval_secs: 600
cycle_timeout_secs: 60
products:
  - code: rw
    name: "Hourly"
  - code: rx
"#;

        let config = FetcherConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.location, Some(Location::new(52.52, 13.40)));
        assert_eq!(config.base_url, "http://localhost:9000/radolan");
        assert_eq!(config.interval_secs, 600);

        let products = config.radar_products().unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Hourly");
        assert_eq!(products[1].name, "Radolan RX reflectivity");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = FetcherConfig::from_yaml("location: { latitude: 48.1, longitude: 11.6 }").unwrap();

        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.products.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = FetcherConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.products.len(), 2);
        assert!(config.location.is_none());
    }

    #[test]
    fn test_validate_requires_location() {
        let err = FetcherConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("No location"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = FetcherConfig {
            location: Some(Location::new(52.5, 13.4)),
            ..FetcherConfig::default()
        };
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.location = Some(Location::new(95.0, 13.4));
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.products.clear();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.products.push(ProductConfig {
            code: "RW".to_string(),
            name: None,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate"));

        let mut config = base;
        config.products[0].code = "r/w".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fetcher.yaml");
        std::fs::write(&path, "location: { latitude: 51.0, longitude: 9.0 }\ninterval_secs: 60\n").unwrap();

        let config = FetcherConfig::load(&path).unwrap();
        assert_eq!(config.interval_secs, 60);
        assert!(FetcherConfig::load(&dir.path().join("missing.yaml")).is_err());
    }
}
