//! Routing configuration
//!
//! Loaded from TOML; every section is optional.
//!
//! ```toml
//! [search]
//! reservation_increment = 0.25
//!
//! [topology]
//! reverse = false
//!
//! [grid]
//! x_min = -118.291729
//! y_min = 34.018017
//! x_len = 0.011979
//! ```

use std::path::Path;

use evac_common::{Error, Result, UidGrid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub search: SearchConfig,
    pub topology: TopologyConfig,
    /// Fixed UID grid; fitted to the topology when absent
    pub grid: Option<GridConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Capacity reserved on every edge a returned route traverses
    pub reservation_increment: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            reservation_increment: 0.25,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    /// Swap Forward and Reverse one-way codes while loading
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub x_min: f64,
    pub y_min: f64,
    pub x_len: f64,
}

impl GridConfig {
    pub fn to_grid(&self) -> UidGrid {
        UidGrid::new(self.x_min, self.y_min, self.x_len)
    }
}

impl RoutingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let increment = self.search.reservation_increment;
        if !increment.is_finite() || increment < 0.0 {
            return Err(Error::Config(format!(
                "search.reservation_increment must be a finite non-negative number, got {increment}"
            )));
        }
        if let Some(grid) = &self.grid {
            if !(grid.x_min.is_finite() && grid.y_min.is_finite()) {
                return Err(Error::Config("grid origin must be finite".to_string()));
            }
            if !grid.x_len.is_finite() || grid.x_len <= 0.0 {
                return Err(Error::Config(format!("grid.x_len must be positive, got {}", grid.x_len)));
            }
        }
        Ok(())
    }

    pub fn uid_grid(&self) -> Option<UidGrid> {
        self.grid.as_ref().map(GridConfig::to_grid)
    }
}
