//! Options that steer selection, fallback and forecasting.

use crate::error::Result;
use crate::registry::ZoneRegistry;
use crate::types::Metric;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Year selection for aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectionOptions {
    /// Requested year. `None` means each zone's own latest year.
    pub year: Option<i32>,
    /// When a zone lacks the requested year, use that zone's latest year
    /// instead of treating the zone as having no data.
    pub use_latest_available: bool,
    /// Cap on the number of summaries returned by `summarize_all`.
    pub max_zones: Option<usize>,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        SelectionOptions {
            year: None,
            use_latest_available: true,
            max_zones: None,
        }
    }
}

/// How a forecast compounds on top of the fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPolicy {
    /// Use the model prediction as is.
    None,
    /// Multiply by `(1 + growth_rate / 100) ^ (year - base_year)` using the
    /// zone's own housing growth rate.
    Compound,
}

impl GrowthPolicy {
    /// Default policy per metric: stock-like counts compound, everything
    /// else follows the trend.
    pub fn for_metric(metric: Metric) -> Self {
        match metric {
            Metric::HousingUnits | Metric::PopulationDensity => GrowthPolicy::Compound,
            _ => GrowthPolicy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastOptions {
    pub start: i32,
    pub end: i32,
    /// Overrides [`GrowthPolicy::for_metric`] when set.
    pub growth: Option<GrowthPolicy>,
}

impl ForecastOptions {
    pub fn new(start: i32, end: i32) -> Self {
        ForecastOptions {
            start,
            end,
            growth: None,
        }
    }

    pub fn growth_for(&self, metric: Metric) -> GrowthPolicy {
        self.growth.unwrap_or_else(|| GrowthPolicy::for_metric(metric))
    }
}

/// Load a registry file, or fall back to the built-in Delhi layout.
pub fn load_registry(path: Option<&Path>) -> Result<ZoneRegistry> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)?;
            ZoneRegistry::from_json(&text)
        }
        None => Ok(ZoneRegistry::delhi().clone()),
    }
}
