//! Zone-level infrastructure metrics: normalize raw facility rows, summarize
//! them per zone (estimating zones without data), fit trend models and
//! produce year-indexed forecast series for charts.
//!
//! Data flows one way:
//! raw rows -> [`normalize`] -> [`aggregate`] (+ [`estimate`]) ->
//! [`trend`] -> [`forecast`].
//!
//! [`coverage`] scores rows that carry school or hospital figures instead of
//! a coverage score, and [`impact`] derives planning indicators from a
//! zone summary.

pub mod aggregate;
pub mod config;
pub mod coverage;
pub mod error;
pub mod estimate;
pub mod forecast;
pub mod impact;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod registry;
pub mod reports;
pub mod trend;
pub mod types;
pub mod util;

pub use config::{ForecastOptions, GrowthPolicy, SelectionOptions};
pub use error::{Error, Result};
pub use loader::{Dataset, LoadReport};
pub use registry::ZoneRegistry;
pub use types::{ForecastPoint, Metric, Metrics, NormalizedRecord, RawRow, Rejected, ZoneSummary};
