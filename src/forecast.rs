//! Forecast series generation on top of per-metric trend models.

use crate::config::{ForecastOptions, GrowthPolicy};
use crate::trend::{FitConfig, Sample, TrendModel, ZoneEncoding};
use crate::types::{ForecastPoint, Metric, Metrics, NormalizedRecord, ZoneSummary};
use log::info;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Metrics that get a trend model per dataset.
pub const FORECAST_METRICS: [Metric; 5] = [
    Metric::PopulationDensity,
    Metric::HousingUnits,
    Metric::GreenArea,
    Metric::Congestion,
    Metric::CoverageScore,
];

/// Extra features (besides year and zone) used to model each target.
pub fn default_predictors(target: Metric) -> &'static [Metric] {
    match target {
        Metric::CoverageScore => &[Metric::PopulationDensity, Metric::GreenArea],
        Metric::Congestion => &[Metric::RoadLength, Metric::PopulationDensity],
        Metric::PopulationDensity => &[Metric::HousingUnits],
        Metric::HousingUnits => &[Metric::GrowthRate],
        _ => &[],
    }
}

/// A trend model for one target metric. Feature layout is
/// `[year, zone index, predictors...]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricModel {
    pub target: Metric,
    pub predictors: Vec<Metric>,
    pub model: TrendModel,
}

impl MetricModel {
    pub fn fit(records: &[NormalizedRecord], target: Metric, predictors: &[Metric]) -> Self {
        let zones = ZoneEncoding::from_zones(records.iter().map(|r| r.zone.as_str()));
        let samples: Vec<Sample> = records
            .iter()
            .map(|r| {
                Sample::new(
                    feature_vector(&zones, &r.zone, r.year, &r.metrics, predictors),
                    r.metrics[target],
                )
            })
            .collect();
        let model = TrendModel::fit(&samples, &FitConfig::for_metric(target)).with_zone_encoding(zones);
        MetricModel {
            target,
            predictors: predictors.to_vec(),
            model,
        }
    }

    /// Feature vector for `zone` in `year`. Zones the model never saw get a
    /// non-finite zone index, which the model treats as its training mean.
    pub fn features(&self, zone: &str, year: i32, metrics: &Metrics) -> Vec<f64> {
        feature_vector(self.model.zones(), zone, year, metrics, &self.predictors)
    }

    pub fn predict(&self, zone: &str, year: i32, metrics: &Metrics) -> f64 {
        self.model.predict(&self.features(zone, year, metrics))
    }
}

fn feature_vector(
    zones: &ZoneEncoding,
    zone: &str,
    year: i32,
    metrics: &Metrics,
    predictors: &[Metric],
) -> Vec<f64> {
    let mut v = Vec::with_capacity(2 + predictors.len());
    v.push(f64::from(year));
    v.push(zones.encode(zone).unwrap_or(f64::NAN));
    v.extend(predictors.iter().map(|m| metrics[*m]));
    v
}

/// Fit one model per [`FORECAST_METRICS`] entry.
pub fn fit_models(records: &[NormalizedRecord]) -> BTreeMap<Metric, MetricModel> {
    let models: BTreeMap<Metric, MetricModel> = FORECAST_METRICS
        .iter()
        .map(|m| (*m, MetricModel::fit(records, *m, default_predictors(*m))))
        .collect();
    info!(
        "fitted {} trend models over {} records",
        models.len(),
        records.len()
    );
    models
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    pub zone: String,
    pub metric: Metric,
    /// True when the series was derived from a gap-filled summary.
    pub estimated: bool,
    pub points: Vec<ForecastPoint>,
}

/// Walk `options.start..=options.end` and predict one point per year.
///
/// Compounding growth is applied relative to the summary's own year and the
/// result is clamped into the metric's domain. Calling this again with the
/// same inputs yields the same series.
pub fn generate(model: &MetricModel, summary: &ZoneSummary, options: &ForecastOptions) -> ForecastSeries {
    let metric = model.target;
    let domain = metric.domain();
    let growth = options.growth_for(metric);
    let estimated = !summary.has_data();

    let points = (options.start..=options.end)
        .map(|year| {
            let raw = model.predict(&summary.zone, year, &summary.metrics);
            let value = match growth {
                GrowthPolicy::None => raw,
                GrowthPolicy::Compound => {
                    let base = (1.0 + summary.metrics[Metric::GrowthRate] / 100.0).max(0.0);
                    let scaled = raw * base.powi(year.saturating_sub(summary.year));
                    if scaled.is_finite() {
                        scaled
                    } else {
                        raw
                    }
                }
            };
            ForecastPoint {
                year,
                value: domain.clamp(value),
                estimated,
            }
        })
        .collect();

    ForecastSeries {
        zone: summary.zone.clone(),
        metric,
        estimated,
        points,
    }
}

fn pivot<F>(series: &[ForecastSeries], key: F) -> Vec<Value>
where
    F: Fn(&ForecastSeries) -> String,
{
    let mut by_year: BTreeMap<i32, Map<String, Value>> = BTreeMap::new();
    for s in series {
        let k = key(s);
        for p in &s.points {
            let row = by_year.entry(p.year).or_insert_with(|| {
                let mut m = Map::new();
                m.insert("year".to_string(), Value::from(p.year));
                m.insert("estimated".to_string(), Value::Bool(false));
                m
            });
            row.insert(k.clone(), Value::from(p.value));
            if p.estimated {
                row.insert("estimated".to_string(), Value::Bool(true));
            }
        }
    }
    by_year.into_values().map(Value::Object).collect()
}

/// Chart rows for one zone: `{year, estimated, <metric key>: value, ...}`,
/// ascending by year.
pub fn chart_by_metric(series: &[ForecastSeries]) -> Vec<Value> {
    pivot(series, |s| s.metric.key().to_string())
}

/// Chart rows for one metric across zones: `{year, estimated, <zone>: value, ...}`.
pub fn chart_by_zone(series: &[ForecastSeries]) -> Vec<Value> {
    pivot(series, |s| s.zone.clone())
}
