use crate::coverage::urban_green_balance_index;
use crate::forecast::{ForecastSeries, MetricModel};
use crate::impact::planning_impact;
use crate::loader::Dataset;
use crate::types::{
    ForecastRow, ImpactRow, Metric, Metrics, ModelRow, RegionRow, ZoneRow, ZoneSummary,
};
use crate::util::{average, format_number};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One flat row per zone summary, in the order given.
pub fn zone_rows(summaries: &[ZoneSummary]) -> Vec<ZoneRow> {
    summaries
        .iter()
        .map(|s| ZoneRow {
            zone: s.zone.clone(),
            region: s.region.clone(),
            year: s.year,
            has_data: s.has_data(),
            density: format_number(s.metrics[Metric::PopulationDensity], 0),
            housing_units: format_number(s.metrics[Metric::HousingUnits], 0),
            green_area: format_number(s.metrics[Metric::GreenArea], 2),
            congestion: format_number(s.metrics[Metric::Congestion], 1),
            coverage_score: format_number(s.metrics[Metric::CoverageScore], 1),
            coverage_label: s.label.label().to_string(),
            status: s.label.status().to_string(),
            infrastructure_score: format_number(s.infrastructure_score, 1),
        })
        .collect()
}

/// Region-level roll-up of zone summaries, densest region first.
///
/// Densities, ratios, green area and congestion are averaged; housing units
/// and road length are summed.
pub fn region_rows(summaries: &[ZoneSummary]) -> Vec<RegionRow> {
    let mut by_region: BTreeMap<&str, Vec<&ZoneSummary>> = BTreeMap::new();
    for s in summaries {
        by_region.entry(s.region.as_str()).or_default().push(s);
    }

    let mut scored: Vec<(f64, RegionRow)> = by_region
        .into_iter()
        .filter_map(|(region, zones)| {
            let mut agg = Metrics::mean(zones.iter().map(|s| &s.metrics))?;
            let total_units: f64 = zones.iter().map(|s| s.metrics[Metric::HousingUnits]).sum();
            let total_road: f64 = zones.iter().map(|s| s.metrics[Metric::RoadLength]).sum();
            agg[Metric::RoadLength] = total_road;

            let road_efficiency =
                (agg[Metric::HighwayRatio] * 0.4 + agg[Metric::ArterialRatio] * 0.4 + 0.2) * 100.0;
            let infrastructure = agg.infrastructure_score();
            let density_factor = (agg[Metric::PopulationDensity] / 30_000.0 * 100.0).min(100.0);
            let saturation = (density_factor / infrastructure.max(10.0) * 100.0).clamp(0.0, 100.0);
            let estimated_zones = zones.iter().filter(|s| !s.has_data()).count();

            let row = RegionRow {
                region: region.to_string(),
                zones: zones.len(),
                estimated_zones,
                avg_density: format_number(agg[Metric::PopulationDensity], 2),
                total_housing_units: format_number(total_units, 0),
                green_area_pct: format_number(agg[Metric::GreenArea], 2),
                total_road_km: format_number(total_road, 2),
                congestion: format_number(agg[Metric::Congestion], 1),
                road_efficiency: format_number(road_efficiency, 2),
                infrastructure_score: format_number(infrastructure, 1),
                housing_saturation: format_number(saturation, 1),
                projected_10yr_growth: format_number(agg[Metric::GrowthRate] * 10.0, 2),
            };
            Some((agg[Metric::PopulationDensity], row))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, row)| row).collect()
}

pub fn model_rows(models: &BTreeMap<Metric, MetricModel>) -> Vec<ModelRow> {
    models
        .values()
        .map(|m| ModelRow {
            metric: m.target.header().to_string(),
            samples: m.model.sample_count(),
            r_squared: format_number(m.model.r_squared(), 4),
            reported_accuracy: format_number(m.model.reported_accuracy() * 100.0, 1),
            accuracy_source: m.model.accuracy_source().as_str().to_string(),
        })
        .collect()
}

/// Before/after planning-impact indicators per zone.
pub fn impact_rows(summaries: &[ZoneSummary]) -> Vec<ImpactRow> {
    summaries
        .iter()
        .map(|s| {
            let p = planning_impact(&s.metrics);
            ImpactRow {
                zone: s.zone.clone(),
                region: s.region.clone(),
                has_data: s.has_data(),
                traffic_before: format_number(p.before.traffic_efficiency, 1),
                traffic_after: format_number(p.after.traffic_efficiency, 1),
                commute_before: format_number(p.before.commute_minutes, 1),
                commute_after: format_number(p.after.commute_minutes, 1),
                housing_access_before: format_number(p.before.housing_access, 1),
                housing_access_after: format_number(p.after.housing_access, 1),
                infra_util_before: format_number(p.before.infra_utilisation, 1),
                infra_util_after: format_number(p.after.infra_utilisation, 1),
                pollution_before: format_number(p.before.pollution_index, 1),
                pollution_after: format_number(p.after.pollution_index, 1),
            }
        })
        .collect()
}

/// Flatten forecast series into one row per (zone, metric, year).
pub fn forecast_rows(series: &[ForecastSeries]) -> Vec<ForecastRow> {
    series
        .iter()
        .flat_map(|s| {
            s.points.iter().map(move |p| ForecastRow {
                zone: s.zone.clone(),
                metric: s.metric.header().to_string(),
                year: p.year,
                value: format_number(p.value, 2),
                estimated: p.estimated,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub source: String,
    pub loaded_at: String,
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    pub zones: usize,
    pub observed_zones: usize,
    pub estimated_zones: usize,
    pub avg_coverage_score: f64,
    pub avg_congestion: f64,
    pub urban_green_balance_index: f64,
}

pub fn generate_summary(dataset: &Dataset, summaries: &[ZoneSummary]) -> SummaryStats {
    let observed = summaries.iter().filter(|s| s.has_data()).count();
    let coverage: Vec<f64> = summaries
        .iter()
        .map(|s| s.metrics[Metric::CoverageScore])
        .collect();
    let congestion: Vec<f64> = summaries
        .iter()
        .map(|s| s.metrics[Metric::Congestion])
        .collect();
    SummaryStats {
        source: dataset.source.display().to_string(),
        loaded_at: dataset.loaded_at.to_rfc3339(),
        total_rows: dataset.report.total_rows,
        accepted_rows: dataset.report.accepted,
        rejected_rows: dataset.report.rejected_total(),
        zones: summaries.len(),
        observed_zones: observed,
        estimated_zones: summaries.len() - observed,
        avg_coverage_score: average(&coverage),
        avg_congestion: average(&congestion),
        urban_green_balance_index: urban_green_balance_index(summaries),
    }
}
