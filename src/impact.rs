//! Planning-impact indicators derived from a zone's infrastructure metrics:
//! where the zone stands today and where a planned intervention would take it.

use crate::types::{Metric, Metrics};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImpactMetrics {
    /// 0-100, higher is better.
    pub traffic_efficiency: f64,
    pub commute_minutes: f64,
    pub housing_access: f64,
    /// 0-100.
    pub infra_utilisation: f64,
    pub pollution_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanningImpact {
    pub before: ImpactMetrics,
    pub after: ImpactMetrics,
}

/// Current-state indicators.
pub fn baseline(metrics: &Metrics) -> ImpactMetrics {
    let congestion = metrics[Metric::Congestion];
    let road_length = metrics[Metric::RoadLength];

    let road_quality =
        (metrics[Metric::HighwayRatio] * 0.4 + metrics[Metric::ArterialRatio] * 0.3 + 0.3) * 100.0;
    let traffic_efficiency = ((100.0 - congestion) * 0.6 + road_quality * 0.4).clamp(45.0, 85.0);

    let road_factor = (200.0 / road_length.max(50.0)).clamp(0.7, 1.3);
    let commute_minutes = (25.0 + congestion / 100.0 * 35.0) * road_factor;

    let road_util = (road_length / 500.0 * 100.0).min(100.0);
    let housing_util = (metrics[Metric::HousingUnits] / 50_000.0 * 100.0).min(100.0);
    let infra_utilisation = road_util * 0.6 + housing_util * 0.4;

    let pollution_index = 70.0 + congestion * 0.8 - metrics[Metric::GreenArea] * 0.5;

    ImpactMetrics {
        traffic_efficiency,
        commute_minutes,
        housing_access: (infra_utilisation * 0.9).clamp(55.0, 80.0),
        infra_utilisation,
        pollution_index,
    }
}

/// Baseline plus the projected effect of planning. Zones that start worse
/// gain more.
pub fn planning_impact(metrics: &Metrics) -> PlanningImpact {
    let before = baseline(metrics);

    let traffic_gain = 8.0 + (100.0 - before.traffic_efficiency) / 100.0 * 12.0;
    let commute_cut = 8.0 + traffic_gain / 15.0 * 10.0;
    let infra_gain = 12.0 + (100.0 - before.infra_utilisation) / 100.0 * 15.0;
    let pollution_cut = 10.0 + traffic_gain / 20.0 * 12.0 + metrics[Metric::GreenArea] * 0.3;

    let infra_utilisation = (before.infra_utilisation + infra_gain).min(90.0);
    let after = ImpactMetrics {
        traffic_efficiency: (before.traffic_efficiency + traffic_gain).min(95.0),
        commute_minutes: (before.commute_minutes - commute_cut).max(20.0),
        housing_access: (infra_utilisation * 0.9).min(95.0).max(before.housing_access),
        infra_utilisation,
        pollution_index: (before.pollution_index - pollution_cut).max(50.0),
    };
    PlanningImpact { before, after }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn baseline_from_default_metrics() {
        let b = baseline(&Metrics::defaults());
        // 40*0.6 + 45*0.4 = 42, raised to the 45 floor
        assert!(close(b.traffic_efficiency, 45.0));
        // 25 + 21 minutes, road factor 1.0 at 200 km
        assert!(close(b.commute_minutes, 46.0));
        // 40*0.6 + 60*0.4
        assert!(close(b.infra_utilisation, 48.0));
        assert!(close(b.housing_access, 55.0));
        assert!(close(b.pollution_index, 70.0 + 48.0 - 7.5));
    }

    #[test]
    fn planning_improves_every_indicator() {
        let mut m = Metrics::defaults();
        m[Metric::Congestion] = 85.0;
        m[Metric::RoadLength] = 80.0;
        let p = planning_impact(&m);
        assert!(p.after.traffic_efficiency > p.before.traffic_efficiency);
        assert!(p.after.commute_minutes < p.before.commute_minutes);
        assert!(p.after.infra_utilisation > p.before.infra_utilisation);
        assert!(p.after.housing_access >= p.before.housing_access);
        assert!(p.after.pollution_index < p.before.pollution_index);
        assert!(p.after.commute_minutes >= 20.0);
        assert!(p.after.pollution_index >= 50.0);
    }

    #[test]
    fn impact_is_deterministic_and_capped() {
        let mut m = Metrics::defaults();
        m[Metric::Congestion] = 0.0;
        m[Metric::RoadLength] = 5_000.0;
        m[Metric::HousingUnits] = 1_000_000.0;
        let p = planning_impact(&m);
        assert_eq!(p, planning_impact(&m));
        assert!(p.after.traffic_efficiency <= 95.0);
        assert!(p.after.infra_utilisation <= 90.0);
        assert!(p.after.housing_access <= 95.0);
    }
}
