use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use crate::coverage::FacilityInputs;
use tabled::Tabled;

/// Valid value range of a metric. Every value that leaves the pipeline is
/// clamped into its metric's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// `[0, 100]`
    Percent,
    /// `[-100, 100]`, used for growth rates.
    SignedPercent,
    /// `[0, 1]`
    Ratio,
    /// `>= 0`
    Count,
}

impl Domain {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Domain::Percent => (0.0, 100.0),
            Domain::SignedPercent => (-100.0, 100.0),
            Domain::Ratio => (0.0, 1.0),
            Domain::Count => (0.0, f64::MAX),
        }
    }

    /// Clamp `v` into the domain. NaN maps to the lower bound.
    pub fn clamp(self, v: f64) -> f64 {
        let (lo, hi) = self.bounds();
        if v.is_nan() {
            return lo;
        }
        v.clamp(lo, hi)
    }

    pub fn contains(self, v: f64) -> bool {
        let (lo, hi) = self.bounds();
        v.is_finite() && v >= lo && v <= hi
    }
}

/// The closed set of numeric fields a source row can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PopulationDensity,
    HousingUnits,
    HouseholdSize,
    GreenArea,
    RoadLength,
    HighwayRatio,
    ArterialRatio,
    Congestion,
    GrowthRate,
    CoverageScore,
}

impl Metric {
    pub const COUNT: usize = 10;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::PopulationDensity,
        Metric::HousingUnits,
        Metric::HouseholdSize,
        Metric::GreenArea,
        Metric::RoadLength,
        Metric::HighwayRatio,
        Metric::ArterialRatio,
        Metric::Congestion,
        Metric::GrowthRate,
        Metric::CoverageScore,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Column header used when writing reports.
    pub fn header(self) -> &'static str {
        match self {
            Metric::PopulationDensity => "Population Density (per sq km)",
            Metric::HousingUnits => "Housing Units",
            Metric::HouseholdSize => "Avg Household Size",
            Metric::GreenArea => "Green Area (%)",
            Metric::RoadLength => "Total Road Length (km)",
            Metric::HighwayRatio => "Highway Ratio",
            Metric::ArterialRatio => "Arterial Ratio",
            Metric::Congestion => "Current Congestion Level (%)",
            Metric::GrowthRate => "Housing Growth Rate (%)",
            Metric::CoverageScore => "Coverage Score",
        }
    }

    /// Stable snake_case key used in JSON chart output.
    pub fn key(self) -> &'static str {
        match self {
            Metric::PopulationDensity => "population_density",
            Metric::HousingUnits => "housing_units",
            Metric::HouseholdSize => "household_size",
            Metric::GreenArea => "green_area",
            Metric::RoadLength => "road_length",
            Metric::HighwayRatio => "highway_ratio",
            Metric::ArterialRatio => "arterial_ratio",
            Metric::Congestion => "congestion",
            Metric::GrowthRate => "growth_rate",
            Metric::CoverageScore => "coverage_score",
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            Metric::GreenArea | Metric::Congestion | Metric::CoverageScore => Domain::Percent,
            Metric::HighwayRatio | Metric::ArterialRatio => Domain::Ratio,
            Metric::GrowthRate => Domain::SignedPercent,
            Metric::PopulationDensity
            | Metric::HousingUnits
            | Metric::HouseholdSize
            | Metric::RoadLength => Domain::Count,
        }
    }

    /// Fixed value substituted when a field is missing and no better
    /// reference exists.
    pub fn default_value(self) -> f64 {
        match self {
            Metric::PopulationDensity => 20_000.0,
            Metric::HousingUnits => 30_000.0,
            Metric::HouseholdSize => 4.5,
            Metric::GreenArea => 15.0,
            Metric::RoadLength => 200.0,
            Metric::HighwayRatio => 0.15,
            Metric::ArterialRatio => 0.30,
            Metric::Congestion => 60.0,
            Metric::GrowthRate => 2.0,
            Metric::CoverageScore => 50.0,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// One value per [`Metric`], indexed by the metric itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics([f64; Metric::COUNT]);

impl Metrics {
    pub fn defaults() -> Self {
        let mut values = [0.0; Metric::COUNT];
        for m in Metric::ALL {
            values[m.index()] = m.default_value();
        }
        Metrics(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self[m]))
    }

    /// Field-wise arithmetic mean. `None` for an empty input.
    pub fn mean<'a, I>(items: I) -> Option<Metrics>
    where
        I: IntoIterator<Item = &'a Metrics>,
    {
        let mut sums = [0.0; Metric::COUNT];
        let mut n = 0usize;
        for m in items {
            for (i, v) in m.0.iter().enumerate() {
                sums[i] += v;
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        for s in &mut sums {
            *s /= n as f64;
        }
        Some(Metrics(sums))
    }

    /// Copy with every value clamped to its metric's domain.
    pub fn clamped(&self) -> Metrics {
        let mut out = *self;
        for m in Metric::ALL {
            out[m] = m.domain().clamp(self[m]);
        }
        out
    }

    /// Composite 0-100 score from road length, green area and congestion.
    pub fn infrastructure_score(&self) -> f64 {
        let road_score = (self[Metric::RoadLength] / 500.0 * 50.0).min(100.0);
        let green_score = (self[Metric::GreenArea] * 2.5).min(50.0);
        let congestion_penalty = ((self[Metric::Congestion] - 50.0) * 0.5).max(0.0);
        (road_score + green_score - congestion_penalty).clamp(0.0, 100.0)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::defaults()
    }
}

impl Index<Metric> for Metrics {
    type Output = f64;

    fn index(&self, m: Metric) -> &f64 {
        &self.0[m.index()]
    }
}

impl IndexMut<Metric> for Metrics {
    fn index_mut(&mut self, m: Metric) -> &mut f64 {
        &mut self.0[m.index()]
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::COUNT))?;
        for (m, v) in self.iter() {
            map.serialize_entry(m.key(), &v)?;
        }
        map.end()
    }
}

/// Small set of metrics, stored as a bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricSet(u16);

impl MetricSet {
    pub fn insert(&mut self, m: Metric) {
        self.0 |= 1 << m.index();
    }

    pub fn remove(&mut self, m: Metric) {
        self.0 &= !(1 << m.index());
    }

    pub fn contains(&self, m: Metric) -> bool {
        self.0 & (1 << m.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }
}

/// One untyped observation as it came out of a CSV or JSON source:
/// header text to cell text, nothing validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        RawRow {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A validated row. `zone` is canonical (`"Zone <CODE>"`), `year > 0` and
/// every metric is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub zone: String,
    pub year: i32,
    pub metrics: Metrics,
    /// Fields that were missing or unparseable in the source.
    pub imputed: MetricSet,
    /// School or hospital figures the row carried, if any.
    pub facility: FacilityInputs,
}

/// Why a raw row was dropped at the normalization boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    MissingZone,
    InvalidZone(String),
    MissingYear,
    InvalidYear(String),
}

impl Rejected {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejected::MissingZone => "missing zone",
            Rejected::InvalidZone(_) => "invalid zone",
            Rejected::MissingYear => "missing year",
            Rejected::InvalidYear(_) => "invalid year",
        }
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::MissingZone | Rejected::MissingYear => f.write_str(self.kind()),
            Rejected::InvalidZone(v) | Rejected::InvalidYear(v) => {
                write!(f, "{} {:?}", self.kind(), v)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoverageLabel {
    Excellent,
    Good,
    NeedsImprovement,
}

impl CoverageLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            CoverageLabel::Excellent
        } else if score >= 60.0 {
            CoverageLabel::Good
        } else {
            CoverageLabel::NeedsImprovement
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CoverageLabel::Excellent => "Excellent Coverage",
            CoverageLabel::Good => "Good Coverage",
            CoverageLabel::NeedsImprovement => "Needs Improvement",
        }
    }

    /// Short status code for dashboards.
    pub fn status(self) -> &'static str {
        match self {
            CoverageLabel::Excellent => "excellent",
            CoverageLabel::Good => "good",
            CoverageLabel::NeedsImprovement => "needs-improvement",
        }
    }
}

/// Which reference data a gap-filled summary was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateBasis {
    Regional,
    Global,
    Defaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Observed {
        record_count: usize,
        year_fallback: bool,
    },
    Estimated {
        basis: EstimateBasis,
    },
}

/// Per-zone result of one aggregation query. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub zone: String,
    pub region: String,
    pub requested_year: Option<i32>,
    pub year: i32,
    pub metrics: Metrics,
    pub label: CoverageLabel,
    pub infrastructure_score: f64,
    pub provenance: Provenance,
}

impl ZoneSummary {
    /// Build a summary, deriving the label and score from `metrics`.
    pub fn new(
        zone: impl Into<String>,
        region: impl Into<String>,
        requested_year: Option<i32>,
        year: i32,
        metrics: Metrics,
        provenance: Provenance,
    ) -> Self {
        let metrics = metrics.clamped();
        ZoneSummary {
            zone: zone.into(),
            region: region.into(),
            requested_year,
            year,
            label: CoverageLabel::from_score(metrics[Metric::CoverageScore]),
            infrastructure_score: metrics.infrastructure_score(),
            metrics,
            provenance,
        }
    }

    pub fn has_data(&self) -> bool {
        matches!(self.provenance, Provenance::Observed { .. })
    }

    pub fn year_fallback(&self) -> bool {
        matches!(
            self.provenance,
            Provenance::Observed {
                year_fallback: true,
                ..
            }
        )
    }
}

/// One forecast value. `estimated` marks points derived from a gap-filled
/// summary so charts can draw them differently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub year: i32,
    pub value: f64,
    pub estimated: bool,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ZoneRow {
    #[serde(rename = "Zone")]
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "HasData")]
    #[tabled(rename = "HasData")]
    pub has_data: bool,
    #[serde(rename = "Density")]
    #[tabled(rename = "Density")]
    pub density: String,
    #[serde(rename = "HousingUnits")]
    #[tabled(rename = "HousingUnits")]
    pub housing_units: String,
    #[serde(rename = "GreenArea")]
    #[tabled(rename = "GreenArea")]
    pub green_area: String,
    #[serde(rename = "Congestion")]
    #[tabled(rename = "Congestion")]
    pub congestion: String,
    #[serde(rename = "CoverageScore")]
    #[tabled(rename = "CoverageScore")]
    pub coverage_score: String,
    #[serde(rename = "CoverageLabel")]
    #[tabled(rename = "CoverageLabel")]
    pub coverage_label: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "InfrastructureScore")]
    #[tabled(rename = "InfrastructureScore")]
    pub infrastructure_score: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RegionRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Zones")]
    #[tabled(rename = "Zones")]
    pub zones: usize,
    #[serde(rename = "EstimatedZones")]
    #[tabled(rename = "EstimatedZones")]
    pub estimated_zones: usize,
    #[serde(rename = "AvgDensity")]
    #[tabled(rename = "AvgDensity")]
    pub avg_density: String,
    #[serde(rename = "TotalHousingUnits")]
    #[tabled(rename = "TotalHousingUnits")]
    pub total_housing_units: String,
    #[serde(rename = "GreenAreaPct")]
    #[tabled(rename = "GreenAreaPct")]
    pub green_area_pct: String,
    #[serde(rename = "TotalRoadKm")]
    #[tabled(rename = "TotalRoadKm")]
    pub total_road_km: String,
    #[serde(rename = "Congestion")]
    #[tabled(rename = "Congestion")]
    pub congestion: String,
    #[serde(rename = "RoadEfficiency")]
    #[tabled(rename = "RoadEfficiency")]
    pub road_efficiency: String,
    #[serde(rename = "InfrastructureScore")]
    #[tabled(rename = "InfrastructureScore")]
    pub infrastructure_score: String,
    #[serde(rename = "HousingSaturation")]
    #[tabled(rename = "HousingSaturation")]
    pub housing_saturation: String,
    #[serde(rename = "Projected10yrGrowth")]
    #[tabled(rename = "Projected10yrGrowth")]
    pub projected_10yr_growth: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ModelRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Samples")]
    #[tabled(rename = "Samples")]
    pub samples: usize,
    #[serde(rename = "RSquared")]
    #[tabled(rename = "RSquared")]
    pub r_squared: String,
    #[serde(rename = "ReportedAccuracy")]
    #[tabled(rename = "ReportedAccuracy")]
    pub reported_accuracy: String,
    #[serde(rename = "AccuracySource")]
    #[tabled(rename = "AccuracySource")]
    pub accuracy_source: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ForecastRow {
    #[serde(rename = "Zone")]
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
    #[serde(rename = "Estimated")]
    #[tabled(rename = "Estimated")]
    pub estimated: bool,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ImpactRow {
    #[serde(rename = "Zone")]
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "HasData")]
    #[tabled(rename = "HasData")]
    pub has_data: bool,
    #[serde(rename = "TrafficEfficiencyBefore")]
    #[tabled(rename = "TrafficBefore")]
    pub traffic_before: String,
    #[serde(rename = "TrafficEfficiencyAfter")]
    #[tabled(rename = "TrafficAfter")]
    pub traffic_after: String,
    #[serde(rename = "CommuteBefore")]
    #[tabled(rename = "CommuteBefore")]
    pub commute_before: String,
    #[serde(rename = "CommuteAfter")]
    #[tabled(rename = "CommuteAfter")]
    pub commute_after: String,
    #[serde(rename = "HousingAccessBefore")]
    #[tabled(rename = "HousingAccessBefore")]
    pub housing_access_before: String,
    #[serde(rename = "HousingAccessAfter")]
    #[tabled(rename = "HousingAccessAfter")]
    pub housing_access_after: String,
    #[serde(rename = "InfraUtilBefore")]
    #[tabled(rename = "InfraUtilBefore")]
    pub infra_util_before: String,
    #[serde(rename = "InfraUtilAfter")]
    #[tabled(rename = "InfraUtilAfter")]
    pub infra_util_after: String,
    #[serde(rename = "PollutionIndexBefore")]
    #[tabled(rename = "PollutionBefore")]
    pub pollution_before: String,
    #[serde(rename = "PollutionIndexAfter")]
    #[tabled(rename = "PollutionAfter")]
    pub pollution_after: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_clamp_maps_nan_to_lower_bound() {
        assert_eq!(Domain::Percent.clamp(f64::NAN), 0.0);
        assert_eq!(Domain::Percent.clamp(140.0), 100.0);
        assert_eq!(Domain::SignedPercent.clamp(-300.0), -100.0);
        assert_eq!(Domain::Count.clamp(-1.0), 0.0);
        assert!(Domain::Count.contains(Domain::Count.clamp(f64::INFINITY)));
        assert!(!Domain::Ratio.contains(1.5));
    }

    #[test]
    fn summary_clamps_and_derives_score() {
        let mut metrics = Metrics::defaults();
        metrics[Metric::CoverageScore] = 120.0;
        metrics[Metric::HousingUnits] = -5.0;
        let s = ZoneSummary::new(
            "Zone A",
            "New Delhi",
            None,
            2020,
            metrics,
            Provenance::Estimated {
                basis: EstimateBasis::Defaults,
            },
        );
        assert_eq!(s.metrics[Metric::CoverageScore], 100.0);
        assert_eq!(s.metrics[Metric::HousingUnits], 0.0);
        assert_eq!(s.label, CoverageLabel::Excellent);
        // road 20 + green 37.5 - congestion 5
        assert_eq!(s.infrastructure_score, 52.5);
        assert!(!s.has_data());
        assert!(!s.year_fallback());
    }

    #[test]
    fn metric_set_tracks_membership() {
        let mut set = MetricSet::default();
        assert!(set.is_empty());
        set.insert(Metric::GreenArea);
        set.insert(Metric::GreenArea);
        set.insert(Metric::CoverageScore);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Metric::CoverageScore));
        assert!(!set.contains(Metric::Congestion));
        set.remove(Metric::GreenArea);
        assert_eq!(set.len(), 1);
        assert!(!set.contains(Metric::GreenArea));
    }

    #[test]
    fn coverage_label_status_codes() {
        assert_eq!(CoverageLabel::from_score(80.0).status(), "excellent");
        assert_eq!(CoverageLabel::from_score(79.9).status(), "good");
        assert_eq!(CoverageLabel::from_score(60.0).label(), "Good Coverage");
        assert_eq!(CoverageLabel::from_score(12.0).status(), "needs-improvement");
    }

    #[test]
    fn metrics_serialize_as_keyed_map() {
        let v = serde_json::to_value(Metrics::defaults()).unwrap();
        assert_eq!(v["congestion"], 60.0);
        assert_eq!(v["household_size"], 4.5);
        assert_eq!(v.as_object().unwrap().len(), Metric::COUNT);
    }
}
