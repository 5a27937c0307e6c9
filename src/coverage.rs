//! Rule-based coverage scores for rows that carry facility counts instead of
//! a coverage score, and the city-wide index built from zone coverage.

use crate::types::{Metric, Metrics, ZoneSummary};
use crate::util::average;

/// Student-teacher ratio assumed when a school row does not report one.
pub const DEFAULT_STUDENT_TEACHER_RATIO: f64 = 30.0;

/// Facility columns a source row may carry next to its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityField {
    SchoolsPer1000Children,
    SeatsPer100Children,
    StudentTeacherRatio,
    LiteracyRate,
    HospitalsPer100k,
    HospitalCount,
    BedsPer100k,
}

/// Facility figures of one row. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FacilityInputs {
    pub schools_per_1000_children: Option<f64>,
    pub seats_per_100_children: Option<f64>,
    pub student_teacher_ratio: Option<f64>,
    /// Fraction in `[0, 1]`; values above 1 are read as percentages.
    pub literacy_rate: Option<f64>,
    pub hospitals_per_100k: Option<f64>,
    pub hospital_count: Option<f64>,
    pub beds_per_100k: Option<f64>,
}

impl FacilityInputs {
    /// Record `value` for `field` unless the field is already set.
    pub fn set(&mut self, field: FacilityField, value: f64) {
        let slot = match field {
            FacilityField::SchoolsPer1000Children => &mut self.schools_per_1000_children,
            FacilityField::SeatsPer100Children => &mut self.seats_per_100_children,
            FacilityField::StudentTeacherRatio => &mut self.student_teacher_ratio,
            FacilityField::LiteracyRate => &mut self.literacy_rate,
            FacilityField::HospitalsPer100k => &mut self.hospitals_per_100k,
            FacilityField::HospitalCount => &mut self.hospital_count,
            FacilityField::BedsPer100k => &mut self.beds_per_100k,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == FacilityInputs::default()
    }

    /// Coverage score derived from the facility figures, or `None` when the
    /// row has neither school nor hospital data.
    ///
    /// School data wins when both are present. `max_road_km` is the longest
    /// road network in the dataset; hospital access is scored relative to it.
    pub fn coverage_score(&self, metrics: &Metrics, max_road_km: f64) -> Option<f64> {
        if let Some(schools) = self.schools_per_1000_children {
            return Some(school_coverage_score(
                schools,
                self.seats_per_100_children.unwrap_or(0.0),
                self.student_teacher_ratio
                    .unwrap_or(DEFAULT_STUDENT_TEACHER_RATIO),
                self.literacy_rate.unwrap_or(0.0),
            ));
        }
        if self.hospitals_per_100k.is_none() && self.beds_per_100k.is_none() {
            return None;
        }
        let per_100k = self.hospitals_per_100k.unwrap_or(0.0);
        let has_hospitals = match self.hospital_count {
            Some(n) => n > 0.0,
            None => per_100k > 0.0,
        };
        Some(hospital_coverage_score(
            per_100k,
            has_hospitals,
            self.beds_per_100k.unwrap_or(0.0),
            metrics[Metric::RoadLength],
            max_road_km,
            metrics[Metric::PopulationDensity],
        ))
    }
}

/// School coverage, 0-100: up to 50 points for schools per 1,000 children
/// (5 is full marks), 30 for seats per 100 children (120), 10 for a
/// student-teacher ratio at or below 20 falling to 0 at 50, and 10 for
/// literacy.
pub fn school_coverage_score(
    schools_per_1000_children: f64,
    seats_per_100_children: f64,
    student_teacher_ratio: f64,
    literacy_rate: f64,
) -> f64 {
    let schools = (schools_per_1000_children / 5.0 * 50.0).clamp(0.0, 50.0);
    let seats = (seats_per_100_children / 120.0 * 30.0).clamp(0.0, 30.0);
    let ratio = 10.0 * (1.0 - ((student_teacher_ratio - 20.0) / 30.0).clamp(0.0, 1.0));
    let literacy = if literacy_rate > 1.0 {
        literacy_rate / 100.0
    } else {
        literacy_rate
    };
    let total = schools + seats + ratio + literacy.clamp(0.0, 1.0) * 10.0;
    if total.is_finite() {
        total.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Healthcare access, 20-100: hospital density (40, plus 5 for having any),
/// beds per 100k (30, full at 800), road network relative to the longest
/// one (15) and population density (15, full at 25,000/km²).
pub fn hospital_coverage_score(
    hospitals_per_100k: f64,
    has_hospitals: bool,
    beds_per_100k: f64,
    road_km: f64,
    max_road_km: f64,
    population_density: f64,
) -> f64 {
    let max_road = if max_road_km > 0.0 { max_road_km } else { 1.0 };
    let hospitals = (hospitals_per_100k / 15.0 * 40.0).clamp(0.0, 40.0)
        + if has_hospitals { 5.0 } else { 0.0 };
    let beds = (beds_per_100k / 800.0 * 30.0).clamp(0.0, 30.0);
    let roads = (road_km / max_road * 15.0).clamp(0.0, 15.0);
    let density = (population_density / 25_000.0 * 15.0).clamp(0.0, 15.0);
    let total = ((hospitals + beds + roads + density) * 10.0).round() / 10.0;
    if total.is_finite() {
        total.clamp(20.0, 100.0)
    } else {
        20.0
    }
}

/// Urban Green Balance Index: mean coverage score across zones, one decimal.
/// Zero for no zones.
pub fn urban_green_balance_index(summaries: &[ZoneSummary]) -> f64 {
    let scores: Vec<f64> = summaries
        .iter()
        .map(|s| s.metrics[Metric::CoverageScore])
        .collect();
    (average(&scores) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EstimateBasis, Provenance};

    #[test]
    fn school_score_components_cap() {
        assert_eq!(school_coverage_score(5.0, 120.0, 20.0, 1.0), 100.0);
        assert_eq!(school_coverage_score(50.0, 1_000.0, 5.0, 1.0), 100.0);
        // 25 + 15 + 5 + 8
        assert!((school_coverage_score(2.5, 60.0, 35.0, 0.8) - 53.0).abs() < 1e-9);
        assert_eq!(school_coverage_score(0.0, 0.0, 80.0, 0.0), 0.0);
        // Literacy as a percentage reads the same as a fraction.
        assert_eq!(
            school_coverage_score(1.0, 40.0, 25.0, 80.0),
            school_coverage_score(1.0, 40.0, 25.0, 0.8)
        );
    }

    #[test]
    fn hospital_score_has_a_floor() {
        assert_eq!(hospital_coverage_score(0.0, false, 0.0, 0.0, 0.0, 0.0), 20.0);
        assert_eq!(
            hospital_coverage_score(15.0, true, 800.0, 300.0, 300.0, 25_000.0),
            100.0
        );
        // 16 + 5 + 15 + 7.5 + 6
        assert_eq!(
            hospital_coverage_score(6.0, true, 400.0, 150.0, 300.0, 10_000.0),
            49.5
        );
    }

    #[test]
    fn inputs_prefer_school_data_and_skip_empty_rows() {
        let metrics = Metrics::defaults();
        assert!(FacilityInputs::default().is_empty());
        assert_eq!(FacilityInputs::default().coverage_score(&metrics, 500.0), None);

        let mut inputs = FacilityInputs::default();
        inputs.set(FacilityField::HospitalsPer100k, 15.0);
        inputs.set(FacilityField::HospitalsPer100k, 1.0);
        assert_eq!(inputs.hospitals_per_100k, Some(15.0));
        let hospital = inputs.coverage_score(&metrics, 200.0).unwrap();
        // 45 + 0 + 15 + 12
        assert_eq!(hospital, 72.0);

        inputs.set(FacilityField::SchoolsPer1000Children, 5.0);
        let school = inputs.coverage_score(&metrics, 200.0).unwrap();
        // 50 + 0 + 10 (default ratio 30) + 0
        assert!((school - 56.666_666_666_666_664).abs() < 1e-9);
    }

    #[test]
    fn green_balance_index_is_mean_coverage() {
        let make = |zone: &str, coverage: f64| {
            let mut metrics = Metrics::defaults();
            metrics[Metric::CoverageScore] = coverage;
            ZoneSummary::new(
                zone,
                "North",
                None,
                2024,
                metrics,
                Provenance::Estimated {
                    basis: EstimateBasis::Defaults,
                },
            )
        };
        let zones = [make("Zone A", 70.0), make("Zone B", 65.25), make("Zone C", 40.0)];
        assert_eq!(urban_green_balance_index(&zones), 58.4);
        assert_eq!(urban_green_balance_index(&[]), 0.0);
    }
}
