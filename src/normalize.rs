//! Row normalizer: the single validation boundary between untyped source
//! rows and [`NormalizedRecord`]s.

use crate::coverage::{FacilityField, FacilityInputs};
use crate::types::{Metric, MetricSet, Metrics, NormalizedRecord, RawRow, Rejected};
use crate::util::{fold_header, parse_f64_safe, parse_i32_safe};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Zone,
    Year,
    Metric(Metric),
    Facility(FacilityField),
}

// Folded header -> column. Canonical headers and JSON keys of every metric
// are added on top of these spellings.
static COLUMN_ALIASES: Lazy<HashMap<String, Column>> = Lazy::new(|| {
    let extra: &[(&str, Column)] = &[
        ("zone", Column::Zone),
        ("zonename", Column::Zone),
        ("zonecode", Column::Zone),
        ("zoneid", Column::Zone),
        ("year", Column::Year),
        ("yr", Column::Year),
        ("datayear", Column::Year),
        ("populationdensity", Column::Metric(Metric::PopulationDensity)),
        ("populationdensityperkm2", Column::Metric(Metric::PopulationDensity)),
        ("populationdensityperkm", Column::Metric(Metric::PopulationDensity)),
        ("avgpopulationdensity", Column::Metric(Metric::PopulationDensity)),
        ("density", Column::Metric(Metric::PopulationDensity)),
        ("totalhousingunits", Column::Metric(Metric::HousingUnits)),
        ("householdsize", Column::Metric(Metric::HouseholdSize)),
        ("greenareapct", Column::Metric(Metric::GreenArea)),
        ("greenareapercent", Column::Metric(Metric::GreenArea)),
        ("avggreenareapct", Column::Metric(Metric::GreenArea)),
        ("roadlength", Column::Metric(Metric::RoadLength)),
        ("roadlengthkm", Column::Metric(Metric::RoadLength)),
        ("totalroadskm", Column::Metric(Metric::RoadLength)),
        ("congestionlevel", Column::Metric(Metric::Congestion)),
        ("congestionlevelpct", Column::Metric(Metric::Congestion)),
        ("growthrate", Column::Metric(Metric::GrowthRate)),
        ("coverage", Column::Metric(Metric::CoverageScore)),
        ("coveragepct", Column::Metric(Metric::CoverageScore)),
        ("avgcoveragescore", Column::Metric(Metric::CoverageScore)),
        ("schoolsper1000children", Column::Facility(FacilityField::SchoolsPer1000Children)),
        ("schoolsper1kchildren", Column::Facility(FacilityField::SchoolsPer1000Children)),
        ("seatcapacityper100children", Column::Facility(FacilityField::SeatsPer100Children)),
        ("seatsper100children", Column::Facility(FacilityField::SeatsPer100Children)),
        ("avgstudentteacherratio", Column::Facility(FacilityField::StudentTeacherRatio)),
        ("studentteacherratio", Column::Facility(FacilityField::StudentTeacherRatio)),
        ("literacyrate", Column::Facility(FacilityField::LiteracyRate)),
        ("hospitalsper100k", Column::Facility(FacilityField::HospitalsPer100k)),
        ("avghospitalsper100k", Column::Facility(FacilityField::HospitalsPer100k)),
        ("numhospitals", Column::Facility(FacilityField::HospitalCount)),
        ("hospitals", Column::Facility(FacilityField::HospitalCount)),
        ("bedsper100k", Column::Facility(FacilityField::BedsPer100k)),
    ];
    let mut map: HashMap<String, Column> = extra
        .iter()
        .map(|(k, c)| ((*k).to_string(), *c))
        .collect();
    for m in Metric::ALL {
        map.insert(fold_header(m.header()), Column::Metric(m));
        map.insert(fold_header(m.key()), Column::Metric(m));
    }
    map
});

static ZONE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^zone[\s\-_:#]*").expect("zone prefix pattern"));
static ZONE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,3}$").expect("zone code pattern"));

/// Canonicalize a free-text zone name to `"Zone <CODE>"`.
///
/// Whitespace is trimmed and collapsed, an optional case-insensitive `zone`
/// prefix is stripped and the remaining code is upper-cased. The code must
/// be one to three ASCII letters or digits.
pub fn canonical_zone(raw: &str) -> Result<String, Rejected> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(Rejected::MissingZone);
    }
    let code = ZONE_PREFIX.replace(&collapsed, "").to_ascii_uppercase();
    if !ZONE_CODE.is_match(&code) {
        return Err(Rejected::InvalidZone(raw.to_string()));
    }
    Ok(format!("Zone {}", code))
}

/// Validate one raw row.
///
/// Missing or unparseable metrics get [`Metric::default_value`] and are
/// recorded in [`NormalizedRecord::imputed`]. A bad zone or year rejects the
/// whole row.
pub fn normalize(raw: &RawRow) -> Result<NormalizedRecord, Rejected> {
    let mut zone_cell: Option<&str> = None;
    let mut year_cell: Option<&str> = None;
    let mut cells: [Option<f64>; Metric::COUNT] = [None; Metric::COUNT];
    let mut facility = FacilityInputs::default();

    for (header, value) in &raw.fields {
        let Some(column) = COLUMN_ALIASES.get(&fold_header(header)) else {
            continue;
        };
        let value = value.as_str();
        // First non-empty cell wins when several headers alias one column.
        match column {
            Column::Zone if zone_cell.is_none() && !value.trim().is_empty() => {
                zone_cell = Some(value)
            }
            Column::Year if year_cell.is_none() && !value.trim().is_empty() => {
                year_cell = Some(value)
            }
            Column::Metric(m) => {
                let slot = &mut cells[m.index()];
                if slot.is_none() {
                    *slot = parse_f64_safe(Some(value));
                }
            }
            Column::Facility(f) => {
                if let Some(v) = parse_f64_safe(Some(value)) {
                    facility.set(*f, v);
                }
            }
            _ => {}
        }
    }

    let zone = canonical_zone(zone_cell.ok_or(Rejected::MissingZone)?)?;
    let year_text = year_cell.ok_or(Rejected::MissingYear)?;
    let year = match parse_i32_safe(Some(year_text)) {
        Some(y) if y > 0 => y,
        _ => return Err(Rejected::InvalidYear(year_text.to_string())),
    };

    let mut metrics = Metrics::defaults();
    let mut imputed = MetricSet::default();
    for (m, cell) in Metric::ALL.into_iter().zip(cells) {
        match cell {
            Some(v) => metrics[m] = v,
            None => imputed.insert(m),
        }
    }

    Ok(NormalizedRecord {
        zone,
        year,
        metrics,
        imputed,
        facility,
    })
}

/// Result of normalizing a batch of rows.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub records: Vec<NormalizedRecord>,
    /// Rejection counts keyed by [`Rejected::kind`].
    pub rejected: BTreeMap<&'static str, usize>,
}

impl NormalizeOutcome {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

pub fn normalize_rows<'a, I>(rows: I) -> NormalizeOutcome
where
    I: IntoIterator<Item = &'a RawRow>,
{
    let mut out = NormalizeOutcome::default();
    for (idx, row) in rows.into_iter().enumerate() {
        match normalize(row) {
            Ok(rec) => out.records.push(rec),
            Err(reason) => {
                debug!("dropping row {}: {}", idx + 1, reason);
                *out.rejected.entry(reason.kind()).or_insert(0) += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, &str)]) -> RawRow {
        RawRow::new(fields.iter().copied())
    }

    #[test]
    fn canonicalizes_zone_spellings() {
        assert_eq!(canonical_zone("zone a").unwrap(), "Zone A");
        assert_eq!(canonical_zone("  ZONE   k1 ").unwrap(), "Zone K1");
        assert_eq!(canonical_zone("Zone-P2").unwrap(), "Zone P2");
        assert_eq!(canonical_zone("zoneb").unwrap(), "Zone B");
        assert_eq!(canonical_zone("m").unwrap(), "Zone M");
    }

    #[test]
    fn rejects_bad_zone_strings() {
        assert_eq!(canonical_zone("   "), Err(Rejected::MissingZone));
        assert!(matches!(canonical_zone("Zone"), Err(Rejected::InvalidZone(_))));
        assert!(matches!(canonical_zone("New Delhi"), Err(Rejected::InvalidZone(_))));
        assert!(matches!(canonical_zone("Zone ABCD"), Err(Rejected::InvalidZone(_))));
    }

    #[test]
    fn resolves_column_name_variants() {
        let rec = normalize(&row(&[
            ("ZONE", "zone c"),
            ("year", "2021"),
            ("population_density", "12,000"),
            ("Current Congestion Level (%)", "72"),
            ("coverage_score", "81.5"),
        ]))
        .unwrap();
        assert_eq!(rec.zone, "Zone C");
        assert_eq!(rec.year, 2021);
        assert_eq!(rec.metrics[Metric::PopulationDensity], 12_000.0);
        assert_eq!(rec.metrics[Metric::Congestion], 72.0);
        assert_eq!(rec.metrics[Metric::CoverageScore], 81.5);
        assert!(!rec.imputed.contains(Metric::Congestion));
    }

    #[test]
    fn substitutes_defaults_for_missing_or_garbage_numbers() {
        let rec = normalize(&row(&[
            ("Zone", "Zone A"),
            ("Year", "2020"),
            ("Green Area (%)", "n/a"),
            ("Highway Ratio", "NaN"),
        ]))
        .unwrap();
        assert_eq!(rec.metrics[Metric::GreenArea], Metric::GreenArea.default_value());
        assert_eq!(rec.metrics[Metric::HighwayRatio], Metric::HighwayRatio.default_value());
        assert!(rec.imputed.contains(Metric::GreenArea));
        assert_eq!(rec.imputed.len(), Metric::COUNT);
        assert!(rec.metrics.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn collects_facility_columns_without_touching_metrics() {
        let rec = normalize(&row(&[
            ("Zone", "Zone B"),
            ("Year", "2022"),
            ("schools_per_1000_children", "3.5"),
            ("Avg Student-Teacher Ratio", "28"),
            ("literacy_rate", "bad"),
        ]))
        .unwrap();
        assert_eq!(rec.facility.schools_per_1000_children, Some(3.5));
        assert_eq!(rec.facility.student_teacher_ratio, Some(28.0));
        assert_eq!(rec.facility.literacy_rate, None);
        assert!(rec.imputed.contains(Metric::CoverageScore));

        let plain = normalize(&row(&[("Zone", "Zone B"), ("Year", "2022")])).unwrap();
        assert!(plain.facility.is_empty());
    }

    #[test]
    fn rejects_rows_with_bad_year() {
        assert_eq!(
            normalize(&row(&[("Zone", "Zone A")])),
            Err(Rejected::MissingYear)
        );
        assert_eq!(
            normalize(&row(&[("Zone", "Zone A"), ("Year", "0")])),
            Err(Rejected::InvalidYear("0".to_string()))
        );
        assert_eq!(
            normalize(&row(&[("Zone", "Zone A"), ("Year", "soon")])),
            Err(Rejected::InvalidYear("soon".to_string()))
        );
        assert_eq!(normalize(&row(&[("Year", "2020")])), Err(Rejected::MissingZone));
    }

    #[test]
    fn counts_rejections_by_kind() {
        let rows = vec![
            row(&[("Zone", "a"), ("Year", "2020")]),
            row(&[("Zone", "a")]),
            row(&[("Zone", "???"), ("Year", "2020")]),
            row(&[("Zone", "b")]),
        ];
        let out = normalize_rows(&rows);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected_total(), 3);
        assert_eq!(out.rejected.get("missing year"), Some(&2));
        assert_eq!(out.rejected.get("invalid zone"), Some(&1));
    }
}
