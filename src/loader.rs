use crate::aggregate::{aggregate, summarize_all};
use crate::config::{ForecastOptions, SelectionOptions};
use crate::error::{Error, Result};
use crate::forecast::{fit_models, generate, ForecastSeries, MetricModel};
use crate::normalize::normalize_rows;
use crate::registry::ZoneRegistry;
use crate::types::{Metric, NormalizedRecord, RawRow, ZoneSummary};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub accepted: usize,
    /// Rows the CSV reader itself could not decode.
    pub unreadable: usize,
    /// Rows dropped by the normalizer, by reason.
    pub rejected: BTreeMap<&'static str, usize>,
    /// Coverage scores computed from school or hospital figures because the
    /// row had none.
    pub derived_coverage: usize,
    /// Metric cells that were missing in the source.
    pub imputed_fields: usize,
    /// Of those, how many were filled from a regional average rather than
    /// a fixed default.
    pub regionally_imputed: usize,
}

impl LoadReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum::<usize>() + self.unreadable
    }
}

/// Read CSV rows. Rows the reader fails on are counted, not fatal.
pub fn read_csv<R: Read>(reader: R) -> Result<(Vec<RawRow>, usize)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    let mut unreadable = 0usize;
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("unreadable CSV row: {}", e);
                unreadable += 1;
                continue;
            }
        };
        rows.push(RawRow::new(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string())),
        ));
    }
    Ok((rows, unreadable))
}

/// Read a JSON array of flat objects. Strings and numbers are kept as cell
/// text; nulls, booleans and nested values are dropped.
pub fn read_json(text: &str) -> Result<Vec<RawRow>> {
    let objects: Vec<Map<String, Value>> = serde_json::from_str(text)?;
    Ok(objects
        .into_iter()
        .map(|obj| {
            RawRow::new(obj.into_iter().filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                Value::Number(n) => Some((k, n.to_string())),
                _ => None,
            }))
        })
        .collect())
}

/// Read raw rows from a `.csv` or `.json` file.
pub fn load_rows(path: &Path) -> Result<(Vec<RawRow>, usize)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => read_csv(std::fs::File::open(path)?),
        Some("json") => Ok((read_json(&std::fs::read_to_string(path)?)?, 0)),
        _ => Err(Error::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

/// Fill missing coverage scores from the row's school or hospital figures.
///
/// Hospital access is scored against the longest road network among the
/// records. Returns the number of scores filled.
pub fn derive_facility_coverage(records: &mut [NormalizedRecord]) -> usize {
    let max_road_km = records
        .iter()
        .map(|r| r.metrics[Metric::RoadLength])
        .fold(0.0_f64, f64::max);
    let mut derived = 0usize;
    for r in records.iter_mut() {
        if !r.imputed.contains(Metric::CoverageScore) {
            continue;
        }
        if let Some(score) = r.facility.coverage_score(&r.metrics, max_road_km) {
            r.metrics[Metric::CoverageScore] = score;
            r.imputed.remove(Metric::CoverageScore);
            derived += 1;
        }
    }
    derived
}

/// Replace fixed-default cells with the mean of the observed values of the
/// same metric in the same region, where the region has any.
///
/// Returns the number of cells replaced.
pub fn impute_regional_averages(records: &mut [NormalizedRecord], registry: &ZoneRegistry) -> usize {
    let mut by_region: HashMap<(String, Metric), (f64, usize)> = HashMap::new();
    for r in records.iter() {
        let region = registry.region_or_unassigned(&r.zone);
        for (m, v) in r.metrics.iter() {
            if !r.imputed.contains(m) {
                let e = by_region.entry((region.to_string(), m)).or_insert((0.0, 0));
                e.0 += v;
                e.1 += 1;
            }
        }
    }

    let mut replaced = 0usize;
    for r in records.iter_mut() {
        if r.imputed.is_empty() {
            continue;
        }
        let region = registry.region_or_unassigned(&r.zone).to_string();
        for m in Metric::ALL {
            if !r.imputed.contains(m) {
                continue;
            }
            if let Some((sum, count)) = by_region.get(&(region.clone(), m)) {
                if *count > 0 {
                    r.metrics[m] = sum / *count as f64;
                    replaced += 1;
                }
            }
        }
    }
    replaced
}

/// An immutable snapshot of one load: records, diagnostics and the trend
/// models fitted over them. Reloading builds a new snapshot instead of
/// touching this one.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: PathBuf,
    pub loaded_at: DateTime<Utc>,
    pub registry: Arc<ZoneRegistry>,
    pub records: Vec<NormalizedRecord>,
    pub report: LoadReport,
    pub models: BTreeMap<Metric, MetricModel>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>, registry: Arc<ZoneRegistry>) -> Result<Dataset> {
        let path = path.as_ref();
        let (rows, unreadable) = load_rows(path)?;
        let dataset = Dataset::from_rows(path, &rows, unreadable, registry)?;
        info!(
            "loaded {} of {} rows from {}",
            dataset.report.accepted,
            dataset.report.total_rows,
            path.display()
        );
        Ok(dataset)
    }

    /// Build a snapshot from rows already read. A source with no usable
    /// rows still yields a snapshot: fallback models, and every registry
    /// zone estimated from fixed defaults.
    pub fn from_rows(
        source: &Path,
        rows: &[RawRow],
        unreadable: usize,
        registry: Arc<ZoneRegistry>,
    ) -> Result<Dataset> {
        let outcome = normalize_rows(rows);
        let mut records = outcome.records;
        if records.is_empty() {
            warn!("{}: no usable rows, every zone will be estimated", source.display());
        }
        let derived_coverage = derive_facility_coverage(&mut records);
        let imputed_fields = records.iter().map(|r| r.imputed.len()).sum::<usize>();
        let regionally_imputed = impute_regional_averages(&mut records, &registry);
        let report = LoadReport {
            total_rows: rows.len() + unreadable,
            accepted: records.len(),
            unreadable,
            rejected: outcome.rejected,
            derived_coverage,
            imputed_fields,
            regionally_imputed,
        };
        let models = fit_models(&records);
        Ok(Dataset {
            source: source.to_path_buf(),
            loaded_at: Utc::now(),
            registry,
            records,
            report,
            models,
        })
    }

    /// Re-read the same source into a fresh snapshot.
    pub fn reload(&self) -> Result<Dataset> {
        Dataset::load(&self.source, Arc::clone(&self.registry))
    }

    pub fn summary(&self, zone: &str, options: &SelectionOptions) -> Option<ZoneSummary> {
        aggregate(&self.records, &self.registry, zone, options)
    }

    pub fn summaries(&self, options: &SelectionOptions) -> Vec<ZoneSummary> {
        summarize_all(&self.records, &self.registry, options)
    }

    /// Forecast one metric for one zone. `None` for an unknown zone or a
    /// metric without a model.
    pub fn forecast(
        &self,
        zone: &str,
        metric: Metric,
        selection: &SelectionOptions,
        options: &ForecastOptions,
    ) -> Option<ForecastSeries> {
        let model = self.models.get(&metric)?;
        let summary = self.summary(zone, selection)?;
        Some(generate(model, &summary, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::AccuracySource;
    use crate::types::{EstimateBasis, Metrics, Provenance};
    use std::io::Write;

    const CSV: &str = "\
Zone,Year,Population Density (per sq km),Current Congestion Level (%),Green Area (%)
zone a,2020,12000,55,
Zone A,2020,14000,65,20
Zone B,2021,9000,40,10
,2021,1,1,1
Zone C,not-a-year,1,1,1
";

    #[test]
    fn reads_csv_and_counts_rejections() {
        let (rows, unreadable) = read_csv(CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(unreadable, 0);
        let ds = Dataset::from_rows(
            Path::new("mem.csv"),
            &rows,
            unreadable,
            Arc::new(ZoneRegistry::delhi().clone()),
        )
        .unwrap();
        assert_eq!(ds.report.accepted, 3);
        assert_eq!(ds.report.rejected.get("missing zone"), Some(&1));
        assert_eq!(ds.report.rejected.get("invalid year"), Some(&1));
        assert_eq!(ds.report.rejected_total(), 2);
    }

    #[test]
    fn imputes_missing_cells_from_regional_average() {
        let (rows, _) = read_csv(CSV.as_bytes()).unwrap();
        let ds = Dataset::from_rows(
            Path::new("mem.csv"),
            &rows,
            0,
            Arc::new(ZoneRegistry::delhi().clone()),
        )
        .unwrap();
        // The first Zone A row lacks green area; New Delhi observed 20 and 10.
        let first = &ds.records[0];
        assert!(first.imputed.contains(Metric::GreenArea));
        assert_eq!(first.metrics[Metric::GreenArea], 15.0);
        // Nobody observed housing units, so the fixed default stays.
        assert_eq!(first.metrics[Metric::HousingUnits], Metric::HousingUnits.default_value());
        assert!(ds.report.regionally_imputed >= 1);
        assert!(ds.report.imputed_fields >= ds.report.regionally_imputed);
    }

    #[test]
    fn derives_missing_coverage_from_facility_figures() {
        let rows = vec![
            RawRow::new([
                ("Zone", "Zone A"),
                ("Year", "2021"),
                ("Schools per 1000 Children", "5"),
                ("Seat Capacity per 100 Children", "120"),
                ("Student Teacher Ratio", "20"),
                ("Literacy Rate", "0.5"),
            ]),
            RawRow::new([
                ("Zone", "Zone B"),
                ("Year", "2021"),
                ("Hospitals per 100k", "15"),
                ("Beds per 100k", "800"),
                ("Total Road Length (km)", "400"),
                ("Population Density (per sq km)", "25000"),
            ]),
            RawRow::new([
                ("Zone", "Zone C"),
                ("Year", "2021"),
                ("Coverage Score", "33"),
                ("Schools per 1000 Children", "5"),
            ]),
        ];
        let ds = Dataset::from_rows(
            Path::new("facilities.csv"),
            &rows,
            0,
            Arc::new(ZoneRegistry::delhi().clone()),
        )
        .unwrap();
        assert_eq!(ds.report.derived_coverage, 2);
        // 50 + 30 + 10 + 5
        assert_eq!(ds.records[0].metrics[Metric::CoverageScore], 95.0);
        assert!(!ds.records[0].imputed.contains(Metric::CoverageScore));
        // 45 + 30 + 15 + 15, capped
        assert_eq!(ds.records[1].metrics[Metric::CoverageScore], 100.0);
        // A reported score is kept as is.
        assert_eq!(ds.records[2].metrics[Metric::CoverageScore], 33.0);
    }

    #[test]
    fn reads_json_arrays_with_mixed_types() {
        let rows = read_json(
            r#"[{"zone": "zone a", "year": 2020, "congestion": "55", "note": null},
                {"Zone": "Zone A", "Year": 2020, "Congestion": 65}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields.get("year").map(String::as_str), Some("2020"));
        assert!(!rows[0].fields.contains_key("note"));
        assert_eq!(rows[1].fields.get("Congestion").map(String::as_str), Some("65"));
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = load_rows(Path::new("data.xlsx")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn all_rejected_source_yields_defaults_snapshot() {
        let rows = vec![RawRow::new([("Zone", "???"), ("Year", "2020")])];
        let ds = Dataset::from_rows(
            Path::new("x.csv"),
            &rows,
            0,
            Arc::new(ZoneRegistry::delhi().clone()),
        )
        .unwrap();
        assert_eq!(ds.report.accepted, 0);
        assert_eq!(ds.report.rejected_total(), 1);
        assert!(ds
            .models
            .values()
            .all(|m| m.model.accuracy_source() == AccuracySource::Fallback));

        let opts = SelectionOptions::default();
        let summaries = ds.summaries(&opts);
        assert_eq!(summaries.len(), ZoneRegistry::delhi().len());
        for s in &summaries {
            assert_eq!(
                s.provenance,
                Provenance::Estimated {
                    basis: EstimateBasis::Defaults
                }
            );
            assert_eq!(s.metrics, Metrics::defaults());
        }

        let series = ds
            .forecast("Zone C", Metric::Congestion, &opts, &ForecastOptions::new(2025, 2027))
            .unwrap();
        assert!(series
            .points
            .iter()
            .all(|p| p.estimated && p.value == Metric::Congestion.default_value()));
    }

    #[test]
    fn header_only_csv_loads_empty() {
        let (rows, unreadable) = read_csv("Zone,Year,Congestion\n".as_bytes()).unwrap();
        assert!(rows.is_empty());
        let ds = Dataset::from_rows(
            Path::new("empty.csv"),
            &rows,
            unreadable,
            Arc::new(ZoneRegistry::delhi().clone()),
        )
        .unwrap();
        assert_eq!(ds.report.total_rows, 0);
        assert!(ds.records.is_empty());
    }

    #[test]
    fn reload_returns_a_fresh_snapshot() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", CSV).unwrap();
        let registry = Arc::new(ZoneRegistry::delhi().clone());
        let first = Dataset::load(file.path(), Arc::clone(&registry)).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(file.path()).unwrap();
        writeln!(f, "Zone D,2022,8000,35,12").unwrap();
        let second = first.reload().unwrap();

        assert_eq!(first.report.accepted, 3);
        assert_eq!(second.report.accepted, 4);
        assert!(second.loaded_at >= first.loaded_at);
        assert!(Arc::ptr_eq(&first.registry, &second.registry));
    }
}
