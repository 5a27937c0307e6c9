//! Zone aggregator: groups normalized records by zone, resolves the year to
//! report per zone and merges duplicate rows into one [`ZoneSummary`].
//!
//! Year resolution is always zone-local. A zone that lacks the requested
//! year falls back to *its own* latest year, never to another zone's data.

use crate::config::SelectionOptions;
use crate::estimate::estimate;
use crate::normalize::canonical_zone;
use crate::registry::ZoneRegistry;
use crate::types::{Metrics, NormalizedRecord, Provenance, ZoneSummary};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Pick the year to report for one zone.
///
/// Returns the resolved year and whether it differs from the requested one.
/// `None` when the zone has no years at all, or when the requested year is
/// missing and latest-year fallback is disabled.
pub fn resolve_year<I>(years: I, requested: Option<i32>, use_latest_available: bool) -> Option<(i32, bool)>
where
    I: IntoIterator<Item = i32>,
{
    let years: BTreeSet<i32> = years.into_iter().collect();
    let latest = *years.iter().next_back()?;
    match requested {
        None => Some((latest, false)),
        Some(y) if years.contains(&y) => Some((y, false)),
        Some(_) if use_latest_available => Some((latest, true)),
        Some(_) => None,
    }
}

/// Merge the records of one zone for the resolved year. The result only
/// exists if the zone has observed data for the selection.
fn observe(
    zone: &str,
    region: &str,
    group: &[&NormalizedRecord],
    options: &SelectionOptions,
) -> Option<ZoneSummary> {
    let (year, year_fallback) = resolve_year(
        group.iter().map(|r| r.year),
        options.year,
        options.use_latest_available,
    )?;
    let matching: Vec<&NormalizedRecord> = group.iter().copied().filter(|r| r.year == year).collect();
    let metrics = Metrics::mean(matching.iter().map(|r| &r.metrics))?;
    if year_fallback {
        debug!(
            "{}: no rows for {:?}, using its latest year {}",
            zone, options.year, year
        );
    }
    Some(ZoneSummary::new(
        zone,
        region,
        options.year,
        year,
        metrics,
        Provenance::Observed {
            record_count: matching.len(),
            year_fallback,
        },
    ))
}

/// Summarize one zone.
///
/// Observed data wins. A registry-known zone without usable data is handed
/// to the gap-fill estimator. `None` only for a zone that has no usable data
/// and is unknown to the registry.
pub fn aggregate(
    records: &[NormalizedRecord],
    registry: &ZoneRegistry,
    zone: &str,
    options: &SelectionOptions,
) -> Option<ZoneSummary> {
    let zone = canonical_zone(zone).ok()?;
    let group: Vec<&NormalizedRecord> = records.iter().filter(|r| r.zone == zone).collect();
    summarize_group(records, registry, &zone, &group, options)
}

fn summarize_group(
    records: &[NormalizedRecord],
    registry: &ZoneRegistry,
    zone: &str,
    group: &[&NormalizedRecord],
    options: &SelectionOptions,
) -> Option<ZoneSummary> {
    let region = registry.region_or_unassigned(zone);
    if let Some(summary) = observe(zone, region, group, options) {
        return Some(summary);
    }
    let region = registry.region_of(zone)?;
    Some(estimate(zone, region, records, registry, options.year))
}

/// Index records by zone, preserving input order inside each group.
pub fn group_by_zone(records: &[NormalizedRecord]) -> BTreeMap<&str, Vec<&NormalizedRecord>> {
    let mut map: BTreeMap<&str, Vec<&NormalizedRecord>> = BTreeMap::new();
    for r in records {
        map.entry(r.zone.as_str()).or_default().push(r);
    }
    map
}

/// One summary per registry zone plus every observed zone the registry does
/// not know, ordered by zone code and capped at `options.max_zones`.
pub fn summarize_all(
    records: &[NormalizedRecord],
    registry: &ZoneRegistry,
    options: &SelectionOptions,
) -> Vec<ZoneSummary> {
    let groups = group_by_zone(records);
    let zones: BTreeSet<&str> = registry.zones().chain(groups.keys().copied()).collect();
    let empty = Vec::new();

    let mut out: Vec<ZoneSummary> = zones
        .into_iter()
        .filter_map(|zone| {
            let group = groups.get(zone).unwrap_or(&empty);
            summarize_group(records, registry, zone, group, options)
        })
        .collect();
    if let Some(max) = options.max_zones {
        out.truncate(max);
    }

    let estimated = out.iter().filter(|s| !s.has_data()).count();
    info!(
        "summarized {} zones ({} observed, {} estimated)",
        out.len(),
        out.len() - estimated,
        estimated
    );
    out
}
