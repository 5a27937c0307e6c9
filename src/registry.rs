//! Zone registry: the canonical zone list and each zone's region.
//!
//! The registry is plain immutable data handed to every component that needs
//! zone or region lookups, so tests can swap in their own.

use crate::error::{Error, Result};
use crate::normalize::canonical_zone;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Region label for observed zones that the registry does not know.
pub const UNASSIGNED_REGION: &str = "Unassigned";

static DELHI: Lazy<ZoneRegistry> = Lazy::new(|| {
    ZoneRegistry::from_pairs([
        ("Zone A", "New Delhi"),
        ("Zone B", "New Delhi"),
        ("Zone C", "New Delhi"),
        ("Zone J", "New Delhi"),
        ("Zone D", "East Delhi"),
        ("Zone E", "East Delhi"),
        ("Zone F", "South Delhi"),
        ("Zone G", "South Delhi"),
        ("Zone H", "South Delhi"),
        ("Zone K1", "North Delhi"),
        ("Zone K2", "North Delhi"),
        ("Zone L", "West Delhi"),
        ("Zone M", "West Delhi"),
        ("Zone N", "North East Delhi"),
        ("Zone O", "North East Delhi"),
        ("Zone P1", "Dwarka"),
        ("Zone P2", "Dwarka"),
    ])
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneRegistry {
    zones: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    zone: String,
    region: String,
}

impl ZoneRegistry {
    /// Build a registry from `(zone, region)` pairs. Zone names are taken
    /// verbatim; use [`ZoneRegistry::from_json`] for untrusted input.
    pub fn from_pairs<Z, R, I>(pairs: I) -> Self
    where
        Z: Into<String>,
        R: Into<String>,
        I: IntoIterator<Item = (Z, R)>,
    {
        ZoneRegistry {
            zones: pairs
                .into_iter()
                .map(|(z, r)| (z.into(), r.into()))
                .collect(),
        }
    }

    /// The built-in Delhi zone layout.
    pub fn delhi() -> &'static ZoneRegistry {
        &DELHI
    }

    /// Parse a registry from a JSON array of `{"zone": .., "region": ..}`
    /// objects. Zone names go through the same canonicalization as data rows.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<RegistryEntry> = serde_json::from_str(text)?;
        let mut zones = BTreeMap::new();
        for e in entries {
            let zone = canonical_zone(&e.zone).map_err(|r| Error::InvalidRegistry {
                message: r.to_string(),
            })?;
            let region = e.region.trim();
            if region.is_empty() {
                return Err(Error::InvalidRegistry {
                    message: format!("empty region for {}", zone),
                });
            }
            if zones.insert(zone.clone(), region.to_string()).is_some() {
                return Err(Error::InvalidRegistry {
                    message: format!("duplicate zone {}", zone),
                });
            }
        }
        if zones.is_empty() {
            return Err(Error::InvalidRegistry {
                message: "no zones".to_string(),
            });
        }
        Ok(ZoneRegistry { zones })
    }

    pub fn region_of(&self, zone: &str) -> Option<&str> {
        self.zones.get(zone).map(String::as_str)
    }

    /// Region for `zone`, or [`UNASSIGNED_REGION`] when unknown.
    pub fn region_or_unassigned(&self, zone: &str) -> &str {
        self.region_of(zone).unwrap_or(UNASSIGNED_REGION)
    }

    /// Zone codes in sorted order.
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
