//! Coordinate lookup for facilities whose readings carry no position.
//!
//! Older history shapes have no lat/lon columns at all, so the map view
//! and the cross-modal correlator need an external name → coordinates
//! table. The analytics core depends only on the [`LocationResolver`]
//! capability; the JSON file written by the upstream location-sync job
//! is one implementation of it.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::analyzers::types::Kind;
use crate::ingest::normalized_name;

/// Resolves coordinates for an entity by its normalized name.
pub trait LocationResolver {
    fn resolve(&self, kind: Kind, normalized_name: &str) -> Option<(f64, f64)>;
}

/// Resolver that knows nothing. Data-borne coordinates still work.
pub struct NoLocations;

impl LocationResolver for NoLocations {
    fn resolve(&self, _kind: Kind, _normalized_name: &str) -> Option<(f64, f64)> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct LocationEntry {
    lat: f64,
    lon: f64,
}

/// On-disk layout of the location table: one map per facility kind,
/// keyed by normalized name, as written by the upstream sync job.
#[derive(Debug, Default, Deserialize)]
struct LocationFile {
    #[serde(default, rename = "Voiture")]
    car: HashMap<String, LocationEntry>,
    #[serde(default, rename = "Velo")]
    bike: HashMap<String, LocationEntry>,
}

/// [`LocationResolver`] backed by the sync job's `locations.json`.
pub struct JsonLocations {
    table: HashMap<(Kind, String), (f64, f64)>,
}

impl JsonLocations {
    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let file: LocationFile =
            serde_json::from_reader(reader).context("parsing location table")?;

        let mut table = HashMap::new();
        for (kind, entries) in [(Kind::Car, file.car), (Kind::Bike, file.bike)] {
            for (key, entry) in entries {
                // Keys in the file are already normalized, but re-apply
                // our normalization so both sides agree on the form.
                table.insert((kind, normalized_name(&key)), (entry.lat, entry.lon));
            }
        }

        Ok(Self { table })
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening location table {}", path.display()))?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl LocationResolver for JsonLocations {
    fn resolve(&self, kind: Kind, normalized_name: &str) -> Option<(f64, f64)> {
        self.table.get(&(kind, normalized_name.to_string())).copied()
    }
}
