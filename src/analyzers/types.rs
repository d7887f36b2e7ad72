//! Data types used by the analytics pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Facility kind. The raw history files spell these in French
/// ("Voiture", "Velo"/"Vélo"); parsing lives in `ingest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Car,
    Bike,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Car => write!(f, "car"),
            Kind::Bike => write!(f, "bike"),
        }
    }
}

/// Stable join key for a facility: kind plus the normalized display name
/// (lowercased, accent-stripped, whitespace-collapsed). Raw sources are
/// keyed by name, and the same facility appears with inconsistent casing
/// and accents across schema generations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: Kind,
    pub name: String,
}

/// One normalized occupancy observation. Immutable once produced by the
/// normalizer; invariant: `0 <= free <= total` and `total > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Display name, sanitized (no field delimiters, trimmed).
    pub name: String,
    /// Normalized join key derived from `name`.
    pub key: EntityKey,
    pub timestamp: DateTime<Utc>,
    pub free: u32,
    pub total: u32,
    /// (latitude, longitude); only the coordinate-bearing schema shape
    /// provides these.
    pub location: Option<(f64, f64)>,
}

impl Reading {
    /// Occupancy percentage in [0, 100].
    pub fn percent_fill(&self) -> f64 {
        crate::analyzers::occupancy::percent_fill(self.free, self.total)
    }
}

/// Fixed-width aggregation window for one entity: the mean percent-fill
/// of the member readings, plus how many readings contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    pub percent_fill: f64,
    pub samples: usize,
}

/// Chronologically ascending bucket sequence for one entity. Gaps are
/// simply absent buckets, never interpolated.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySeries {
    pub name: String,
    pub kind: Kind,
    /// Last data-borne coordinates seen for this entity, if any.
    pub location: Option<(f64, f64)>,
    pub buckets: Vec<TimeBucket>,
}

/// All bucketed series of one analytics run, keyed by entity.
pub type BucketedSeries = BTreeMap<EntityKey, EntitySeries>;

/// Volatility score for one entity over the trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityScore {
    pub name: String,
    pub kind: Kind,
    pub stddev: f64,
    pub samples: usize,
}

/// Cross-modal correlation between one car facility and one bike
/// facility. `pearson_r` is `None` when fewer than three overlapping
/// buckets exist. "Not enough data" is a distinct state from "no
/// correlation" (which would be 0).
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationResult {
    pub entity_a: String,
    pub entity_b: String,
    pub distance_km: f64,
    pub pearson_r: Option<f64>,
    pub sample_count: usize,
}

/// Per-reason counts of records dropped during ingestion, kept for
/// diagnostics. A dropped record never aborts the batch.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DropCounts {
    pub bad_timestamp: usize,
    pub bad_kind: usize,
    pub bad_count: usize,
    pub no_capacity: usize,
    pub short_record: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.bad_timestamp + self.bad_kind + self.bad_count + self.no_capacity + self.short_record
    }
}

/// Stability block of the dashboard payload. Both names are `None` when
/// no entity met the minimum sample requirement.
#[derive(Debug, Serialize)]
pub struct StabilityBlock {
    pub most_stable: Option<String>,
    pub most_unstable: Option<String>,
    /// Full ranking, most stable first.
    pub ranking: Vec<StabilityScore>,
}

/// One entity's time series as handed to the Presentation Layer.
#[derive(Debug, Serialize)]
pub struct SeriesOut {
    pub name: String,
    pub kind: Kind,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Serialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub percent_fill: f64,
}

/// Complete analytics output of one run, serialized as JSON for the
/// dashboard to render. Everything here is recomputed from the reading
/// batch; nothing persists between runs.
#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub generated_at: DateTime<Utc>,
    /// Timestamp of the newest reading in the batch; the anchor for all
    /// trailing windows.
    pub latest_reading: Option<DateTime<Utc>>,
    pub readings_used: usize,
    pub dropped: DropCounts,
    pub series: Vec<SeriesOut>,
    pub stability: StabilityBlock,
    pub correlation: Option<CorrelationResult>,
    /// Why `correlation` is absent, when it is.
    pub correlation_note: Option<String>,
}
