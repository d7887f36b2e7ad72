//! One full analytics run: readings in, dashboard payload out.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::analyzers::bucketize::{bucketize, dedup};
use crate::analyzers::correlate::{correlate_nearest, effective_location};
use crate::analyzers::stability::{RankOrder, rank_stability};
use crate::analyzers::types::{
    BucketedSeries, DashboardData, Kind, SeriesOut, SeriesPoint, StabilityBlock,
};
use crate::ingest::IngestReport;
use crate::locations::LocationResolver;

/// Tunables of one analytics run. Defaults mirror the dashboard: hourly
/// buckets, a 24 h stability window, at least 6 samples per entity.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub bucket_width_secs: i64,
    pub window: Duration,
    pub min_samples: usize,
    /// Car facility to correlate against its nearest bike station. When
    /// `None`, the car facility with the best-supported series is used.
    pub target_car: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            bucket_width_secs: 3600,
            window: Duration::hours(24),
            min_samples: 6,
            target_car: None,
        }
    }
}

/// Fallback correlation target: the car facility with the most buckets,
/// first in key order on ties.
pub fn default_target(bucketed: &BucketedSeries) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (key, series) in bucketed {
        if key.kind != Kind::Car {
            continue;
        }
        if best.is_none_or(|(_, n)| series.buckets.len() > n) {
            best = Some((series.name.as_str(), series.buckets.len()));
        }
    }
    best.map(|(name, _)| name.to_string())
}

/// Runs the whole pipeline over one ingested batch. Idempotent: the
/// same readings always produce the same buckets, ranking, and
/// correlation (timestamps anchor to the data, not the wall clock).
pub fn run(
    ingested: IngestReport,
    resolver: &dyn LocationResolver,
    cfg: &AnalyticsConfig,
) -> DashboardData {
    let IngestReport { readings, dropped } = ingested;

    let latest_reading = readings.iter().map(|r| r.timestamp).max();

    let readings = dedup(readings);
    let readings_used = readings.len();
    debug!(readings_used, "deduplicated batch");

    let bucketed = bucketize(&readings, cfg.bucket_width_secs);
    info!(
        entities = bucketed.len(),
        bucket_width_secs = cfg.bucket_width_secs,
        "bucketized series ready"
    );

    let series = bucketed
        .iter()
        .map(|(key, s)| {
            let location = effective_location(key, s, resolver);
            SeriesOut {
                name: s.name.clone(),
                kind: key.kind,
                lat: location.map(|l| l.0),
                lon: location.map(|l| l.1),
                points: s
                    .buckets
                    .iter()
                    .map(|b| SeriesPoint {
                        t: b.start,
                        percent_fill: b.percent_fill,
                    })
                    .collect(),
            }
        })
        .collect();

    // The dashboard's stability tile ranks car parks; bike stations
    // churn constantly by design and would dominate the unstable end.
    let ranking = rank_stability(
        &bucketed,
        Some(Kind::Car),
        cfg.window,
        cfg.min_samples,
        RankOrder::MostStableFirst,
    );
    let most_unstable = rank_stability(
        &bucketed,
        Some(Kind::Car),
        cfg.window,
        cfg.min_samples,
        RankOrder::MostUnstableFirst,
    )
    .first()
    .map(|s| s.name.clone());

    let stability = StabilityBlock {
        most_stable: ranking.first().map(|s| s.name.clone()),
        most_unstable,
        ranking,
    };

    let target = cfg.target_car.clone().or_else(|| default_target(&bucketed));
    let (correlation, correlation_note) = match target {
        None => (None, Some("no car facility in the data".to_string())),
        Some(name) => {
            match correlate_nearest(&bucketed, resolver, &name, cfg.bucket_width_secs) {
                Ok(result) => {
                    info!(
                        car = %result.entity_a,
                        bike = %result.entity_b,
                        distance_km = result.distance_km,
                        samples = result.sample_count,
                        "cross-modal correlation computed"
                    );
                    (Some(result), None)
                }
                Err(e) => {
                    info!(target = %name, reason = %e, "correlation unavailable");
                    (None, Some(e.to_string()))
                }
            }
        }
    };

    DashboardData {
        generated_at: Utc::now(),
        latest_reading,
        readings_used,
        dropped,
        series,
        stability,
        correlation,
        correlation_note,
    }
}
