//! Occupancy volatility ranking over a trailing window.

use chrono::Duration;

use crate::analyzers::types::{BucketedSeries, Kind, StabilityScore};
use crate::stats;

/// Ranking direction. Ties on stddev break toward the higher sample
/// count in both directions, preferring the better-supported estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    MostStableFirst,
    MostUnstableFirst,
}

/// Ranks entities by the standard deviation of their bucket values over
/// the trailing window `[latest_bucket - window, latest_bucket]`.
///
/// The anchor is the newest bucket present in the data, never the wall
/// clock, so a run over a historical snapshot is replayable. Entities
/// with fewer than `min_samples` buckets in the window are dropped; an
/// empty result means "insufficient data", not an error. `kind` filters
/// the ranking to one facility kind when given.
pub fn rank_stability(
    bucketed: &BucketedSeries,
    kind: Option<Kind>,
    window: Duration,
    min_samples: usize,
    order: RankOrder,
) -> Vec<StabilityScore> {
    let considered: Vec<_> = bucketed
        .iter()
        .filter(|(key, _)| kind.is_none_or(|k| key.kind == k))
        .collect();

    let Some(latest) = considered
        .iter()
        .flat_map(|(_, s)| s.buckets.last())
        .map(|b| b.start)
        .max()
    else {
        return Vec::new();
    };
    let window_start = latest - window;

    let mut scores: Vec<StabilityScore> = considered
        .into_iter()
        .filter_map(|(key, series)| {
            let values: Vec<f64> = series
                .buckets
                .iter()
                .filter(|b| b.start >= window_start && b.start <= latest)
                .map(|b| b.percent_fill)
                .collect();

            if values.len() < min_samples {
                return None;
            }

            Some(StabilityScore {
                name: series.name.clone(),
                kind: key.kind,
                stddev: stats::stddev(&values),
                samples: values.len(),
            })
        })
        .collect();

    scores.sort_by(|a, b| {
        let by_stddev = match order {
            RankOrder::MostStableFirst => a.stddev.total_cmp(&b.stddev),
            RankOrder::MostUnstableFirst => b.stddev.total_cmp(&a.stddev),
        };
        by_stddev.then(b.samples.cmp(&a.samples))
    });

    scores
}
