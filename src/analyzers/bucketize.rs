//! Duplicate collapse and fixed-width time-bucket aggregation.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::analyzers::types::{BucketedSeries, EntityKey, EntitySeries, Reading, TimeBucket};

/// Collapses duplicate readings for the same (entity, timestamp).
///
/// Policy: most recently ingested wins, i.e. the last record in batch order
/// survives. Repeated collection runs append true duplicates to the
/// history file, and the newest write is the one closest to the source.
/// Relative order of the surviving readings is preserved.
pub fn dedup(mut readings: Vec<Reading>) -> Vec<Reading> {
    let mut seen: HashSet<(EntityKey, DateTime<Utc>)> = HashSet::new();
    let mut kept = Vec::with_capacity(readings.len());

    while let Some(r) = readings.pop() {
        if seen.insert((r.key.clone(), r.timestamp)) {
            kept.push(r);
        }
    }
    kept.reverse();
    kept
}

/// Start of the bucket containing `ts`: `floor(epoch / width) * width`.
fn bucket_start(ts: DateTime<Utc>, width_secs: i64) -> DateTime<Utc> {
    let secs = ts.timestamp().div_euclid(width_secs) * width_secs;
    DateTime::from_timestamp(secs, 0).expect("bucket start is within the chrono range")
}

/// Groups readings into fixed-width buckets per entity; the bucket value
/// is the arithmetic mean of the member readings' percent-fill.
///
/// Pure function of the input batch: no hidden state, same input gives
/// the same output. Buckets with no readings are simply absent, and each
/// entity's sequence is sorted ascending by bucket start. The display
/// name and coordinates attached to a series come from the newest
/// reading that carried them.
pub fn bucketize(readings: &[Reading], width_secs: i64) -> BucketedSeries {
    assert!(width_secs > 0, "bucket width must be positive");

    struct Acc {
        name: String,
        name_ts: DateTime<Utc>,
        location: Option<(f64, f64)>,
        loc_ts: Option<DateTime<Utc>>,
        // bucket epoch start -> (percent-fill sum, member count)
        buckets: BTreeMap<i64, (f64, usize)>,
    }

    let mut acc: BTreeMap<EntityKey, Acc> = BTreeMap::new();

    for r in readings {
        let entry = acc.entry(r.key.clone()).or_insert_with(|| Acc {
            name: r.name.clone(),
            name_ts: r.timestamp,
            location: None,
            loc_ts: None,
            buckets: BTreeMap::new(),
        });

        if r.timestamp >= entry.name_ts {
            entry.name = r.name.clone();
            entry.name_ts = r.timestamp;
        }
        if r.location.is_some() && entry.loc_ts.is_none_or(|t| r.timestamp >= t) {
            entry.location = r.location;
            entry.loc_ts = Some(r.timestamp);
        }

        let start = bucket_start(r.timestamp, width_secs).timestamp();
        let slot = entry.buckets.entry(start).or_insert((0.0, 0));
        slot.0 += r.percent_fill();
        slot.1 += 1;
    }

    acc.into_iter()
        .map(|(key, a)| {
            let kind = key.kind;
            let buckets = a
                .buckets
                .into_iter()
                .map(|(start, (sum, n))| TimeBucket {
                    start: DateTime::from_timestamp(start, 0)
                        .expect("bucket start is within the chrono range"),
                    // n >= 1 for every materialized bucket
                    percent_fill: sum / n as f64,
                    samples: n,
                })
                .collect();

            (
                key,
                EntitySeries {
                    name: a.name,
                    kind,
                    location: a.location,
                    buckets,
                },
            )
        })
        .collect()
}

/// Re-buckets an already-bucketed sequence at a (usually coarser) width.
///
/// The value of a merged bucket is the unweighted mean of the member
/// bucket values; `samples` accumulates the member counts. At the
/// original width this is the identity, which is what lets two series
/// bucketed at the same width be compared without resampling artifacts.
pub fn resample(buckets: &[TimeBucket], width_secs: i64) -> Vec<TimeBucket> {
    assert!(width_secs > 0, "bucket width must be positive");

    let mut merged: BTreeMap<i64, (f64, usize, usize)> = BTreeMap::new();
    for b in buckets {
        let start = bucket_start(b.start, width_secs).timestamp();
        let slot = merged.entry(start).or_insert((0.0, 0, 0));
        slot.0 += b.percent_fill;
        slot.1 += 1;
        slot.2 += b.samples;
    }

    merged
        .into_iter()
        .map(|(start, (sum, n, samples))| TimeBucket {
            start: DateTime::from_timestamp(start, 0)
                .expect("bucket start is within the chrono range"),
            percent_fill: sum / n as f64,
            samples,
        })
        .collect()
}
