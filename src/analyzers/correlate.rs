//! Cross-modal correlation: a car facility against its nearest
//! bike-share station.

use thiserror::Error;

use crate::analyzers::bucketize::resample;
use crate::analyzers::types::{BucketedSeries, CorrelationResult, EntityKey, EntitySeries, Kind};
use crate::geo;
use crate::ingest::normalized_name;
use crate::locations::LocationResolver;
use crate::stats::{self, StatsError};

/// Pearson needs at least this many overlapping buckets to say anything.
pub const MIN_CORRELATION_SAMPLES: usize = 3;

#[derive(Debug, Error)]
pub enum CorrelateError {
    #[error("no car facility named '{0}' in the data")]
    TargetNotFound(String),
    #[error("no coordinates known for '{0}'")]
    NoCoordinates(String),
    #[error("no bike facility with known coordinates")]
    NoCandidate,
    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Coordinates for a series: data-borne ones win, the injected resolver
/// fills the gaps (the older schema shapes carry no coordinates at all).
pub fn effective_location(
    key: &EntityKey,
    series: &EntitySeries,
    resolver: &dyn LocationResolver,
) -> Option<(f64, f64)> {
    series
        .location
        .or_else(|| resolver.resolve(key.kind, &key.name))
}

/// All entities of `kind` that have resolvable coordinates.
pub fn located_entities(
    bucketed: &BucketedSeries,
    kind: Kind,
    resolver: &dyn LocationResolver,
) -> Vec<(EntityKey, (f64, f64))> {
    bucketed
        .iter()
        .filter(|(key, _)| key.kind == kind)
        .filter_map(|(key, series)| {
            effective_location(key, series, resolver).map(|loc| (key.clone(), loc))
        })
        .collect()
}

/// Nearest candidate to `target` by great-circle distance.
///
/// Linear scan; on an exact distance tie the first-encountered candidate
/// wins (candidates arrive in entity-key order). Geographic ties are
/// measurement noise, not meaningful.
pub fn nearest_entity<'a>(
    target: (f64, f64),
    candidates: &'a [(EntityKey, (f64, f64))],
) -> Option<(&'a EntityKey, f64)> {
    let mut best: Option<(&EntityKey, f64)> = None;

    for (key, (lat, lon)) in candidates {
        let d = geo::distance_km(target.0, target.1, *lat, *lon);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((key, d));
        }
    }

    best
}

/// Correlates two bucketed series after resampling both to
/// `common_width_secs` and inner-joining on bucket start.
///
/// Missing buckets are never interpolated; fabricated points would
/// fabricate correlation signal. Below [`MIN_CORRELATION_SAMPLES`]
/// overlapping buckets, `pearson_r` is `None`: "not enough data" must
/// stay distinct from "no correlation" (0).
pub fn correlate(
    a: &EntitySeries,
    b: &EntitySeries,
    common_width_secs: i64,
    distance_km: f64,
) -> Result<CorrelationResult, StatsError> {
    let ra = resample(&a.buckets, common_width_secs);
    let rb = resample(&b.buckets, common_width_secs);

    // Two-pointer inner join over the ascending bucket sequences.
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < ra.len() && j < rb.len() {
        match ra[i].start.cmp(&rb[j].start) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                xs.push(ra[i].percent_fill);
                ys.push(rb[j].percent_fill);
                i += 1;
                j += 1;
            }
        }
    }

    let pearson_r = if xs.len() >= MIN_CORRELATION_SAMPLES {
        Some(stats::pearson(&xs, &ys)?)
    } else {
        None
    };

    Ok(CorrelationResult {
        entity_a: a.name.clone(),
        entity_b: b.name.clone(),
        distance_km,
        pearson_r,
        sample_count: xs.len(),
    })
}

/// End-to-end cross-modal run: locate the target car facility, find the
/// nearest bike facility, correlate the two series.
pub fn correlate_nearest(
    bucketed: &BucketedSeries,
    resolver: &dyn LocationResolver,
    target_car: &str,
    common_width_secs: i64,
) -> Result<CorrelationResult, CorrelateError> {
    let target_key = EntityKey {
        kind: Kind::Car,
        name: normalized_name(target_car),
    };
    let target_series = bucketed
        .get(&target_key)
        .ok_or_else(|| CorrelateError::TargetNotFound(target_car.to_string()))?;

    let target_loc = effective_location(&target_key, target_series, resolver)
        .ok_or_else(|| CorrelateError::NoCoordinates(target_series.name.clone()))?;

    let candidates = located_entities(bucketed, Kind::Bike, resolver);
    let (bike_key, distance_km) =
        nearest_entity(target_loc, &candidates).ok_or(CorrelateError::NoCandidate)?;

    let bike_series = &bucketed[bike_key];
    Ok(correlate(
        target_series,
        bike_series,
        common_width_secs,
        distance_km,
    )?)
}
