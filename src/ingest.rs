//! History-file ingestion: schema shape detection and per-record
//! normalization.
//!
//! The reading store is an append-only semicolon-delimited file whose
//! column set changed twice over the project's life. The shape is
//! detected once from the header row and every record is mapped through
//! an explicit adapter; a malformed record is counted and skipped, never
//! fatal to the batch.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analyzers::occupancy::clamp_counts;
use crate::analyzers::types::{DropCounts, EntityKey, Kind, Reading};

/// Placeholder for records whose name field is empty. The upstream
/// collector falls back to a street address before writing this, so an
/// empty name here means even that was missing.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Batch-level ingestion failures. Per-record problems are not errors;
/// they land in [`DropCounts`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unrecognized column set: {0}")]
    UnknownSchema(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Why a single record was dropped.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("unparsable timestamp '{0}'")]
    Timestamp(String),
    #[error("unrecognized facility kind '{0}'")]
    Kind(String),
    #[error("non-numeric count '{0}'")]
    Count(String),
    #[error("missing or non-positive capacity")]
    NoCapacity,
    #[error("record is shorter than the detected shape")]
    ShortRecord,
}

/// The three historical column sets of the history file, detected from
/// the header row (case-insensitive, whitespace-trimmed). Variants carry
/// the column indices so extraction never re-scans headers.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape {
    /// `Date;Heure;Type;Nom;Places_Libres;Places_Totales`: local date
    /// and time in separate columns, no coordinates.
    LocalDateTime {
        date: usize,
        time: usize,
        kind: usize,
        name: usize,
        free: usize,
        total: usize,
    },
    /// `timestamp;type;parking;places_libres;capacite_totale[;lat;lon]`:
    /// epoch seconds, optional coordinates.
    EpochWithCoords {
        timestamp: usize,
        kind: usize,
        name: usize,
        free: usize,
        total: usize,
        lat: Option<usize>,
        lon: Option<usize>,
    },
    /// `timestamp;type;parking;places_libres`: no capacity column, so
    /// percent-fill cannot be computed. Every record is rejected.
    LegacyNoCapacity,
}

/// Everything one ingestion run produced: the surviving readings plus
/// per-reason drop diagnostics.
#[derive(Debug)]
pub struct IngestReport {
    pub readings: Vec<Reading>,
    pub dropped: DropCounts,
}

/// Detects which historical shape a header row belongs to.
pub fn detect_shape(headers: &StringRecord) -> Result<RawShape, IngestError> {
    let idx = |wanted: &str| -> Option<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    };

    if let (Some(date), Some(time), Some(kind), Some(name), Some(free), Some(total)) = (
        idx("Date"),
        idx("Heure"),
        idx("Type"),
        idx("Nom"),
        idx("Places_Libres"),
        idx("Places_Totales"),
    ) {
        return Ok(RawShape::LocalDateTime {
            date,
            time,
            kind,
            name,
            free,
            total,
        });
    }

    if let (Some(timestamp), Some(kind), Some(name), Some(free)) = (
        idx("timestamp"),
        idx("type"),
        idx("parking"),
        idx("places_libres"),
    ) {
        return match idx("capacite_totale") {
            Some(total) => Ok(RawShape::EpochWithCoords {
                timestamp,
                kind,
                name,
                free,
                total,
                lat: idx("lat"),
                lon: idx("lon"),
            }),
            None => Ok(RawShape::LegacyNoCapacity),
        };
    }

    Err(IngestError::UnknownSchema(
        headers.iter().collect::<Vec<_>>().join(";"),
    ))
}

/// Lowercased, accent-stripped, whitespace-collapsed form of a facility
/// name. Raw sources spell the same facility inconsistently, so this is
/// the join key everywhere (dedup, series maps, the coordinate table).
pub fn normalized_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for ch in name.trim().to_lowercase().chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match ch {
            'à' | 'â' | 'ä' | 'á' | 'ã' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'î' | 'ï' | 'í' | 'ì' => out.push('i'),
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => out.push('o'),
            'ù' | 'û' | 'ü' | 'ú' => out.push('u'),
            'ç' => out.push('c'),
            'ÿ' => out.push('y'),
            'ñ' => out.push('n'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            _ => out.push(ch),
        }
    }

    out
}

/// Cleans a raw display name: strips the field delimiter (which would
/// corrupt any serialized output), trims, and falls back to
/// [`UNKNOWN_NAME`] for empty values.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned = raw.replace(';', ",");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        UNKNOWN_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_kind(raw: &str) -> Result<Kind, NormalizationError> {
    match normalized_name(raw).as_str() {
        "voiture" | "car" => Ok(Kind::Car),
        "velo" | "bike" => Ok(Kind::Bike),
        _ => Err(NormalizationError::Kind(raw.to_string())),
    }
}

fn field<'a>(record: &'a StringRecord, i: usize) -> Result<&'a str, NormalizationError> {
    record
        .get(i)
        .map(str::trim)
        .ok_or(NormalizationError::ShortRecord)
}

fn parse_count(raw: &str) -> Result<i64, NormalizationError> {
    raw.parse::<i64>()
        .map_err(|_| NormalizationError::Count(raw.to_string()))
}

fn parse_local_datetime(date: &str, time: &str) -> Result<DateTime<Utc>, NormalizationError> {
    let joined = format!("{date} {time}");
    // The collector writes HH:MM; tolerate seconds from hand-edited rows.
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .map_err(|_| NormalizationError::Timestamp(joined))
}

fn parse_epoch(raw: &str) -> Result<DateTime<Utc>, NormalizationError> {
    let secs = raw
        .parse::<i64>()
        .map_err(|_| NormalizationError::Timestamp(raw.to_string()))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| NormalizationError::Timestamp(raw.to_string()))
}

/// Maps one raw record through the adapter for its detected shape into a
/// canonical [`Reading`]. Pure transform; errors are per-record.
pub fn normalize(record: &StringRecord, shape: &RawShape) -> Result<Reading, NormalizationError> {
    match *shape {
        RawShape::LegacyNoCapacity => Err(NormalizationError::NoCapacity),

        RawShape::LocalDateTime {
            date,
            time,
            kind,
            name,
            free,
            total,
        } => {
            let timestamp = parse_local_datetime(field(record, date)?, field(record, time)?)?;
            build_reading(
                field(record, kind)?,
                field(record, name)?,
                timestamp,
                field(record, free)?,
                field(record, total)?,
                None,
            )
        }

        RawShape::EpochWithCoords {
            timestamp,
            kind,
            name,
            free,
            total,
            lat,
            lon,
        } => {
            let ts = parse_epoch(field(record, timestamp)?)?;
            // Coordinates are best-effort: absent or unparsable values
            // just mean "no data-borne location" for this record.
            let location = match (lat, lon) {
                (Some(la), Some(lo)) => {
                    let la = record.get(la).and_then(|v| v.trim().parse::<f64>().ok());
                    let lo = record.get(lo).and_then(|v| v.trim().parse::<f64>().ok());
                    la.zip(lo)
                }
                _ => None,
            };
            build_reading(
                field(record, kind)?,
                field(record, name)?,
                ts,
                field(record, free)?,
                field(record, total)?,
                location,
            )
        }
    }
}

fn build_reading(
    kind_raw: &str,
    name_raw: &str,
    timestamp: DateTime<Utc>,
    free_raw: &str,
    total_raw: &str,
    location: Option<(f64, f64)>,
) -> Result<Reading, NormalizationError> {
    let kind = parse_kind(kind_raw)?;
    let name = sanitize_name(name_raw);

    let free = parse_count(free_raw)?;
    let total = parse_count(total_raw)?;
    if total <= 0 {
        return Err(NormalizationError::NoCapacity);
    }
    let (free, total) = clamp_counts(free, total);

    Ok(Reading {
        key: EntityKey {
            kind,
            name: normalized_name(&name),
        },
        name,
        timestamp,
        free,
        total,
        location,
    })
}

/// Reads the whole history from `reader`, detecting the shape from the
/// header row and normalizing record by record. Records that fail
/// normalization are counted per reason and skipped.
pub fn load_readings<R: Read>(reader: R) -> Result<IngestReport, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let shape = detect_shape(rdr.headers()?)?;
    debug!(?shape, "history shape detected");

    let mut readings = Vec::new();
    let mut dropped = DropCounts::default();

    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(line, error = %e, "unreadable record skipped");
                dropped.short_record += 1;
                continue;
            }
        };

        match normalize(&record, &shape) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                debug!(line, error = %e, "record dropped");
                match e {
                    NormalizationError::Timestamp(_) => dropped.bad_timestamp += 1,
                    NormalizationError::Kind(_) => dropped.bad_kind += 1,
                    NormalizationError::Count(_) => dropped.bad_count += 1,
                    NormalizationError::NoCapacity => dropped.no_capacity += 1,
                    NormalizationError::ShortRecord => dropped.short_record += 1,
                }
            }
        }
    }

    if dropped.total() > 0 {
        warn!(
            dropped = dropped.total(),
            kept = readings.len(),
            "some records did not survive normalization"
        );
    }

    Ok(IngestReport { readings, dropped })
}

/// Opens and ingests a history file from disk.
pub fn load_history(path: impl AsRef<Path>) -> anyhow::Result<IngestReport> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("opening history file {}", path.display()))?;
    Ok(load_readings(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_detect_local_datetime_shape() {
        let shape = detect_shape(&headers(&[
            "Date",
            "Heure",
            "Type",
            "Nom",
            "Places_Libres",
            "Places_Totales",
        ]))
        .unwrap();
        assert!(matches!(shape, RawShape::LocalDateTime { .. }));
    }

    #[test]
    fn test_detect_shape_is_case_insensitive() {
        let shape = detect_shape(&headers(&[
            "date",
            "heure",
            "type",
            "nom",
            "places_libres",
            "places_totales",
        ]))
        .unwrap();
        assert!(matches!(shape, RawShape::LocalDateTime { .. }));
    }

    #[test]
    fn test_detect_epoch_shape_with_coords() {
        let shape = detect_shape(&headers(&[
            "timestamp",
            "type",
            "parking",
            "places_libres",
            "capacite_totale",
            "lat",
            "lon",
        ]))
        .unwrap();
        match shape {
            RawShape::EpochWithCoords { lat, lon, .. } => {
                assert_eq!(lat, Some(5));
                assert_eq!(lon, Some(6));
            }
            other => panic!("wrong shape: {other:?}"),
        }
    }

    #[test]
    fn test_detect_epoch_shape_without_coords() {
        let shape = detect_shape(&headers(&[
            "timestamp",
            "type",
            "parking",
            "places_libres",
            "capacite_totale",
        ]))
        .unwrap();
        match shape {
            RawShape::EpochWithCoords { lat, lon, .. } => {
                assert_eq!(lat, None);
                assert_eq!(lon, None);
            }
            other => panic!("wrong shape: {other:?}"),
        }
    }

    #[test]
    fn test_detect_legacy_shape() {
        let shape = detect_shape(&headers(&["timestamp", "type", "parking", "places_libres"]))
            .unwrap();
        assert_eq!(shape, RawShape::LegacyNoCapacity);
    }

    #[test]
    fn test_detect_unknown_schema() {
        let err = detect_shape(&headers(&["foo", "bar"])).unwrap_err();
        assert!(matches!(err, IngestError::UnknownSchema(_)));
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalized_name("  Gare   Saint-Roch "), "gare saint-roch");
        assert_eq!(normalized_name("Comédie"), "comedie");
        assert_eq!(normalized_name("VÉLO Château d'Ô"), "velo chateau d'o");
    }

    #[test]
    fn test_sanitize_name_strips_delimiter() {
        assert_eq!(sanitize_name("Gare; quai nord"), "Gare, quai nord");
    }

    #[test]
    fn test_sanitize_name_empty_falls_back_to_unknown() {
        assert_eq!(sanitize_name("   "), UNKNOWN_NAME);
    }

    #[test]
    fn test_parse_kind_accepts_french_variants() {
        assert_eq!(parse_kind("Voiture").unwrap(), Kind::Car);
        assert_eq!(parse_kind("Velo").unwrap(), Kind::Bike);
        assert_eq!(parse_kind("Vélo").unwrap(), Kind::Bike);
        assert!(parse_kind("tramway").is_err());
    }

    fn local_shape() -> RawShape {
        detect_shape(&headers(&[
            "Date",
            "Heure",
            "Type",
            "Nom",
            "Places_Libres",
            "Places_Totales",
        ]))
        .unwrap()
    }

    #[test]
    fn test_normalize_local_datetime_record() {
        let r = normalize(
            &record(&["2024-05-01", "08:30", "Voiture", "Comédie", "120", "600"]),
            &local_shape(),
        )
        .unwrap();

        assert_eq!(r.name, "Comédie");
        assert_eq!(r.key.name, "comedie");
        assert_eq!(r.key.kind, Kind::Car);
        assert_eq!(r.free, 120);
        assert_eq!(r.total, 600);
        assert_eq!(r.timestamp.timestamp(), 1_714_552_200);
        assert_eq!(r.location, None);
    }

    #[test]
    fn test_normalize_clamps_sensor_glitch() {
        let r = normalize(
            &record(&["2024-05-01", "08:30", "Voiture", "P1", "12", "10"]),
            &local_shape(),
        )
        .unwrap();
        assert_eq!((r.free, r.total), (10, 10));
        assert_eq!(r.percent_fill(), 0.0);
    }

    #[test]
    fn test_normalize_rejects_bad_timestamp() {
        let err = normalize(
            &record(&["yesterday", "morning", "Voiture", "P1", "5", "10"]),
            &local_shape(),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizationError::Timestamp(_)));
    }

    #[test]
    fn test_normalize_rejects_unknown_kind() {
        let err = normalize(
            &record(&["2024-05-01", "08:30", "Tram", "P1", "5", "10"]),
            &local_shape(),
        )
        .unwrap_err();
        assert_eq!(err, NormalizationError::Kind("Tram".to_string()));
    }

    #[test]
    fn test_normalize_rejects_non_numeric_count() {
        let err = normalize(
            &record(&["2024-05-01", "08:30", "Voiture", "P1", "lots", "10"]),
            &local_shape(),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizationError::Count(_)));
    }

    #[test]
    fn test_normalize_rejects_zero_capacity() {
        let err = normalize(
            &record(&["2024-05-01", "08:30", "Voiture", "P1", "5", "0"]),
            &local_shape(),
        )
        .unwrap_err();
        assert_eq!(err, NormalizationError::NoCapacity);
    }

    #[test]
    fn test_normalize_epoch_record_with_coords() {
        let shape = detect_shape(&headers(&[
            "timestamp",
            "type",
            "parking",
            "places_libres",
            "capacite_totale",
            "lat",
            "lon",
        ]))
        .unwrap();

        let r = normalize(
            &record(&["1714552200", "Velo", "Station Albert 1er", "4", "12", "43.614", "3.874"]),
            &shape,
        )
        .unwrap();

        assert_eq!(r.key.kind, Kind::Bike);
        assert_eq!(r.timestamp.timestamp(), 1_714_552_200);
        assert_eq!(r.location, Some((43.614, 3.874)));
    }

    #[test]
    fn test_normalize_epoch_record_tolerates_missing_coords() {
        let shape = detect_shape(&headers(&[
            "timestamp",
            "type",
            "parking",
            "places_libres",
            "capacite_totale",
            "lat",
            "lon",
        ]))
        .unwrap();

        let r = normalize(&record(&["1714552200", "Velo", "S1", "4", "12", "", ""]), &shape)
            .unwrap();
        assert_eq!(r.location, None);
    }

    #[test]
    fn test_legacy_shape_rejects_every_record() {
        let err = normalize(
            &record(&["1714552200", "Voiture", "P1", "5"]),
            &RawShape::LegacyNoCapacity,
        )
        .unwrap_err();
        assert_eq!(err, NormalizationError::NoCapacity);
    }

    #[test]
    fn test_load_readings_skip_and_continue() {
        let csv_text = "\
Date;Heure;Type;Nom;Places_Libres;Places_Totales
2024-05-01;08:00;Voiture;Comédie;120;600
2024-05-01;08:00;Tram;Ligne 1;3;10
2024-05-01;bad;Voiture;Gare;10;100
2024-05-01;09:00;Voiture;Comédie;90;600
2024-05-01;09:00;Voiture;Antigone;5;0
";
        let report = load_readings(csv_text.as_bytes()).unwrap();

        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.dropped.bad_kind, 1);
        assert_eq!(report.dropped.bad_timestamp, 1);
        assert_eq!(report.dropped.no_capacity, 1);
        assert_eq!(report.dropped.total(), 3);
    }

    #[test]
    fn test_load_readings_unknown_schema_is_batch_error() {
        let csv_text = "a;b;c\n1;2;3\n";
        assert!(matches!(
            load_readings(csv_text.as_bytes()),
            Err(IngestError::UnknownSchema(_))
        ));
    }

    #[test]
    fn test_load_readings_legacy_file_drops_all_records() {
        let csv_text = "\
timestamp;type;parking;places_libres
1714552200;Voiture;Comédie;120
1714555800;Voiture;Comédie;90
";
        let report = load_readings(csv_text.as_bytes()).unwrap();
        assert!(report.readings.is_empty());
        assert_eq!(report.dropped.no_capacity, 2);
    }
}
