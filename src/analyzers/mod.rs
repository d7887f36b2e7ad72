//! The analytics pipeline over normalized readings.
//!
//! Readings flow through deduplication and time-bucket aggregation into
//! per-entity series, which feed the stability ranking and the
//! cross-modal correlation. Everything here is a pure transformation of
//! the input batch: no I/O, no clock, no state between runs.

pub mod bucketize;
pub mod correlate;
pub mod occupancy;
pub mod report;
pub mod stability;
pub mod types;
