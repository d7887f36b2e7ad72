//! Output formatting and persistence for analytics results.
//!
//! The core hands the Presentation Layer plain data structures; this
//! module is the serialization boundary that turns them into JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Logs a result using Rust's debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a result as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `value` as pretty JSON to `path`, or to stdout when no path
/// is given.
pub fn write_json(path: Option<&Path>, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;

    match path {
        Some(p) => {
            fs::write(p, &body).with_context(|| format!("writing {}", p.display()))?;
            debug!(path = %p.display(), bytes = body.len(), "analytics JSON written");
        }
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(body.as_bytes())?;
            out.write_all(b"\n")?;
        }
    }

    Ok(())
}
