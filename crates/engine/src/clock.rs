//! Scheduling datestamp selection and switch evaluation.

use std::env;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{EngineError, Result};
use tempo_util::{day_of_week, hour_of, pad_datestamp};

/// Environment variable carrying the active datestamp.
pub const DATESTAMP_ENV: &str = "SEQ_DATE";

/// Pick the datestamp a resolution runs under.
///
/// Precedence: an explicit argument, then the `SEQ_DATE` environment
/// variable, then the experiment's `ExpDate` file. Whatever source wins is
/// padded with trailing zeros to the canonical 14 digits. With no source at
/// all the resolution cannot proceed.
pub fn effective_datestamp(explicit: Option<&str>, exp_home: &Path) -> Result<String> {
    if let Some(datestamp) = explicit {
        return Ok(pad_datestamp(datestamp)?);
    }
    if let Ok(datestamp) = env::var(DATESTAMP_ENV) {
        if !datestamp.trim().is_empty() {
            debug!(%datestamp, "datestamp taken from {DATESTAMP_ENV}");
            return Ok(pad_datestamp(&datestamp)?);
        }
    }
    let date_file = exp_home.join("ExpDate");
    match fs::read_to_string(&date_file) {
        Ok(text) => {
            let first = text.lines().next().unwrap_or("").trim();
            if first.is_empty() {
                return Err(EngineError::DatestampUnavailable {
                    exp_home: exp_home.to_path_buf(),
                });
            }
            debug!(path = %date_file.display(), "datestamp taken from experiment date file");
            Ok(pad_datestamp(first)?)
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(EngineError::DatestampUnavailable {
                exp_home: exp_home.to_path_buf(),
            })
        }
        Err(error) => Err(EngineError::io(&date_file, error)),
    }
}

/// Evaluate a switch discriminant against a datestamp.
///
/// `datestamp_hour` yields the two-digit hour; `day_of_week` yields
/// `0`..`6` with Sunday as `0`. Unknown kinds select nothing, so the switch
/// falls through to its default branch.
pub fn switch_value(kind: &str, datestamp: &str) -> Option<String> {
    match kind {
        "datestamp_hour" => hour_of(datestamp).ok().map(str::to_string),
        "day_of_week" => day_of_week(datestamp).ok().map(|dow| dow.to_string()),
        other => {
            debug!(kind = other, "unknown switch type, using default branch");
            None
        }
    }
}
