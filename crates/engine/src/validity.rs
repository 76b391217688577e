//! Conditional resource gating.
//!
//! `VALIDITY` elements gate the declarations nested under them. A window
//! matches or it does not; malformed fields and arithmetic failures make the
//! window not match, they never abort a resolution.

use tracing::debug;

use crate::xml::{NodeId, XmlDoc};
use tempo_types::{LoopArgs, ValidityWindow};
use tempo_util::{day_of_week, hour_of, increment_datestamp};

/// What a validity window is evaluated against.
#[derive(Debug, Clone)]
pub struct ValidityContext {
    /// Active 14-digit datestamp.
    pub datestamp: String,
    /// Canonical extension of the node being resolved.
    pub extension: String,
    /// Leaf names of the enclosing loops, outermost first.
    pub loop_order: Vec<String>,
}

/// Read a `VALIDITY` element into a window. Absent attributes stay empty and
/// act as wildcards.
pub fn window_from_element(doc: &XmlDoc, id: NodeId) -> ValidityWindow {
    let attr = |key: &str| doc.attribute(id, key).unwrap_or("").to_string();
    ValidityWindow {
        dow: attr("dow"),
        hour: attr("hour"),
        valid_hour: attr("valid_hour"),
        valid_dow: attr("valid_dow"),
        local_index: attr("local_index"),
        time_delta: attr("time_delta"),
    }
}

/// Decide whether a window applies under the given context.
pub fn window_matches(window: &ValidityWindow, context: &ValidityContext) -> bool {
    if window.is_wildcard() {
        return true;
    }

    // hour and time_delta shift the datestamp before the valid_* comparisons.
    let shifted = match increment_datestamp(&context.datestamp, &window.hour, &window.time_delta) {
        Ok(shifted) => shifted,
        Err(error) => {
            debug!(%error, "validity window arithmetic failed, window does not match");
            return false;
        }
    };

    let valid_hour = window.valid_hour.trim();
    if !valid_hour.is_empty() {
        match hour_of(&shifted) {
            Ok(actual) if hour_matches(valid_hour, actual) => {}
            _ => return false,
        }
    }

    let valid_dow = window.valid_dow.trim();
    if !valid_dow.is_empty() && !dow_matches(valid_dow, &shifted) {
        return false;
    }

    // dow is checked against the unshifted datestamp.
    let dow = window.dow.trim();
    if !dow.is_empty() && !dow_matches(dow, &context.datestamp) {
        return false;
    }

    let local_index = window.local_index.trim();
    if !local_index.is_empty() && !index_matches(local_index, context) {
        return false;
    }

    true
}

fn hour_matches(expected: &str, actual: &str) -> bool {
    match (expected.parse::<u32>(), actual.parse::<u32>()) {
        (Ok(expected), Ok(actual)) => expected == actual,
        _ => false,
    }
}

fn dow_matches(expected: &str, datestamp: &str) -> bool {
    let Ok(expected) = expected.parse::<u32>() else {
        return false;
    };
    match day_of_week(datestamp) {
        Ok(actual) => expected == actual,
        Err(_) => false,
    }
}

fn index_matches(local_index: &str, context: &ValidityContext) -> bool {
    let Ok(args) = LoopArgs::parse(local_index) else {
        debug!(local_index, "unparseable validity local_index, window does not match");
        return false;
    };
    args.canonical_extension(&context.loop_order) == context.extension
}
