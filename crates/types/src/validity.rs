//! Validity-window match criteria attached to gated resource declarations.

use serde::{Deserialize, Serialize};

/// Temporal/iteration match criterion carried by a `VALIDITY` element.
///
/// Every field is a raw attribute string; an empty field is a wildcard that
/// always matches. The gate itself lives in the engine — this is pure data.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Day of week the base datestamp must fall on (0=Sunday..6=Saturday).
    #[serde(default)]
    pub dow: String,
    /// Hour increment applied to the datestamp before `valid_hour`/`valid_dow`
    /// comparison.
    #[serde(default)]
    pub hour: String,
    /// Hour of day the (incremented) datestamp must carry.
    #[serde(default)]
    pub valid_hour: String,
    /// Day of week the (incremented) datestamp must fall on.
    #[serde(default)]
    pub valid_dow: String,
    /// Comma-separated `name=value` loop index list the node's extension must
    /// match after canonicalization.
    #[serde(default)]
    pub local_index: String,
    /// Additional `hh:mm:ss`-style delta applied together with `hour`.
    #[serde(default)]
    pub time_delta: String,
}

impl ValidityWindow {
    /// True when every field is empty, i.e. the window matches anything.
    pub fn is_wildcard(&self) -> bool {
        self.dow.is_empty()
            && self.hour.is_empty()
            && self.valid_hour.is_empty()
            && self.valid_dow.is_empty()
            && self.local_index.is_empty()
            && self.time_delta.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_wildcard() {
        assert!(ValidityWindow::default().is_wildcard());
    }

    #[test]
    fn any_field_clears_wildcard() {
        let window = ValidityWindow {
            valid_hour: "03".into(),
            ..Default::default()
        };
        assert!(!window.is_wildcard());
    }
}
