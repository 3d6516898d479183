//! Score to severity and recommended action.

use serde::Serialize;
use vipwatch_core::{Action, Severity, SeverityBands};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub severity: Severity,
    pub action: Action,
}

/// Maps a final score onto severity bands, highest band first.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeverityPolicy {
    bands: SeverityBands,
}

impl SeverityPolicy {
    pub fn new(bands: SeverityBands) -> Self {
        Self { bands }
    }

    /// Total over `f64`; NaN falls through to `Low`.
    pub fn decide(&self, score: f64) -> Decision {
        let severity = if score >= self.bands.critical() {
            Severity::Critical
        } else if score >= self.bands.high() {
            Severity::High
        } else if score >= self.bands.medium() {
            Severity::Medium
        } else {
            Severity::Low
        };
        Decision {
            severity,
            action: severity.action(),
        }
    }
}
