use chrono::{DateTime, Utc};
use serde::Serialize;
use vipwatch_core::Platform;

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Idle,
    Collecting,
    Scoring,
}

/// Outcome of one source within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub platform: Platform,
    /// Raw records returned by the collector.
    pub collected: usize,
    pub stored: usize,
    pub duplicates: usize,
    /// Records that could not be canonicalized.
    pub dropped: usize,
    /// Canonical items the store failed to write.
    pub failed: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub(crate) fn empty(name: &str, platform: Platform) -> Self {
        Self {
            name: name.to_string(),
            platform,
            collected: 0,
            stored: 0,
            duplicates: 0,
            dropped: 0,
            failed: 0,
            error: None,
        }
    }
}

/// Outcome of the scoring phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringReport {
    /// Unscored items selected from the store.
    pub selected: usize,
    /// Items the scorer rejected, e.g. blank content.
    pub rejected: usize,
    /// Score updates written.
    pub updated: usize,
    pub failed: usize,
    pub error: Option<String>,
}

/// Structured summary of one collection and scoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub total_collected: usize,
    pub total_stored: usize,
    pub total_duplicates: usize,
    pub total_dropped: usize,
    pub scoring: ScoringReport,
}

impl CycleReport {
    pub(crate) fn new(
        started_at: DateTime<Utc>,
        sources: Vec<SourceReport>,
        scoring: ScoringReport,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            total_collected: sources.iter().map(|s| s.collected).sum(),
            total_stored: sources.iter().map(|s| s.stored).sum(),
            total_duplicates: sources.iter().map(|s| s.duplicates).sum(),
            total_dropped: sources.iter().map(|s| s.dropped).sum(),
            sources,
            scoring,
        }
    }

    pub fn total_scored(&self) -> usize {
        self.scoring.updated
    }

    /// Sources that failed or timed out this cycle.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}
