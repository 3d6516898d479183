//! Tunable pipeline configuration.
//!
//! Everything an operator may want to change lives here: keyword lists, the
//! co-occurrence bonus, the severity band thresholds, and the cycle limits.
//! Values are validated when built so the pipeline never sees a band layout
//! that is non-monotonic or a score bonus outside [0,1].

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("severity bands must satisfy 0 < medium < high < critical <= 1, got {critical}/{high}/{medium}")]
    InvalidBands { critical: f64, high: f64, medium: f64 },

    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("cannot parse {name}: {detail}")]
    Parse { name: &'static str, detail: String },
}

/// Split a comma-separated keyword list, trimming and lower-casing each entry.
///
/// Blank entries are dropped, so an unset variable yields an empty list.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn unit_interval(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}

/// Lower bounds of the critical, high, and medium severity bands.
///
/// Scores below `medium` are low.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityBands {
    critical: f64,
    high: f64,
    medium: f64,
}

impl SeverityBands {
    pub fn new(critical: f64, high: f64, medium: f64) -> Result<Self, ConfigError> {
        let ordered = 0.0 < medium && medium < high && high < critical && critical <= 1.0;
        if !ordered {
            return Err(ConfigError::InvalidBands {
                critical,
                high,
                medium,
            });
        }
        Ok(Self {
            critical,
            high,
            medium,
        })
    }

    pub fn critical(&self) -> f64 {
        self.critical
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn medium(&self) -> f64 {
        self.medium
    }
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            critical: 0.9,
            high: 0.7,
            medium: 0.4,
        }
    }
}

impl FromStr for SeverityBands {
    type Err = ConfigError;

    /// Parse `"critical,high,medium"`, e.g. `"0.9,0.7,0.4"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Parse {
                name: "severity bands",
                detail: e.to_string(),
            })?;
        match parts.as_slice() {
            [critical, high, medium] => Self::new(*critical, *high, *medium),
            _ => Err(ConfigError::Parse {
                name: "severity bands",
                detail: format!("expected 3 values, got {}", parts.len()),
            }),
        }
    }
}

/// Rules applied on top of classifier output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringConfig {
    pub vip_keywords: Vec<String>,
    pub threat_keywords: Vec<String>,
    cooccurrence_bonus: f64,
    pub bands: SeverityBands,
}

impl ScoringConfig {
    pub const DEFAULT_BONUS: f64 = 0.3;

    pub fn new(
        vip_keywords: Vec<String>,
        threat_keywords: Vec<String>,
        cooccurrence_bonus: f64,
        bands: SeverityBands,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            vip_keywords: normalize(vip_keywords),
            threat_keywords: normalize(threat_keywords),
            cooccurrence_bonus: unit_interval("co-occurrence bonus", cooccurrence_bonus)?,
            bands,
        })
    }

    /// Default bonus and bands with the given keyword lists.
    pub fn with_keywords(vip_keywords: Vec<String>, threat_keywords: Vec<String>) -> Self {
        Self {
            vip_keywords: normalize(vip_keywords),
            threat_keywords: normalize(threat_keywords),
            cooccurrence_bonus: Self::DEFAULT_BONUS,
            bands: SeverityBands::default(),
        }
    }

    pub fn cooccurrence_bonus(&self) -> f64 {
        self.cooccurrence_bonus
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::with_keywords(Vec::new(), Vec::new())
    }
}

fn normalize(keywords: Vec<String>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Bounds on a single collection and scoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Maximum records requested from each source per cycle.
    pub source_item_cap: usize,
    /// Wall-clock limit for a single source's fetch.
    pub source_timeout: Duration,
    /// Maximum unscored items scored per cycle.
    pub scoring_batch_limit: usize,
    /// Sleep between cycles in monitor mode.
    pub cycle_interval: Duration,
    /// Score at or above which an item counts as an alert in aggregates.
    alert_threshold: f64,
}

impl PipelineConfig {
    pub fn with_alert_threshold(mut self, threshold: f64) -> Result<Self, ConfigError> {
        self.alert_threshold = unit_interval("threat threshold", threshold)?;
        Ok(self)
    }

    pub fn alert_threshold(&self) -> f64 {
        self.alert_threshold
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_item_cap: 200,
            source_timeout: Duration::from_secs(60),
            scoring_batch_limit: 500,
            cycle_interval: Duration::from_secs(300),
            alert_threshold: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_trimmed_lowercased_and_blank_dropped() {
        assert_eq!(
            parse_keywords(" Senator Smith, ,KILL,  bomb "),
            vec!["senator smith", "kill", "bomb"]
        );
        assert!(parse_keywords("").is_empty());
        assert!(parse_keywords(" , ,").is_empty());
    }

    #[test]
    fn default_bands() {
        let bands = SeverityBands::default();
        assert_eq!(bands.critical(), 0.9);
        assert_eq!(bands.high(), 0.7);
        assert_eq!(bands.medium(), 0.4);
        assert_eq!(SeverityBands::new(0.9, 0.7, 0.4), Ok(bands));
    }

    #[test]
    fn bands_must_be_strictly_ordered() {
        assert!(SeverityBands::new(0.7, 0.9, 0.4).is_err());
        assert!(SeverityBands::new(0.9, 0.9, 0.4).is_err());
        assert!(SeverityBands::new(1.1, 0.7, 0.4).is_err());
        assert!(SeverityBands::new(0.9, 0.7, 0.0).is_err());
        assert!(SeverityBands::new(1.0, 0.5, 0.1).is_ok());
    }

    #[test]
    fn bands_parse_from_string() {
        let bands: SeverityBands = "0.95, 0.8, 0.5".parse().unwrap();
        assert_eq!(bands.critical(), 0.95);
        assert_eq!(bands.medium(), 0.5);

        assert!(matches!(
            "0.9,0.7".parse::<SeverityBands>(),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            "a,b,c".parse::<SeverityBands>(),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn bonus_must_be_in_unit_interval() {
        let bands = SeverityBands::default();
        assert!(ScoringConfig::new(vec![], vec![], 1.5, bands).is_err());
        assert!(ScoringConfig::new(vec![], vec![], -0.1, bands).is_err());
        let cfg = ScoringConfig::new(vec![" VIP ".into()], vec![], 0.25, bands).unwrap();
        assert_eq!(cfg.cooccurrence_bonus(), 0.25);
        assert_eq!(cfg.vip_keywords, vec!["vip"]);
    }

    #[test]
    fn alert_threshold_validated() {
        assert!(PipelineConfig::default().with_alert_threshold(2.0).is_err());
        let cfg = PipelineConfig::default().with_alert_threshold(0.5).unwrap();
        assert_eq!(cfg.alert_threshold(), 0.5);
        assert_eq!(PipelineConfig::default().alert_threshold(), 0.7);
    }
}
