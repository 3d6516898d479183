//! The canonical item and the closed vocabularies attached to it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown platform: {0}")]
    Platform(String),
    #[error("unknown threat category: {0}")]
    Category(String),
}

/// Source platform tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Short-form social posts.
    Twitter,
    /// Forum submissions.
    Reddit,
    /// Issue-tracker entries.
    Github,
    /// Public channel messages.
    Telegram,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Reddit,
        Platform::Github,
        Platform::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Reddit => "reddit",
            Self::Github => "github",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ParseError::Platform(s.to_string()))
    }
}

/// Intent category assigned to an item.
///
/// The first six variants are the classifier's closed output set, in the
/// fixed order used for probability vectors. `Unknown` marks an item that
/// has not been scored yet and is never produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatCategory {
    Safe,
    Harassment,
    Threat,
    Doxxing,
    Misinformation,
    Spam,
    #[default]
    Unknown,
}

impl ThreatCategory {
    /// Classifier output categories, in probability-vector order.
    pub const CLASSES: [ThreatCategory; 6] = [
        ThreatCategory::Safe,
        ThreatCategory::Harassment,
        ThreatCategory::Threat,
        ThreatCategory::Doxxing,
        ThreatCategory::Misinformation,
        ThreatCategory::Spam,
    ];

    /// Categories whose probability mass counts toward the threat score.
    pub const MALICIOUS: [ThreatCategory; 4] = [
        ThreatCategory::Harassment,
        ThreatCategory::Threat,
        ThreatCategory::Doxxing,
        ThreatCategory::Misinformation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Harassment => "harassment",
            Self::Threat => "threat",
            Self::Doxxing => "doxxing",
            Self::Misinformation => "misinformation",
            Self::Spam => "spam",
            Self::Unknown => "unknown",
        }
    }

    /// Position in [`CLASSES`](Self::CLASSES), or `None` for `Unknown`.
    pub fn class_index(&self) -> Option<usize> {
        Self::CLASSES.iter().position(|c| c == self)
    }

    pub fn is_malicious(&self) -> bool {
        Self::MALICIOUS.contains(self)
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatCategory {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::CLASSES
            .into_iter()
            .chain([Self::Unknown])
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| ParseError::Category(s.to_string()))
    }
}

/// Severity tier. Ordering follows urgency: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// The action recommended for items at this tier.
    pub fn action(&self) -> Action {
        match self {
            Self::Low => Action::Dismiss,
            Self::Medium => Action::Flag,
            Self::High => Action::HumanReview,
            Self::Critical => Action::AutoReport,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Dismiss,
    Flag,
    HumanReview,
    AutoReport,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dismiss => "dismiss",
            Self::Flag => "flag",
            Self::HumanReview => "human_review",
            Self::AutoReport => "auto_report",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engagement counters reported by the source. Missing counts are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
}

/// A collected post in uniform shape, the unit of analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// `"{platform}_{native_id}"`. Primary key of the store.
    pub id: String,
    pub platform: Platform,
    pub content: String,
    pub author_username: Option<String>,
    pub author_id: Option<String>,
    /// When the content was created at the source.
    pub timestamp: DateTime<Utc>,
    pub url: Option<String>,
    pub engagement: Engagement,
    /// Source-specific attributes, passed through untouched.
    pub metadata: serde_json::Value,
    /// 0.0 until scored.
    pub threat_score: f64,
    pub threat_category: ThreatCategory,
    /// Set when the store first persisted the item.
    pub ingested_at: DateTime<Utc>,
}

impl CanonicalItem {
    /// Build the stable identity for a native item.
    pub fn make_id(platform: Platform, native_id: &str) -> String {
        format!("{}_{}", platform.as_str(), native_id)
    }

    pub fn is_scored(&self) -> bool {
        self.threat_category != ThreatCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("Reddit".parse::<Platform>(), Ok(Platform::Reddit));
        assert_eq!(" github ".parse::<Platform>(), Ok(Platform::Github));
        assert!(matches!(
            "myspace".parse::<Platform>(),
            Err(ParseError::Platform(_))
        ));
    }

    #[test]
    fn category_string_forms_match_storage() {
        for cat in ThreatCategory::CLASSES {
            assert_eq!(cat.as_str().parse::<ThreatCategory>(), Ok(cat));
        }
        assert_eq!(
            "unknown".parse::<ThreatCategory>(),
            Ok(ThreatCategory::Unknown)
        );
        assert_eq!(ThreatCategory::default(), ThreatCategory::Unknown);
    }

    #[test]
    fn malicious_set_excludes_safe_and_spam() {
        assert!(!ThreatCategory::Safe.is_malicious());
        assert!(!ThreatCategory::Spam.is_malicious());
        assert!(ThreatCategory::Doxxing.is_malicious());
        assert_eq!(ThreatCategory::Unknown.class_index(), None);
        assert_eq!(ThreatCategory::Spam.class_index(), Some(5));
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.action(), Action::AutoReport);
        assert_eq!(Severity::Low.action().as_str(), "dismiss");
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&Action::HumanReview).unwrap();
        assert_eq!(json, "\"human_review\"");
    }

    #[test]
    fn make_id_is_platform_prefixed() {
        assert_eq!(
            CanonicalItem::make_id(Platform::Twitter, "1234"),
            "twitter_1234"
        );
    }
}
