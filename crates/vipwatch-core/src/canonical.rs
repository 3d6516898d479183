//! Raw collector records and their normalization into [`CanonicalItem`]s.
//!
//! Collectors hand over loosely-shaped records: ids may be numbers or
//! strings, timestamps may be RFC 3339, naive UTC, or epoch seconds or
//! milliseconds, and most
//! fields can be missing. Canonicalization fills documented defaults and
//! rejects only records without content or without a native id.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::item::{CanonicalItem, Engagement, Platform, ThreatCategory};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalizationError {
    #[error("record has no native id")]
    MissingNativeId,

    #[error("record {id} has no content")]
    EmptyContent { id: String },
}

/// A native id as sent by the source: numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

/// Epoch values at or above this are read as milliseconds (1e11 seconds is
/// past the year 5000).
const EPOCH_MILLIS_FROM: i64 = 100_000_000_000;

/// A source timestamp: epoch seconds, epoch milliseconds, or a date-time string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(i64),
    Text(String),
}

impl RawTimestamp {
    /// Interpret the timestamp as UTC. `None` if it cannot be parsed or
    /// falls outside the years 1970 to 9999.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let parsed = match self {
            Self::Epoch(n) if *n >= EPOCH_MILLIS_FROM => DateTime::from_timestamp_millis(*n),
            Self::Epoch(secs) => DateTime::from_timestamp(*secs, 0),
            Self::Text(s) => {
                let s = s.trim();
                match DateTime::parse_from_rfc3339(s) {
                    Ok(dt) => Some(dt.with_timezone(&Utc)),
                    Err(_) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc()),
                }
            }
        };
        parsed.filter(|dt| (1970..=9999).contains(&dt.year()))
    }
}

/// One record as yielded by a source collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "id")]
    pub native_id: Option<RawId>,
    /// Post body for single-field sources.
    #[serde(default, alias = "content")]
    pub text: Option<String>,
    /// Headline for forum and issue-tracker sources.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "selftext")]
    pub body: Option<String>,
    #[serde(default, alias = "author")]
    pub author_username: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub likes: Option<i64>,
    #[serde(default)]
    pub shares: Option<i64>,
    #[serde(default)]
    pub comments: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl RawRecord {
    /// Convenience constructor for a single-field text record.
    pub fn text(native_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            native_id: Some(RawId::Text(native_id.into())),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn native_id(&self) -> Option<String> {
        let id = match self.native_id.as_ref()? {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s.trim().to_string(),
        };
        (!id.is_empty()).then_some(id)
    }

    fn content(&self) -> String {
        if let Some(text) = non_blank(self.text.as_deref()) {
            return text.to_string();
        }
        match (
            non_blank(self.title.as_deref()),
            non_blank(self.body.as_deref()),
        ) {
            (Some(title), Some(body)) => format!("{title}\n\n{body}"),
            (Some(only), None) | (None, Some(only)) => only.to_string(),
            (None, None) => String::new(),
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn count(n: Option<i64>) -> u64 {
    n.map(|v| v.max(0) as u64).unwrap_or(0)
}

/// Normalize a raw record, stamping `ingested_at` with the current time.
pub fn canonicalize(
    platform: Platform,
    raw: &RawRecord,
) -> Result<CanonicalItem, CanonicalizationError> {
    canonicalize_at(platform, raw, Utc::now())
}

/// Normalize a raw record using `now` as ingestion time and as the fallback
/// source timestamp.
pub fn canonicalize_at(
    platform: Platform,
    raw: &RawRecord,
    now: DateTime<Utc>,
) -> Result<CanonicalItem, CanonicalizationError> {
    let native_id = raw
        .native_id()
        .ok_or(CanonicalizationError::MissingNativeId)?;
    let id = CanonicalItem::make_id(platform, &native_id);

    let content = raw.content();
    if content.is_empty() {
        return Err(CanonicalizationError::EmptyContent { id });
    }

    let timestamp = raw
        .timestamp
        .as_ref()
        .and_then(RawTimestamp::to_utc)
        .unwrap_or(now);

    Ok(CanonicalItem {
        id,
        platform,
        content,
        author_username: non_blank(raw.author_username.as_deref()).map(str::to_string),
        author_id: non_blank(raw.author_id.as_deref()).map(str::to_string),
        timestamp,
        url: non_blank(raw.url.as_deref()).map(str::to_string),
        engagement: Engagement {
            likes: count(raw.likes),
            shares: count(raw.shares),
            comments: count(raw.comments),
        },
        metadata: raw
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        threat_score: 0.0,
        threat_category: ThreatCategory::Unknown,
        ingested_at: now,
    })
}

/// Canonicalize a batch, returning the items and the number of dropped records.
pub fn canonicalize_batch(platform: Platform, records: &[RawRecord]) -> (Vec<CanonicalItem>, usize) {
    let now = Utc::now();
    let mut items = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for raw in records {
        match canonicalize_at(platform, raw, now) {
            Ok(item) => items.push(item),
            Err(err) => {
                debug!(platform = %platform, error = %err, "dropping raw record");
                dropped += 1;
            }
        }
    }

    (items, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 3, 15, 0, 0).unwrap()
    }

    #[test]
    fn id_is_deterministic_across_ingestions() {
        let raw = RawRecord::text("42", "hello senator");
        let a = canonicalize(Platform::Twitter, &raw).unwrap();
        let b = canonicalize(Platform::Twitter, &raw).unwrap();
        assert_eq!(a.id, "twitter_42");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn numeric_native_id_is_accepted() {
        let raw: RawRecord =
            serde_json::from_str(r#"{"id": 987654321, "text": "a post"}"#).unwrap();
        let item = canonicalize(Platform::Github, &raw).unwrap();
        assert_eq!(item.id, "github_987654321");
    }

    #[test]
    fn same_native_id_on_different_platforms_differs() {
        let raw = RawRecord::text("7", "x marks the spot");
        let tw = canonicalize(Platform::Twitter, &raw).unwrap();
        let rd = canonicalize(Platform::Reddit, &raw).unwrap();
        assert_ne!(tw.id, rd.id);
    }

    #[test]
    fn missing_native_id_is_rejected() {
        let raw = RawRecord {
            text: Some("content".into()),
            ..Default::default()
        };
        assert_eq!(
            canonicalize(Platform::Twitter, &raw),
            Err(CanonicalizationError::MissingNativeId)
        );

        let blank = RawRecord::text("   ", "content");
        assert_eq!(
            canonicalize(Platform::Twitter, &blank),
            Err(CanonicalizationError::MissingNativeId)
        );
    }

    #[test]
    fn blank_content_is_rejected() {
        let raw = RawRecord::text("1", "   \n\t ");
        assert_eq!(
            canonicalize(Platform::Twitter, &raw),
            Err(CanonicalizationError::EmptyContent {
                id: "twitter_1".into()
            })
        );
    }

    #[test]
    fn title_and_body_are_joined() {
        let raw = RawRecord {
            native_id: Some(RawId::Text("abc".into())),
            title: Some("Senator visit".into()),
            body: Some("Details inside".into()),
            ..Default::default()
        };
        let item = canonicalize(Platform::Reddit, &raw).unwrap();
        assert_eq!(item.content, "Senator visit\n\nDetails inside");

        let title_only = RawRecord {
            body: Some("  ".into()),
            ..raw.clone()
        };
        let item = canonicalize(Platform::Reddit, &title_only).unwrap();
        assert_eq!(item.content, "Senator visit");
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let now = fixed_now();
        let raw = RawRecord::text("1", "plain post");
        let item = canonicalize_at(Platform::Telegram, &raw, now).unwrap();

        assert_eq!(item.author_username, None);
        assert_eq!(item.author_id, None);
        assert_eq!(item.url, None);
        assert_eq!(item.engagement, Engagement::default());
        assert_eq!(item.metadata, serde_json::json!({}));
        assert_eq!(item.timestamp, now);
        assert_eq!(item.ingested_at, now);
        assert_eq!(item.threat_score, 0.0);
        assert_eq!(item.threat_category, ThreatCategory::Unknown);
    }

    #[test]
    fn negative_engagement_clamps_to_zero() {
        let raw = RawRecord {
            likes: Some(-3),
            shares: Some(5),
            ..RawRecord::text("1", "post")
        };
        let item = canonicalize(Platform::Reddit, &raw).unwrap();
        assert_eq!(item.engagement.likes, 0);
        assert_eq!(item.engagement.shares, 5);
        assert_eq!(item.engagement.comments, 0);
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 3, 12, 0, 0).unwrap();
        let cases = [
            RawTimestamp::Text("2025-09-03T12:00:00Z".into()),
            RawTimestamp::Text("2025-09-03T14:00:00+02:00".into()),
            RawTimestamp::Text("2025-09-03 12:00:00".into()),
            RawTimestamp::Text("2025-09-03T12:00:00".into()),
            RawTimestamp::Epoch(expected.timestamp()),
        ];
        for ts in cases {
            assert_eq!(ts.to_utc(), Some(expected), "parsing {ts:?}");
        }
        assert_eq!(RawTimestamp::Text("yesterday".into()).to_utc(), None);
    }

    #[test]
    fn epoch_milliseconds_detected() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 3, 12, 0, 0).unwrap();
        let millis = RawTimestamp::Epoch(expected.timestamp_millis());
        assert_eq!(millis.to_utc(), Some(expected));
    }

    #[test]
    fn implausible_years_rejected() {
        for ts in [
            RawTimestamp::Epoch(-62_300_000_000),
            RawTimestamp::Epoch(-1),
            RawTimestamp::Epoch(i64::MAX),
            RawTimestamp::Text("+57643-12-21 00:00:00".into()),
            RawTimestamp::Text("1969-12-31 23:59:59".into()),
        ] {
            assert_eq!(ts.to_utc(), None, "{ts:?}");
        }

        let now = fixed_now();
        let raw = RawRecord {
            timestamp: Some(RawTimestamp::Epoch(-62_300_000_000)),
            ..RawRecord::text("1", "post")
        };
        assert_eq!(canonicalize_at(Platform::Twitter, &raw, now).unwrap().timestamp, now);
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_now() {
        let now = fixed_now();
        let raw = RawRecord {
            timestamp: Some(RawTimestamp::Text("not a date".into())),
            ..RawRecord::text("1", "post")
        };
        let item = canonicalize_at(Platform::Twitter, &raw, now).unwrap();
        assert_eq!(item.timestamp, now);
    }

    #[test]
    fn field_aliases_deserialize() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"id": "t3_x", "title": "Hi", "selftext": "there", "author": "[deleted]",
                "created_at": 1756900800, "metadata": {"subreddit": "politics"}}"#,
        )
        .unwrap();
        let item = canonicalize(Platform::Reddit, &raw).unwrap();
        assert_eq!(item.content, "Hi\n\nthere");
        assert_eq!(item.author_username.as_deref(), Some("[deleted]"));
        assert_eq!(item.metadata["subreddit"], "politics");
        assert_eq!(item.timestamp.timestamp(), 1756900800);
    }

    #[test]
    fn batch_counts_dropped_records() {
        let records = vec![
            RawRecord::text("1", "kept"),
            RawRecord::text("2", ""),
            RawRecord::default(),
            RawRecord::text("3", "also kept"),
        ];
        let (items, dropped) = canonicalize_batch(Platform::Twitter, &records);
        assert_eq!(items.len(), 2);
        assert_eq!(dropped, 2);
    }
}
