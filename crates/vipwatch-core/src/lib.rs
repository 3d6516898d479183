//! Core types for vipwatch: the canonical item, raw-record normalization,
//! the persisted table schema, and pipeline configuration.

pub mod canonical;
pub mod config;
pub mod item;
pub mod schema;

pub use canonical::{
    CanonicalizationError, RawId, RawRecord, RawTimestamp, canonicalize, canonicalize_at,
    canonicalize_batch,
};
pub use config::{ConfigError, PipelineConfig, ScoringConfig, SeverityBands, parse_keywords};
pub use item::{Action, CanonicalItem, Engagement, ParseError, Platform, Severity, ThreatCategory};
pub use schema::posts;
