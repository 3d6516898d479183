//! Storage layer: a deduplicating DuckDB table of canonical items.

mod duck;
mod error;

pub use duck::{DuckStore, InsertOutcome, ScoreUpdate, StoreStats, UpdateOutcome};
pub use error::StoreError;
