use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("stored row {id} is malformed: {detail}")]
    Corrupt { id: String, detail: String },

    #[error("timestamp {timestamp} for {id} is outside the storable range")]
    InvalidTimestamp { id: String, timestamp: String },

    #[error("threat score {score} for {id} is outside [0, 1]")]
    InvalidScore { id: String, score: f64 },

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
