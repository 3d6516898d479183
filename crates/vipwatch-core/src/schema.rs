/// Arrow schema of the persisted `posts` table, published for external readers.
pub mod posts {
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    pub const TABLE: &str = "posts";

    /// Column names in storage order.
    pub const COLUMNS: &[&str] = &[
        "id",
        "platform",
        "content",
        "author_username",
        "author_id",
        "timestamp",
        "url",
        "likes",
        "shares",
        "comments",
        "metadata",
        "threat_score",
        "threat_category",
        "ingested_at",
        "created_at",
    ];

    /// Schema for the `posts` table.
    ///
    /// Timestamps are UTC wall-clock values without a zone annotation,
    /// matching DuckDB's `TIMESTAMP` type. `metadata` is JSON text.
    pub fn schema() -> Schema {
        let ts = || DataType::Timestamp(TimeUnit::Microsecond, None);
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("platform", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("author_username", DataType::Utf8, true),
            Field::new("author_id", DataType::Utf8, true),
            Field::new("timestamp", ts(), false),
            Field::new("url", DataType::Utf8, true),
            Field::new("likes", DataType::Int64, false),
            Field::new("shares", DataType::Int64, false),
            Field::new("comments", DataType::Int64, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("threat_score", DataType::Float64, false),
            Field::new("threat_category", DataType::Utf8, false),
            Field::new("ingested_at", ts(), false),
            Field::new("created_at", ts(), false),
        ])
    }
}
