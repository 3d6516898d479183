use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};
use vipwatch_core::{Platform, RawRecord};

use crate::{CollectionError, SourceCollector};

/// Reads raw records from a JSON-lines export, one record per line.
///
/// The file is re-read on every fetch, so an export that is appended to
/// between cycles is picked up. Lines that fail to parse are skipped.
pub struct JsonlCollector {
    platform: Platform,
    name: String,
    path: PathBuf,
}

impl JsonlCollector {
    pub fn new(platform: Platform, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            platform,
            name: format!("{platform}:{}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl SourceCollector for JsonlCollector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawRecord>, CollectionError> {
        let input = tokio::fs::read_to_string(&self.path).await?;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (n, line) in input.lines().enumerate() {
            if records.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    debug!(source = %self.name, line = n + 1, error = %e, "skipping malformed line");
                }
            }
        }
        if skipped > 0 {
            warn!(source = %self.name, skipped, "malformed lines in export");
        }
        Ok(records)
    }
}
