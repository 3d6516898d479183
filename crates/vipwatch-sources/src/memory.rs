use async_trait::async_trait;
use vipwatch_core::{Platform, RawRecord};

use crate::{CollectionError, SourceCollector};

/// Serves a fixed set of records; every fetch returns the first `limit`.
pub struct StaticCollector {
    platform: Platform,
    name: String,
    records: Vec<RawRecord>,
}

impl StaticCollector {
    pub fn new(platform: Platform, records: Vec<RawRecord>) -> Self {
        Self {
            platform,
            name: format!("static:{platform}"),
            records,
        }
    }
}

#[async_trait]
impl SourceCollector for StaticCollector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawRecord>, CollectionError> {
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_respects_limit() {
        let c = StaticCollector::new(
            Platform::Reddit,
            vec![RawRecord::text("1", "a"), RawRecord::text("2", "b")],
        );
        assert_eq!(c.fetch(1).await.unwrap().len(), 1);
        assert_eq!(c.fetch(10).await.unwrap().len(), 2);
        assert_eq!(c.name(), "static:reddit");
        assert_eq!(c.platform(), Platform::Reddit);
    }
}
