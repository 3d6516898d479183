//! Source collectors: the capability the pipeline pulls raw records through.
//!
//! Each adapter is bound to one platform and chosen when the pipeline is
//! composed. A collector error only ever costs the pipeline that source's
//! records for the current cycle.

mod error;
mod jsonl;
mod memory;

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use vipwatch_core::{Platform, RawRecord};

pub use error::CollectionError;
pub use jsonl::JsonlCollector;
pub use memory::StaticCollector;

#[cfg(feature = "http")]
pub use http::HttpFeedCollector;

/// Something that can be asked for up to `limit` raw records.
#[async_trait]
pub trait SourceCollector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Human-readable name used in logs and cycle reports.
    fn name(&self) -> &str;

    async fn fetch(&self, limit: usize) -> Result<Vec<RawRecord>, CollectionError>;
}
