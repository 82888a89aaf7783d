//! Knowledge Sources
//!
//! Encyclopedia backends for the lookup tool.

mod mock;
mod wikipedia;

pub use mock::MockKnowledgeSource;
pub use wikipedia::{WikipediaClient, WikipediaConfig};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Summary;

/// Knowledge source trait (Strategy pattern)
///
/// Implement this for each encyclopedia backend.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Up to `limit` summaries for `query`, best match first
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<Summary>>;

    /// Source name
    fn name(&self) -> &str;
}
