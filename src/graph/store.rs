use async_trait::async_trait;

use super::{CategoryQuery, RawRelationshipRow};
use crate::error::Result;

/// Read-only access to the knowledge graph.
///
/// Implementations run one category query: match anchors whose identifier
/// is in `query.identifiers`, expand one hop in either direction, project
/// rows using the query's descriptors and return at most `query.limit` rows.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run_category_query(&self, query: &CategoryQuery) -> Result<Vec<RawRelationshipRow>>;
}
