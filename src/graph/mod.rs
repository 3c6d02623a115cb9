//! Knowledge graph module: report identifiers, fan-out graph queries and
//! aggregation into deduplicated visualization data.
//!
//! Flow: identifiers -> dispatcher (one query per category, concurrent) ->
//! assembler (row validation, type filter) -> aggregator (canonical nodes,
//! relationships, stats).

mod aggregator;
mod assembler;
mod descriptor;
mod dispatcher;
mod identifiers;
mod memory;
mod neo4j;
mod store;

pub use aggregator::NodeAggregator;
pub use assembler::{assemble, validate_row, AssembledGraph, RowWarning};
pub use descriptor::{descriptor_for, CategoryQuery, IdSource, LabelSource, NodeDescriptor, SyntheticId};
pub use dispatcher::{dispatch_queries, CategoryOutcome, DispatchReport};
pub use identifiers::{extract_identifiers, normalize_company_name, IdentifierSet};
pub use memory::{GraphFixture, InMemoryGraphStore};
pub use neo4j::{GraphClient, Neo4jGraphStore};
pub use store::GraphStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ReportGraphError, Result};

/// Neo4j from config, or an in-memory store when a fixture file is given.
pub async fn open_store(config: &Config, fixture: Option<&Path>) -> Result<Arc<dyn GraphStore>> {
    if let Some(path) = fixture {
        let fixture = GraphFixture::from_path(path)?;
        log::info!(
            "Using graph fixture {} ({} nodes, {} edges)",
            path.display(),
            fixture.nodes.len(),
            fixture.edges.len()
        );
        return Ok(Arc::new(InMemoryGraphStore::from_fixture(fixture)?));
    }

    let password = config
        .neo4j_password()
        .map_err(|e| ReportGraphError::Config(e.to_string()))?;
    let client = GraphClient::connect(&config.neo4j, &password).await?;
    Ok(Arc::new(Neo4jGraphStore::new(client)))
}

/// Free-form property map carried on nodes and relationships.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Entity categories that anchor graph queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Company,
    Industry,
    Theme,
}

impl Category {
    /// Dispatch order; results are combined in this order.
    pub const ALL: [Category; 3] = [Category::Company, Category::Industry, Category::Theme];

    /// Graph label of anchor nodes for this category.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Company => "Company",
            Category::Industry => "Industry",
            Category::Theme => "Theme",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row as projected by a category query.
///
/// Fields are plain strings: the graph store maps missing values to empty
/// strings and the assembler rejects such rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRelationshipRow {
    pub source_id: String,
    pub source_type: String,
    pub source_label: String,
    pub relationship_type: String,
    pub target_id: String,
    pub target_type: String,
    pub target_label: String,
    #[serde(default)]
    pub relationship_properties: Properties,
}

/// Canonical node, unique per `type:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub properties: Properties,
}

impl GraphNode {
    /// Composite key used for identity (`Type:id`).
    pub fn key(&self) -> String {
        node_key(&self.node_type, &self.id)
    }
}

pub(crate) fn node_key(node_type: &str, id: &str) -> String {
    format!("{}:{}", node_type, id)
}

/// Canonical relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub source_id: String,
    pub source_type: String,
    pub source_label: String,
    pub target_id: String,
    pub target_type: String,
    pub target_label: String,
    pub relationship_type: String,
    pub properties: Properties,
}

/// Summary counts over an aggregation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub relationship_count: usize,
    pub node_types: BTreeMap<String, usize>,
}

/// Final visualization payload: `{nodes, relationships, stats}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub stats: GraphStats,
}

/// Where a target-only node gets its properties from.
///
/// Graph rows carry no node properties for the connected side, so the
/// default reuses the relationship's properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPropertySource {
    #[default]
    Relationship,
    Empty,
}

/// Identity used to deduplicate relationships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKey {
    /// (source_id, target_id, relationship_type)
    #[default]
    Ids,
    /// Also includes both endpoint types, so equal ids of different types stay distinct.
    Typed,
}

/// Per-invocation knobs, passed in by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationOptions {
    pub row_limit: usize,
    pub include_types: Option<Vec<String>>,
    pub target_properties: TargetPropertySource,
    pub relationship_key: RelationshipKey,
    pub timeout_ms: u64,
    pub persist_entities: bool,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            row_limit: 500,
            include_types: None,
            target_properties: TargetPropertySource::default(),
            relationship_key: RelationshipKey::default(),
            timeout_ms: 30_000,
            persist_entities: true,
        }
    }
}
