//! Neo4j-backed graph store.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Row};
use serde_json::Value;

use super::{CategoryQuery, GraphStore, Properties, RawRelationshipRow};
use crate::config::Neo4jConfig;
use crate::error::Result;

/// Thin wrapper around neo4rs::Graph providing connection setup.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given settings and password.
    pub async fn connect(config: &Neo4jConfig, password: &str) -> Result<Self> {
        let bolt_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(password)
            .fetch_size(config.fetch_size)
            .max_connections(config.max_connections)
            .build()?;
        let graph = Graph::connect(bolt_config).await?;
        log::info!("Connected to graph store at {}", config.uri);
        Ok(Self { graph })
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

/// Runs category queries as parameterized Cypher reads.
#[derive(Clone)]
pub struct Neo4jGraphStore {
    client: GraphClient,
}

impl Neo4jGraphStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn run_category_query(&self, q: &CategoryQuery) -> Result<Vec<RawRelationshipRow>> {
        let cypher = query(&q.cypher)
            .param("ids", q.identifiers.clone())
            .param("limit", q.limit as i64);

        let mut rows = Vec::new();
        let mut stream = self.client.inner().execute(cypher).await?;
        while let Some(row) = stream.next().await? {
            rows.push(row_to_raw(&row));
        }
        Ok(rows)
    }
}

/// Null or missing columns become empty strings; the assembler rejects them.
fn row_to_raw(row: &Row) -> RawRelationshipRow {
    let text = |key: &str| row.get::<String>(key).unwrap_or_default();
    let relationship_properties = decode_properties(row.get::<Value>("rel_properties"));

    RawRelationshipRow {
        source_id: text("source_id"),
        source_type: text("source_type"),
        source_label: text("source_label"),
        relationship_type: text("relationship_type"),
        target_id: text("target_id"),
        target_type: text("target_type"),
        target_label: text("target_label"),
        relationship_properties,
    }
}

fn decode_properties<E: std::fmt::Display>(decoded: std::result::Result<Value, E>) -> Properties {
    match decoded {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Properties::new(),
        Ok(other) => {
            log::warn!("Relationship properties are not a map, dropping them: {}", other);
            Properties::new()
        }
        Err(e) => {
            log::warn!("Failed to decode relationship properties, dropping them: {}", e);
            Properties::new()
        }
    }
}
