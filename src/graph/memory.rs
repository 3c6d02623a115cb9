//! In-memory graph store evaluating category queries over a fixed node/edge set.
//!
//! Loadable from a JSON fixture (`{"nodes": [...], "edges": [...]}`); can
//! inject per-category failures and latency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use super::descriptor::{fallback_id, fallback_label};
use super::{Category, CategoryQuery, GraphStore, Properties, RawRelationshipRow};
use crate::error::{ReportGraphError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureNode {
    pub element_id: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFixture {
    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
    #[serde(default)]
    pub edges: Vec<FixtureEdge>,
}

impl GraphFixture {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    nodes: Vec<FixtureNode>,
    index: HashMap<String, usize>,
    edges: Vec<FixtureEdge>,
    failing: HashSet<Category>,
    latency: Option<Duration>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: GraphFixture) -> Result<Self> {
        let mut store = Self::new();
        for node in fixture.nodes {
            store.insert_node(node);
        }
        for edge in fixture.edges {
            if !store.index.contains_key(&edge.source) || !store.index.contains_key(&edge.target) {
                return Err(ReportGraphError::InvalidInput(format!(
                    "edge {} -[{}]-> {} references an unknown node",
                    edge.source, edge.rel_type, edge.target
                )));
            }
            store.edges.push(edge);
        }
        Ok(store)
    }

    fn insert_node(&mut self, node: FixtureNode) {
        match self.index.get(&node.element_id) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.element_id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn with_node(mut self, element_id: &str, labels: &[&str], properties: serde_json::Value) -> Self {
        let properties = match properties {
            serde_json::Value::Object(map) => map,
            _ => Properties::new(),
        };
        self.insert_node(FixtureNode {
            element_id: element_id.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        });
        self
    }

    /// Panics if either endpoint is unknown (test builder).
    pub fn with_edge(mut self, source: &str, rel_type: &str, target: &str, properties: serde_json::Value) -> Self {
        assert!(self.index.contains_key(source), "unknown node {}", source);
        assert!(self.index.contains_key(target), "unknown node {}", target);
        let properties = match properties {
            serde_json::Value::Object(map) => map,
            _ => Properties::new(),
        };
        self.edges.push(FixtureEdge {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            properties,
        });
        self
    }

    /// Every query for `category` fails.
    pub fn failing(mut self, category: Category) -> Self {
        self.failing.insert(category);
        self
    }

    /// Every query sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn node(&self, element_id: &str) -> Option<&FixtureNode> {
        self.index.get(element_id).map(|&i| &self.nodes[i])
    }

    fn evaluate(&self, q: &CategoryQuery) -> Vec<RawRelationshipRow> {
        let wanted: HashSet<&str> = q.identifiers.iter().map(String::as_str).collect();
        let mut rows = Vec::new();

        for anchor in &self.nodes {
            if rows.len() >= q.limit {
                break;
            }
            if !anchor.labels.iter().any(|l| l == q.anchor.node_type) {
                continue;
            }
            let source_id = match q.anchor.resolve_id(&anchor.element_id, &anchor.properties) {
                Some(id) if wanted.contains(id.as_str()) => id,
                _ => continue,
            };
            let source_label = q.anchor.resolve_label(&anchor.properties).unwrap_or_default();

            for edge in &self.edges {
                if rows.len() >= q.limit {
                    break;
                }
                let other = if edge.source == anchor.element_id {
                    &edge.target
                } else if edge.target == anchor.element_id {
                    &edge.source
                } else {
                    continue;
                };
                let Some(connected) = self.node(other) else {
                    continue;
                };

                let (target_id, target_label) = match q.resolve_target(&connected.labels) {
                    Some(d) => (
                        d.resolve_id(&connected.element_id, &connected.properties),
                        d.resolve_label(&connected.properties),
                    ),
                    None => (
                        Some(fallback_id(&connected.element_id)),
                        Some(fallback_label(&connected.element_id, &connected.properties)),
                    ),
                };

                rows.push(RawRelationshipRow {
                    source_id: source_id.clone(),
                    source_type: q.anchor.node_type.to_string(),
                    source_label: source_label.clone(),
                    relationship_type: edge.rel_type.clone(),
                    target_id: target_id.unwrap_or_default(),
                    target_type: connected.labels.first().cloned().unwrap_or_default(),
                    target_label: target_label.unwrap_or_default(),
                    relationship_properties: edge.properties.clone(),
                });
            }
        }

        rows
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn run_category_query(&self, q: &CategoryQuery) -> Result<Vec<RawRelationshipRow>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&q.category) {
            return Err(ReportGraphError::Graph(format!(
                "{} query unavailable",
                q.category
            )));
        }
        Ok(self.evaluate(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_store() -> InMemoryGraphStore {
        InMemoryGraphStore::new()
            .with_node("1", &["Company"], json!({"ticker": "AAPL", "name": "Apple Inc."}))
            .with_node("2", &["Industry"], json!({"name": "Technology"}))
            .with_node("3", &["Theme"], json!({"name": "AI"}))
            .with_node("4", &["TargetPrice"], json!({"value": 250, "currency": "USD"}))
            .with_node("5", &["Report"], json!({"title": "Q3 review"}))
            .with_edge("1", "OPERATES_IN", "2", json!({"confidence_score": 0.9}))
            .with_edge("1", "HAS_TARGET_PRICE", "4", json!({}))
            .with_edge("5", "MENTIONS", "1", json!({}))
            .with_edge("3", "RELATED_TO", "2", json!({}))
    }

    #[tokio::test]
    async fn test_company_query_expands_both_directions() {
        let store = sample_store();
        let q = CategoryQuery::build(Category::Company, &ids(&["AAPL"]), 100);
        let rows = store.run_category_query(&q).await.unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].target_id, "Technology");
        assert_eq!(rows[0].target_type, "Industry");
        assert_eq!(rows[0].relationship_properties["confidence_score"], json!(0.9));

        assert_eq!(rows[1].target_id, "TP_4");
        assert_eq!(rows[1].target_label, "Target: 250 USD");

        // Incoming edge from an unmapped label uses the fallback.
        assert_eq!(rows[2].relationship_type, "MENTIONS");
        assert_eq!(rows[2].target_type, "Report");
        assert_eq!(rows[2].target_id, "5");
        assert_eq!(rows[2].target_label, "5");
        assert!(rows.iter().all(|r| r.source_id == "AAPL" && r.source_label == "Apple Inc."));
    }

    #[tokio::test]
    async fn test_row_limit_enforced() {
        let store = sample_store();
        let q = CategoryQuery::build(Category::Company, &ids(&["AAPL"]), 2);
        let rows = store.run_category_query(&q).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_identifier_yields_nothing() {
        let store = sample_store();
        let q = CategoryQuery::build(Category::Theme, &ids(&["Robotics"]), 10);
        assert!(store.run_category_query(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = sample_store().failing(Category::Industry);
        let q = CategoryQuery::build(Category::Industry, &ids(&["Technology"]), 10);
        let err = store.run_category_query(&q).await.unwrap_err();
        assert!(matches!(err, ReportGraphError::Graph(_)));
    }

    #[test]
    fn test_fixture_rejects_dangling_edge() {
        let fixture: GraphFixture = serde_json::from_value(json!({
            "nodes": [{"element_id": "1", "labels": ["Theme"], "properties": {"name": "AI"}}],
            "edges": [{"source": "1", "target": "404", "type": "RELATED_TO"}]
        }))
        .unwrap();
        assert!(matches!(
            InMemoryGraphStore::from_fixture(fixture),
            Err(ReportGraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fixture_from_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"nodes": [{"element_id": "1", "labels": ["Theme"], "properties": {"name": "AI"}}]}"#,
        )
        .unwrap();
        let fixture = GraphFixture::from_path(&path).unwrap();
        assert_eq!(fixture.nodes.len(), 1);
        assert!(fixture.edges.is_empty());
        assert!(InMemoryGraphStore::from_fixture(fixture).is_ok());
    }
}
