use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    node_key, AggregationResult, GraphNode, GraphRelationship, GraphStats, Properties,
    RawRelationshipRow, RelationshipKey, TargetPropertySource,
};

/// (source_id, target_id, relationship_type, source_type, target_type);
/// the type slots stay empty under `RelationshipKey::Ids`.
type RelIdentity = (String, String, String, String, String);

/// Single-pass merge of validated rows into canonical nodes and relationships.
///
/// One instance per aggregation call; never shared between requests.
#[derive(Debug)]
pub struct NodeAggregator {
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    relationships: Vec<GraphRelationship>,
    seen: HashSet<RelIdentity>,
    target_properties: TargetPropertySource,
    relationship_key: RelationshipKey,
}

impl Default for NodeAggregator {
    fn default() -> Self {
        Self::new(TargetPropertySource::default(), RelationshipKey::default())
    }
}

impl NodeAggregator {
    pub fn new(target_properties: TargetPropertySource, relationship_key: RelationshipKey) -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            relationships: Vec::new(),
            seen: HashSet::new(),
            target_properties,
            relationship_key,
        }
    }

    /// Register a node unless its `type:id` key is known (first write wins).
    fn register_node(&mut self, id: &str, label: &str, node_type: &str, properties: Properties) {
        let key = node_key(node_type, id);
        if self.node_index.contains_key(&key) {
            return;
        }
        self.node_index.insert(key, self.nodes.len());
        self.nodes.push(GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            node_type: node_type.to_string(),
            properties,
        });
    }

    fn identity(&self, row: &RawRelationshipRow) -> RelIdentity {
        let (source_type, target_type) = match self.relationship_key {
            RelationshipKey::Ids => (String::new(), String::new()),
            RelationshipKey::Typed => (row.source_type.clone(), row.target_type.clone()),
        };
        (
            row.source_id.clone(),
            row.target_id.clone(),
            row.relationship_type.clone(),
            source_type,
            target_type,
        )
    }

    /// Merge one row. Returns `true` if it added a new relationship.
    pub fn add_row(&mut self, row: RawRelationshipRow) -> bool {
        self.register_node(&row.source_id, &row.source_label, &row.source_type, Properties::new());

        let target_props = match self.target_properties {
            TargetPropertySource::Relationship => row.relationship_properties.clone(),
            TargetPropertySource::Empty => Properties::new(),
        };
        self.register_node(&row.target_id, &row.target_label, &row.target_type, target_props);

        if !self.seen.insert(self.identity(&row)) {
            return false;
        }

        self.relationships.push(GraphRelationship {
            source_id: row.source_id,
            source_type: row.source_type,
            source_label: row.source_label,
            target_id: row.target_id,
            target_type: row.target_type,
            target_label: row.target_label,
            relationship_type: row.relationship_type,
            properties: row.relationship_properties,
        });
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Consume the aggregator; nodes and relationships keep insertion order.
    pub fn finish(self) -> AggregationResult {
        let mut node_types: BTreeMap<String, usize> = BTreeMap::new();
        for node in &self.nodes {
            *node_types.entry(node.node_type.clone()).or_insert(0) += 1;
        }

        AggregationResult {
            stats: GraphStats {
                node_count: self.nodes.len(),
                relationship_count: self.relationships.len(),
                node_types,
            },
            nodes: self.nodes,
            relationships: self.relationships,
        }
    }
}
