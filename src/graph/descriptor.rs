//! Node descriptors: how each node type yields a business id and a label.
//!
//! The table is resolved once per category query. The Cypher CASE
//! expressions and the in-memory store are both generated from it.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{Category, Properties};

/// Prefix + graph element id, for nodes without a natural business key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticId {
    pub prefix: &'static str,
}

impl SyntheticId {
    pub fn synthesize(&self, element_id: &str) -> String {
        format!("{}{}", self.prefix, element_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Property(&'static str),
    Synthetic(SyntheticId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Property(&'static str),
    /// `prefix + field` (or `default` when the field is null), then an
    /// optional `' ' + suffix_field` (or its default).
    Format {
        prefix: &'static str,
        field: &'static str,
        default: Option<&'static str>,
        suffix: Option<(&'static str, &'static str)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub node_type: &'static str,
    pub id: IdSource,
    pub label: LabelSource,
}

const COMPANY: NodeDescriptor = NodeDescriptor {
    node_type: "Company",
    id: IdSource::Property("ticker"),
    label: LabelSource::Property("name"),
};

const INDUSTRY: NodeDescriptor = NodeDescriptor {
    node_type: "Industry",
    id: IdSource::Property("name"),
    label: LabelSource::Property("name"),
};

const THEME: NodeDescriptor = NodeDescriptor {
    node_type: "Theme",
    id: IdSource::Property("name"),
    label: LabelSource::Property("name"),
};

const TARGET_PRICE: NodeDescriptor = NodeDescriptor {
    node_type: "TargetPrice",
    id: IdSource::Synthetic(SyntheticId { prefix: "TP_" }),
    label: LabelSource::Format {
        prefix: "Target: ",
        field: "value",
        default: None,
        suffix: Some(("currency", "KRW")),
    },
};

const OPINION: NodeDescriptor = NodeDescriptor {
    node_type: "Opinion",
    id: IdSource::Synthetic(SyntheticId { prefix: "OP_" }),
    label: LabelSource::Format {
        prefix: "Opinion: ",
        field: "rating",
        default: Some("N/A"),
        suffix: None,
    },
};

const COMPANY_TARGETS: [NodeDescriptor; 5] = [COMPANY, INDUSTRY, THEME, TARGET_PRICE, OPINION];
const CLASSIFIER_TARGETS: [NodeDescriptor; 3] = [COMPANY, INDUSTRY, THEME];

/// Descriptor of a category's anchor nodes.
pub fn descriptor_for(category: Category) -> &'static NodeDescriptor {
    match category {
        Category::Company => &COMPANY,
        Category::Industry => &INDUSTRY,
        Category::Theme => &THEME,
    }
}

/// Connected-node descriptors resolved for a category. Company anchors also
/// resolve their price targets and opinions; other types use the fallback.
fn target_descriptors(category: Category) -> &'static [NodeDescriptor] {
    match category {
        Category::Company => &COMPANY_TARGETS,
        Category::Industry | Category::Theme => &CLASSIFIER_TARGETS,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn property_string(props: &Properties, field: &str) -> Option<String> {
    props.get(field).and_then(value_to_string)
}

impl NodeDescriptor {
    pub fn resolve_id(&self, element_id: &str, props: &Properties) -> Option<String> {
        match self.id {
            IdSource::Property(field) => property_string(props, field),
            IdSource::Synthetic(synthetic) => Some(synthetic.synthesize(element_id)),
        }
    }

    pub fn resolve_label(&self, props: &Properties) -> Option<String> {
        match self.label {
            LabelSource::Property(field) => property_string(props, field),
            LabelSource::Format { prefix, field, default, suffix } => {
                let value = property_string(props, field).or_else(|| default.map(String::from))?;
                let mut label = format!("{}{}", prefix, value);
                if let Some((suffix_field, suffix_default)) = suffix {
                    let extra = property_string(props, suffix_field)
                        .unwrap_or_else(|| suffix_default.to_string());
                    label.push(' ');
                    label.push_str(&extra);
                }
                Some(label)
            }
        }
    }

    fn id_expr(&self, var: &str) -> String {
        match self.id {
            IdSource::Property(field) => format!("toString({}.{})", var, field),
            IdSource::Synthetic(synthetic) => {
                format!("'{}' + elementId({})", synthetic.prefix, var)
            }
        }
    }

    fn label_expr(&self, var: &str) -> String {
        match self.label {
            LabelSource::Property(field) => format!("toString({}.{})", var, field),
            LabelSource::Format { prefix, field, default, suffix } => {
                let value = match default {
                    Some(d) => format!("toString(COALESCE({}.{}, '{}'))", var, field, d),
                    None => format!("toString({}.{})", var, field),
                };
                let mut expr = format!("'{}' + {}", prefix, value);
                if let Some((suffix_field, suffix_default)) = suffix {
                    expr.push_str(&format!(
                        " + ' ' + toString(COALESCE({}.{}, '{}'))",
                        var, suffix_field, suffix_default
                    ));
                }
                expr
            }
        }
    }
}

/// Id of a connected node no descriptor matched.
pub(crate) fn fallback_id(element_id: &str) -> String {
    element_id.to_string()
}

/// Label of a connected node no descriptor matched.
pub(crate) fn fallback_label(element_id: &str, props: &Properties) -> String {
    property_string(props, "name").unwrap_or_else(|| element_id.to_string())
}

/// One bounded fan-out query, fully resolved before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryQuery {
    pub category: Category,
    pub identifiers: Vec<String>,
    pub limit: usize,
    pub anchor: &'static NodeDescriptor,
    pub targets: &'static [NodeDescriptor],
    pub cypher: String,
}

impl CategoryQuery {
    pub fn build(category: Category, identifiers: &BTreeSet<String>, limit: usize) -> Self {
        let anchor = descriptor_for(category);
        let targets = target_descriptors(category);
        Self {
            category,
            identifiers: identifiers.iter().cloned().collect(),
            limit,
            anchor,
            targets,
            cypher: render_cypher(anchor, targets),
        }
    }

    /// First descriptor matching any of the node's labels, in table order.
    pub fn resolve_target(&self, labels: &[String]) -> Option<&'static NodeDescriptor> {
        self.targets
            .iter()
            .find(|d| labels.iter().any(|l| l == d.node_type))
    }
}

fn render_cypher(anchor: &NodeDescriptor, targets: &[NodeDescriptor]) -> String {
    let anchor_field = match anchor.id {
        IdSource::Property(field) => field,
        IdSource::Synthetic(_) => "name",
    };

    let mut id_case = String::from("CASE\n");
    let mut label_case = String::from("CASE\n");
    for d in targets {
        id_case.push_str(&format!(
            "            WHEN connected:{} THEN {}\n",
            d.node_type,
            d.id_expr("connected")
        ));
        label_case.push_str(&format!(
            "            WHEN connected:{} THEN {}\n",
            d.node_type,
            d.label_expr("connected")
        ));
    }
    id_case.push_str("            ELSE elementId(connected)\n        END");
    label_case.push_str(
        "            ELSE COALESCE(toString(connected.name), elementId(connected))\n        END",
    );

    format!(
        "MATCH (anchor:{label})
        WHERE anchor.{field} IN $ids
        MATCH (anchor)-[rel]-(connected)
        RETURN
        {anchor_id} AS source_id,
        '{label}' AS source_type,
        {anchor_label} AS source_label,
        type(rel) AS relationship_type,
        {id_case} AS target_id,
        head(labels(connected)) AS target_type,
        {label_case} AS target_label,
        properties(rel) AS rel_properties
        LIMIT $limit",
        label = anchor.node_type,
        field = anchor_field,
        anchor_id = anchor.id_expr("anchor"),
        anchor_label = anchor.label_expr("anchor"),
        id_case = id_case,
        label_case = label_case,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_company_query_resolves_price_and_opinion() {
        let q = CategoryQuery::build(Category::Company, &ids(&["AAPL"]), 200);
        assert!(q.cypher.contains("MATCH (anchor:Company)"));
        assert!(q.cypher.contains("WHERE anchor.ticker IN $ids"));
        assert!(q.cypher.contains("WHEN connected:TargetPrice THEN 'TP_' + elementId(connected)"));
        assert!(q.cypher.contains("WHEN connected:Opinion THEN 'OP_' + elementId(connected)"));
        assert!(q.cypher.contains("LIMIT $limit"));
        assert_eq!(q.identifiers, vec!["AAPL"]);
        assert_eq!(q.limit, 200);
    }

    #[test]
    fn test_theme_query_uses_name_and_skips_price_nodes() {
        let q = CategoryQuery::build(Category::Theme, &ids(&["AI"]), 500);
        assert!(q.cypher.contains("MATCH (anchor:Theme)"));
        assert!(q.cypher.contains("WHERE anchor.name IN $ids"));
        assert!(!q.cypher.contains("TargetPrice"));
        assert!(q.resolve_target(&["TargetPrice".to_string()]).is_none());
    }

    #[test]
    fn test_identifiers_never_interpolated() {
        let q = CategoryQuery::build(Category::Industry, &ids(&["x' OR 1=1 //"]), 10);
        assert!(!q.cypher.contains("OR 1=1"));
    }

    #[test]
    fn test_resolve_target_follows_table_order() {
        let q = CategoryQuery::build(Category::Company, &ids(&["AAPL"]), 10);
        let d = q
            .resolve_target(&["Theme".to_string(), "Company".to_string()])
            .unwrap();
        assert_eq!(d.node_type, "Company");
    }

    #[test]
    fn test_target_price_label() {
        let p = props(json!({"value": 250000, "currency": "USD"}));
        assert_eq!(TARGET_PRICE.resolve_label(&p).unwrap(), "Target: 250000 USD");
        let p = props(json!({"value": 90000}));
        assert_eq!(TARGET_PRICE.resolve_label(&p).unwrap(), "Target: 90000 KRW");
        assert_eq!(TARGET_PRICE.resolve_label(&Properties::new()), None);
        assert_eq!(TARGET_PRICE.resolve_id("4:abc:7", &p).unwrap(), "TP_4:abc:7");
    }

    #[test]
    fn test_opinion_label_defaults() {
        assert_eq!(OPINION.resolve_label(&Properties::new()).unwrap(), "Opinion: N/A");
        let p = props(json!({"rating": "BUY"}));
        assert_eq!(OPINION.resolve_label(&p).unwrap(), "Opinion: BUY");
    }

    #[test]
    fn test_company_without_ticker_has_no_id() {
        let p = props(json!({"name": "Apple Inc."}));
        assert_eq!(COMPANY.resolve_id("1", &p), None);
        assert_eq!(COMPANY.resolve_label(&p).unwrap(), "Apple Inc.");
    }

    #[test]
    fn test_fallback_label_prefers_name() {
        assert_eq!(fallback_label("9", &props(json!({"name": "Analyst"}))), "Analyst");
        assert_eq!(fallback_label("9", &Properties::new()), "9");
        assert_eq!(fallback_id("9"), "9");
    }
}
