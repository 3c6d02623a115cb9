//! Extracted entities for a report: the upstream input of the visualization
//! pipeline and the payload of the persistence sink.

mod store;

pub use store::{ReportStatus, SqliteEntityStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::Result;
use crate::graph::Properties;

/// Entity type as stored; unknown types are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Company,
    Industry,
    Theme,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Company => "Company",
            EntityType::Industry => "Industry",
            EntityType::Theme => "Theme",
            EntityType::Other(name) => name,
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Company" => EntityType::Company,
            "Industry" => EntityType::Industry,
            "Theme" => EntityType::Theme,
            _ => EntityType::Other(value),
        }
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        EntityType::from(value.to_string())
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted entity scoped to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl EntityRecord {
    pub fn new(entity_type: impl Into<EntityType>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            properties: Properties::new(),
            confidence: default_confidence(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// String property, `None` if absent, null, empty or not a string.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Extraction output grouped by category, as produced upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub companies: Vec<ExtractedCompany>,
    #[serde(default)]
    pub industries: Vec<ExtractedIndustry>,
    #[serde(default)]
    pub themes: Vec<ExtractedTheme>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedCompany {
    #[serde(default)]
    pub name: String,
    pub ticker: Option<String>,
    pub industry: Option<String>,
    pub market: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedIndustry {
    #[serde(default)]
    pub name: String,
    pub parent_industry: Option<String>,
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedTheme {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub description: Option<String>,
    pub confidence_score: Option<f64>,
}

fn into_properties(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

impl ExtractedEntities {
    /// Flatten into records, companies first, then industries, then themes.
    pub fn into_records(self) -> Vec<EntityRecord> {
        let mut records =
            Vec::with_capacity(self.companies.len() + self.industries.len() + self.themes.len());

        for c in self.companies {
            records.push(EntityRecord {
                entity_type: EntityType::Company,
                name: c.name,
                properties: into_properties(json!({
                    "ticker": c.ticker,
                    "industry": c.industry,
                    "market": c.market,
                    "aliases": c.aliases,
                })),
                confidence: c.confidence_score.unwrap_or(1.0),
            });
        }

        for i in self.industries {
            records.push(EntityRecord {
                entity_type: EntityType::Industry,
                name: i.name,
                properties: into_properties(json!({ "parent_industry": i.parent_industry })),
                confidence: i.confidence_score.unwrap_or(1.0),
            });
        }

        for t in self.themes {
            records.push(EntityRecord {
                entity_type: EntityType::Theme,
                name: t.name,
                properties: into_properties(json!({
                    "keywords": t.keywords,
                    "description": t.description,
                })),
                confidence: t.confidence_score.unwrap_or(1.0),
            });
        }

        records
    }
}

/// Read side of the relational store: entities previously extracted for a report.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn report_exists(&self, report_id: &str) -> Result<bool>;

    async fn fetch_entities(&self, report_id: &str) -> Result<Vec<EntityRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip_and_unknown() {
        assert_eq!(EntityType::from("Company"), EntityType::Company);
        assert_eq!(
            EntityType::from("TargetPrice"),
            EntityType::Other("TargetPrice".to_string())
        );
        let json = serde_json::to_string(&EntityType::Theme).unwrap();
        assert_eq!(json, "\"Theme\"");
    }

    #[test]
    fn test_str_property_treats_malformed_as_missing() {
        let record = EntityRecord::new("Company", "Apple Inc.")
            .with_property("ticker", json!(42))
            .with_property("market", json!("  "))
            .with_property("industry", json!("Tech"));
        assert_eq!(record.str_property("ticker"), None);
        assert_eq!(record.str_property("market"), None);
        assert_eq!(record.str_property("missing"), None);
        assert_eq!(record.str_property("industry"), Some("Tech"));
    }

    #[test]
    fn test_extracted_entities_into_records() {
        let extracted: ExtractedEntities = serde_json::from_value(json!({
            "companies": [{"name": "Samsung Electronics", "ticker": "005930", "aliases": ["SEC"]}],
            "industries": [{"name": "Semiconductors", "confidence_score": 0.8}],
            "themes": [{"name": "AI", "keywords": ["LLM"]}]
        }))
        .unwrap();

        let records = extracted.into_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].entity_type, EntityType::Company);
        assert_eq!(records[0].str_property("ticker"), Some("005930"));
        assert_eq!(records[0].properties["aliases"], json!(["SEC"]));
        assert_eq!(records[1].entity_type, EntityType::Industry);
        assert!((records[1].confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(records[2].entity_type, EntityType::Theme);
        assert_eq!(records[2].properties["keywords"], json!(["LLM"]));
        assert_eq!(records[2].confidence, 1.0);
    }

    #[test]
    fn test_extracted_entities_missing_sections() {
        let extracted: ExtractedEntities = serde_json::from_value(json!({})).unwrap();
        assert!(extracted.into_records().is_empty());
    }
}
