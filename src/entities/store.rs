use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::fmt;

use super::{EntityRecord, EntitySource};
use crate::db::Db;
use crate::error::{ReportGraphError, Result};
use crate::graph::Properties;

/// Lifecycle of a report's visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pending,
    GeneratingVisualization,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::GeneratingVisualization => "generating_visualization",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportStatus::Pending),
            "generating_visualization" => Some(ReportStatus::GeneratingVisualization),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports and their extracted entities in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteEntityStore {
    db: Db,
}

impl SqliteEntityStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub async fn create_report(&self, report_id: &str, filename: &str, title: Option<&str>) -> Result<()> {
        let (id, filename, title) = (
            report_id.to_string(),
            filename.to_string(),
            title.map(str::to_string),
        );
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO reports (id, filename, title) VALUES (?1, ?2, ?3)",
                    params![id, filename, title],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn update_report_status(&self, report_id: &str, status: ReportStatus) -> Result<()> {
        let id = report_id.to_string();
        let updated = self
            .db
            .with_connection(move |conn| {
                Ok(conn.execute(
                    "UPDATE reports SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(ReportGraphError::ReportNotFound(report_id.to_string()));
        }
        log::debug!("Report {} status -> {}", report_id, status);
        Ok(())
    }

    pub async fn report_status(&self, report_id: &str) -> Result<Option<ReportStatus>> {
        let id = report_id.to_string();
        let status: Option<String> = self
            .db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row("SELECT status FROM reports WHERE id = ?1", [id], |row| row.get(0))
                    .optional()?)
            })
            .await?;
        Ok(status.as_deref().and_then(ReportStatus::parse))
    }

    pub async fn entity_count(&self, report_id: &str) -> Result<Option<i64>> {
        let id = report_id.to_string();
        self.db
            .with_connection(move |conn| {
                Ok(conn
                    .query_row("SELECT entity_count FROM reports WHERE id = ?1", [id], |row| row.get(0))
                    .optional()?)
            })
            .await
    }
}

/// Malformed stored JSON degrades to an empty property map.
fn parse_properties(raw: &str) -> Properties {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            log::warn!("Ignoring malformed entity properties: {}", raw);
            Properties::new()
        }
    }
}

#[async_trait]
impl EntitySource for SqliteEntityStore {
    async fn report_exists(&self, report_id: &str) -> Result<bool> {
        let id = report_id.to_string();
        self.db
            .with_connection(move |conn| {
                let found: Option<i64> = conn
                    .query_row("SELECT 1 FROM reports WHERE id = ?1", [id], |row| row.get(0))
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    async fn fetch_entities(&self, report_id: &str) -> Result<Vec<EntityRecord>> {
        let id = report_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT entity_type, name, properties, confidence_score
                     FROM entities WHERE report_id = ?1 ORDER BY rowid",
                )?;
                let rows = stmt.query_map([id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                })?;

                let mut records = Vec::new();
                for row in rows {
                    let (entity_type, name, properties, confidence) = row?;
                    records.push(EntityRecord {
                        entity_type: entity_type.into(),
                        name,
                        properties: parse_properties(&properties),
                        confidence,
                    });
                }
                Ok(records)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityType;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteEntityStore) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        (temp_dir, SqliteEntityStore::new(db))
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let (_dir, store) = setup().await;
        assert!(!store.report_exists("r1").await.unwrap());

        store.create_report("r1", "q3.pdf", Some("Q3 review")).await.unwrap();
        assert!(store.report_exists("r1").await.unwrap());
        assert_eq!(store.report_status("r1").await.unwrap(), Some(ReportStatus::Pending));

        store
            .update_report_status("r1", ReportStatus::GeneratingVisualization)
            .await
            .unwrap();
        assert_eq!(
            store.report_status("r1").await.unwrap(),
            Some(ReportStatus::GeneratingVisualization)
        );
    }

    #[tokio::test]
    async fn test_update_unknown_report() {
        let (_dir, store) = setup().await;
        let err = store
            .update_report_status("missing", ReportStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportGraphError::ReportNotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_entities_with_malformed_properties() {
        let (_dir, store) = setup().await;
        store.create_report("r1", "q3.pdf", None).await.unwrap();
        store
            .db()
            .with_connection(|conn| {
                conn.execute_batch(
                    "INSERT INTO entities (id, report_id, entity_type, name, normalized_name, properties)
                     VALUES ('e1', 'r1', 'Company', 'Apple Inc.', 'apple inc.', '{\"ticker\": \"AAPL\"}');
                     INSERT INTO entities (id, report_id, entity_type, name, normalized_name, properties)
                     VALUES ('e2', 'r1', 'Theme', 'AI', 'ai', 'not json');",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let records = store.fetch_entities("r1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity_type, EntityType::Company);
        assert_eq!(records[0].str_property("ticker"), Some("AAPL"));
        assert_eq!(records[1].entity_type, EntityType::Theme);
        assert!(records[1].properties.is_empty());
        assert_eq!(records[1].confidence, 1.0);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::GeneratingVisualization,
            ReportStatus::Completed,
            ReportStatus::Failed,
        ] {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::parse("archived"), None);
    }
}
