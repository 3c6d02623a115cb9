//! Best-effort persistence of a report's extracted entities.
//!
//! All rows for one call are written in a single transaction together with
//! the report's `entity_count`; any failure rolls the whole batch back.

use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use crate::db::Db;
use crate::entities::{EntityRecord, EntityType};
use crate::error::{ReportGraphError, Result};

/// Per-category counts of persisted entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub companies: usize,
    pub industries: usize,
    pub themes: usize,
    pub total: usize,
}

impl PersistStats {
    fn count(&mut self, entity_type: &EntityType) {
        match entity_type {
            EntityType::Company => self.companies += 1,
            EntityType::Industry => self.industries += 1,
            EntityType::Theme => self.themes += 1,
            EntityType::Other(_) => {}
        }
        self.total += 1;
    }
}

/// Persist `entities` for `report_id` in one transaction.
///
/// Each row gets a fresh UUID and a lowercase `normalized_name`. The report
/// must exist; its `entity_count` is incremented by the number of rows written.
pub async fn save_entities(db: &Db, report_id: &str, entities: &[EntityRecord]) -> Result<PersistStats> {
    let report_id = report_id.to_string();
    let entities = entities.to_vec();
    let rid = report_id.clone();

    let result = db
        .with_connection(move |conn| {
            let tx = conn.transaction()?;
            let mut stats = PersistStats::default();
            {
                let mut insert = tx.prepare(
                    "INSERT INTO entities
                     (id, report_id, entity_type, name, normalized_name, properties, confidence_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for entity in &entities {
                    let properties = serde_json::to_string(&entity.properties)?;
                    insert.execute(params![
                        Uuid::new_v4().to_string(),
                        rid,
                        entity.entity_type.as_str(),
                        entity.name,
                        entity.name.to_lowercase(),
                        properties,
                        entity.confidence,
                    ])?;
                    stats.count(&entity.entity_type);
                }
            }

            let updated = tx.execute(
                "UPDATE reports SET entity_count = entity_count + ?1 WHERE id = ?2",
                params![stats.total as i64, rid],
            )?;
            if updated == 0 {
                // Dropping the transaction rolls back the inserts.
                return Err(ReportGraphError::ReportNotFound(rid));
            }

            tx.commit()?;
            Ok(stats)
        })
        .await;

    match result {
        Ok(stats) => {
            log::info!(
                "Saved {} entities for report {} (companies={}, industries={}, themes={})",
                stats.total,
                report_id,
                stats.companies,
                stats.industries,
                stats.themes
            );
            Ok(stats)
        }
        Err(e) => {
            log::error!("Failed to save entities for report {}: {}", report_id, e);
            Err(ReportGraphError::Persistence(e.to_string()))
        }
    }
}
