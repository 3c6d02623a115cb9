//! End-to-end visualization run for one report.
//!
//! identifiers -> concurrent category queries -> validation and type filter
//! -> aggregation. Entity persistence runs alongside as a detached task and
//! never changes the graph outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MAX_ROW_LIMIT;
use crate::db::Db;
use crate::entities::{EntityRecord, EntitySource};
use crate::error::{ReportGraphError, Result};
use crate::graph::{
    assemble, dispatch_queries, extract_identifiers, AggregationResult, AssembledGraph, Category,
    GraphStore, RowWarning, VisualizationOptions,
};
use crate::persistence::{save_entities, PersistStats};

/// A category whose query failed and contributed nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryFailure {
    pub category: Category,
    pub error: String,
}

/// Visualization data plus the accounting of everything that was absorbed.
#[derive(Debug, Clone, Serialize)]
pub struct VisualizationReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub data: AggregationResult,
    pub failed_categories: Vec<CategoryFailure>,
    pub dropped_rows: Vec<RowWarning>,
    pub filtered_rows: usize,
    pub persisted: Option<PersistStats>,
    pub persistence_error: Option<String>,
    /// The entity write outlived the deadline and continues in the background.
    pub persistence_pending: bool,
}

pub struct VisualizationPipeline {
    graph_store: Arc<dyn GraphStore>,
    sink: Option<Db>,
}

impl VisualizationPipeline {
    pub fn new(graph_store: Arc<dyn GraphStore>) -> Self {
        Self {
            graph_store,
            sink: None,
        }
    }

    /// Persist input entities to `db` on every `generate` call.
    pub fn with_sink(mut self, db: Db) -> Self {
        self.sink = Some(db);
        self
    }

    /// Build visualization data for freshly extracted entities.
    pub async fn generate(
        &self,
        report_id: &str,
        entities: &[EntityRecord],
        options: &VisualizationOptions,
    ) -> Result<VisualizationReport> {
        self.run(report_id, entities, options, true).await
    }

    /// Build visualization data for entities already stored for a report.
    pub async fn generate_for_report(
        &self,
        source: &dyn EntitySource,
        report_id: &str,
        options: &VisualizationOptions,
    ) -> Result<VisualizationReport> {
        if !source.report_exists(report_id).await? {
            return Err(ReportGraphError::ReportNotFound(report_id.to_string()));
        }
        let entities = source.fetch_entities(report_id).await?;
        // Entities came from the store, nothing to persist.
        self.run(report_id, &entities, options, false).await
    }

    async fn run(
        &self,
        report_id: &str,
        entities: &[EntityRecord],
        options: &VisualizationOptions,
        persist: bool,
    ) -> Result<VisualizationReport> {
        validate_options(options)?;
        let start = Instant::now();
        let deadline = Duration::from_millis(options.timeout_ms);

        let identifiers = extract_identifiers(entities);
        log::info!(
            "Report {}: {} entities -> companies={}, industries={}, themes={}",
            report_id,
            entities.len(),
            identifiers.companies.len(),
            identifiers.industries.len(),
            identifiers.themes.len()
        );

        let sink = match &self.sink {
            Some(db) if persist && options.persist_entities && !entities.is_empty() => {
                let (db, rid, batch) = (db.clone(), report_id.to_string(), entities.to_vec());
                Some(tokio::spawn(async move { save_entities(&db, &rid, &batch).await }))
            }
            _ => None,
        };

        let graph_work = async {
            let dispatch =
                dispatch_queries(Arc::clone(&self.graph_store), &identifiers, options.row_limit).await;
            if dispatch.all_failed() {
                log::error!("Report {}: all {} graph queries failed", report_id, dispatch.dispatched);
                return Err(ReportGraphError::AllQueriesFailed(dispatch.dispatched));
            }
            let failed: Vec<CategoryFailure> = dispatch
                .failed
                .into_iter()
                .map(|(category, error)| CategoryFailure { category, error })
                .collect();
            Ok((failed, assemble(dispatch.rows, options)))
        };

        let (failed_categories, assembled) =
            match tokio::time::timeout(deadline, graph_work).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    log::error!(
                        "Report {}: graph queries timed out after {} ms",
                        report_id,
                        options.timeout_ms
                    );
                    return Err(ReportGraphError::Timeout(options.timeout_ms));
                }
            };
        let AssembledGraph {
            data,
            dropped_rows,
            filtered_rows,
        } = assembled;

        // The sink only gets what is left of the deadline; dropping the handle detaches it.
        let (persisted, persistence_error, persistence_pending) = match sink {
            None => (None, None, false),
            Some(handle) => {
                let remaining = deadline.saturating_sub(start.elapsed());
                match tokio::time::timeout(remaining, handle).await {
                    Ok(Ok(Ok(stats))) => (Some(stats), None, false),
                    Ok(Ok(Err(e))) => (None, Some(e.to_string()), false),
                    Ok(Err(e)) => (None, Some(ReportGraphError::from(e).to_string()), false),
                    Err(_) => {
                        log::warn!(
                            "Report {}: entity persistence still running after {} ms",
                            report_id,
                            options.timeout_ms
                        );
                        (None, None, true)
                    }
                }
            }
        };

        log::info!(
            "Report {}: {} nodes, {} relationships in {:?} ({} rows dropped, {} categories failed)",
            report_id,
            data.stats.node_count,
            data.stats.relationship_count,
            start.elapsed(),
            dropped_rows.len(),
            failed_categories.len()
        );

        Ok(VisualizationReport {
            report_id: report_id.to_string(),
            generated_at: Utc::now(),
            data,
            failed_categories,
            dropped_rows,
            filtered_rows,
            persisted,
            persistence_error,
            persistence_pending,
        })
    }
}

fn validate_options(options: &VisualizationOptions) -> Result<()> {
    if options.row_limit == 0 || options.row_limit > MAX_ROW_LIMIT {
        return Err(ReportGraphError::InvalidInput(format!(
            "row limit must be between 1 and {}, got {}",
            MAX_ROW_LIMIT, options.row_limit
        )));
    }
    if options.timeout_ms == 0 {
        return Err(ReportGraphError::InvalidInput(
            "query timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
