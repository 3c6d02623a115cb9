//! Concurrent fan-out of one bounded query per non-empty category.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use super::{Category, CategoryQuery, GraphStore, IdentifierSet, RawRelationshipRow};
use crate::error::{ReportGraphError, Result};

/// Settled result of one category query.
#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: Category,
    pub result: Result<Vec<RawRelationshipRow>>,
}

/// All category outcomes combined: rows of the successful categories and
/// the failures that were absorbed.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub rows: Vec<RawRelationshipRow>,
    pub failed: Vec<(Category, String)>,
}

impl DispatchReport {
    /// Combine outcomes in category order, independent of completion order.
    pub fn combine(mut outcomes: Vec<CategoryOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.category);
        let mut report = DispatchReport {
            dispatched: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(rows) => report.rows.extend(rows),
                Err(e) => {
                    log::warn!("{} query failed: {}", outcome.category, e);
                    report.failed.push((outcome.category, e.to_string()));
                }
            }
        }

        report
    }

    /// True when queries were dispatched and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        self.dispatched > 0 && self.failed.len() == self.dispatched
    }
}

/// Run one query per non-empty identifier category, concurrently.
///
/// A failing category contributes no rows and never affects its siblings.
/// Dropping the returned future aborts the queries still in flight.
pub async fn dispatch_queries(
    store: Arc<dyn GraphStore>,
    identifiers: &IdentifierSet,
    row_limit: usize,
) -> DispatchReport {
    let categories = identifiers.non_empty_categories();
    if categories.is_empty() {
        log::info!("No identifiers extracted, skipping graph queries");
        return DispatchReport::default();
    }

    log::info!(
        "Executing {} graph queries in parallel (companies={}, industries={}, themes={})",
        categories.len(),
        identifiers.companies.len(),
        identifiers.industries.len(),
        identifiers.themes.len()
    );

    let mut tasks = JoinSet::new();
    for category in &categories {
        let query = CategoryQuery::build(*category, identifiers.for_category(*category), row_limit);
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            let start = Instant::now();
            let result = store.run_category_query(&query).await;
            log::debug!(
                "{} query settled in {:?} ({} identifiers, ok={})",
                query.category,
                start.elapsed(),
                query.identifiers.len(),
                result.is_ok()
            );
            CategoryOutcome {
                category: query.category,
                result,
            }
        });
    }

    let mut pending: BTreeSet<Category> = categories.into_iter().collect();
    let mut outcomes = Vec::with_capacity(pending.len());
    let mut join_errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                pending.remove(&outcome.category);
                outcomes.push(outcome);
            }
            Err(e) => join_errors.push(e.to_string()),
        }
    }

    // A task that panicked never reports its category; whatever is still
    // pending is attributed to the join errors.
    let join_message = join_errors.join("; ");
    for category in pending {
        outcomes.push(CategoryOutcome {
            category,
            result: Err(ReportGraphError::Task(join_message.clone())),
        });
    }

    let report = DispatchReport::combine(outcomes);
    log::info!(
        "Retrieved {} rows from graph store ({} of {} queries failed)",
        report.rows.len(),
        report.failed.len(),
        report.dispatched
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn store() -> InMemoryGraphStore {
        InMemoryGraphStore::new()
            .with_node("1", &["Company"], json!({"ticker": "AAPL", "name": "Apple Inc."}))
            .with_node("2", &["Industry"], json!({"name": "Technology"}))
            .with_node("3", &["Theme"], json!({"name": "AI"}))
            .with_edge("1", "OPERATES_IN", "2", json!({}))
            .with_edge("1", "MENTIONED_WITH", "3", json!({}))
            .with_edge("3", "RELATED_TO", "2", json!({}))
    }

    fn identifiers(companies: &[&str], industries: &[&str], themes: &[&str]) -> IdentifierSet {
        let set = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        IdentifierSet {
            companies: set(companies),
            industries: set(industries),
            themes: set(themes),
        }
    }

    #[tokio::test]
    async fn test_empty_identifiers_dispatch_nothing() {
        let report = dispatch_queries(Arc::new(store()), &IdentifierSet::default(), 100).await;
        assert_eq!(report.dispatched, 0);
        assert!(report.rows.is_empty());
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_one_query_per_non_empty_category() {
        let ids = identifiers(&["AAPL"], &[], &["AI"]);
        let report = dispatch_queries(Arc::new(store()), &ids, 100).await;
        assert_eq!(report.dispatched, 2);
        assert!(report.failed.is_empty());
        // Company rows first (2), then Theme rows (2).
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.rows[0].source_type, "Company");
        assert_eq!(report.rows[3].source_type, "Theme");
    }

    #[tokio::test]
    async fn test_failed_category_is_isolated() {
        let ids = identifiers(&["AAPL"], &["Technology"], &["AI"]);
        let report = dispatch_queries(Arc::new(store().failing(Category::Industry)), &ids, 100).await;
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Category::Industry);
        assert!(!report.all_failed());
        assert!(report.rows.iter().all(|r| r.source_type != "Industry"));
        assert_eq!(report.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let ids = identifiers(&["AAPL"], &[], &[]);
        let report = dispatch_queries(Arc::new(store().failing(Category::Company)), &ids, 100).await;
        assert!(report.all_failed());
        assert!(report.rows.is_empty());
    }

    struct PanickingStore;

    #[async_trait]
    impl GraphStore for PanickingStore {
        async fn run_category_query(&self, q: &CategoryQuery) -> Result<Vec<RawRelationshipRow>> {
            if q.category == Category::Theme {
                panic!("driver bug");
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_panicking_query_is_reported_as_failure() {
        let ids = identifiers(&["AAPL"], &[], &["AI"]);
        let report = dispatch_queries(Arc::new(PanickingStore), &ids, 10).await;
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Category::Theme);
    }

    #[test]
    fn test_combine_is_order_independent() {
        let row = |t: &str| RawRelationshipRow {
            source_type: t.to_string(),
            ..Default::default()
        };
        let a = DispatchReport::combine(vec![
            CategoryOutcome { category: Category::Theme, result: Ok(vec![row("Theme")]) },
            CategoryOutcome { category: Category::Company, result: Ok(vec![row("Company")]) },
        ]);
        let b = DispatchReport::combine(vec![
            CategoryOutcome { category: Category::Company, result: Ok(vec![row("Company")]) },
            CategoryOutcome { category: Category::Theme, result: Ok(vec![row("Theme")]) },
        ]);
        assert_eq!(a.rows, b.rows);
    }
}
