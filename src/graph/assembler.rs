//! Row validation and type filtering ahead of aggregation.

use serde::Serialize;

use super::{AggregationResult, NodeAggregator, RawRelationshipRow, VisualizationOptions};
use crate::error::{ReportGraphError, Result};

/// A row dropped because required fields were empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowWarning {
    /// Position in the combined row list.
    pub index: usize,
    pub source_id: String,
    pub target_id: String,
    pub missing: Vec<&'static str>,
}

/// Aggregation result plus what was left out on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledGraph {
    pub data: AggregationResult,
    pub dropped_rows: Vec<RowWarning>,
    /// Valid rows removed by the include-types filter.
    pub filtered_rows: usize,
}

/// Check that every required field of a row is non-blank.
pub fn validate_row(row: &RawRelationshipRow) -> Result<()> {
    let fields: [(&'static str, &str); 7] = [
        ("source_id", &row.source_id),
        ("source_type", &row.source_type),
        ("source_label", &row.source_label),
        ("target_id", &row.target_id),
        ("target_type", &row.target_type),
        ("target_label", &row.target_label),
        ("relationship_type", &row.relationship_type),
    ];

    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReportGraphError::Validation(missing))
    }
}

/// Validate, filter and aggregate rows into the final result.
///
/// Invalid rows are logged and dropped. With `include_types` set, only rows
/// whose connected node type is listed are kept; an empty list disables
/// the filter.
pub fn assemble(rows: Vec<RawRelationshipRow>, options: &VisualizationOptions) -> AssembledGraph {
    let include = options
        .include_types
        .as_ref()
        .filter(|types| !types.is_empty());

    let mut aggregator = NodeAggregator::new(options.target_properties, options.relationship_key);
    let mut dropped_rows = Vec::new();
    let mut filtered_rows = 0;

    for (index, row) in rows.into_iter().enumerate() {
        if let Err(ReportGraphError::Validation(missing)) = validate_row(&row) {
            log::warn!(
                "Dropping relationship row {} ({} -> {}): missing {}",
                index,
                row.source_id,
                row.target_id,
                missing.join(", ")
            );
            dropped_rows.push(RowWarning {
                index,
                source_id: row.source_id,
                target_id: row.target_id,
                missing,
            });
            continue;
        }

        if let Some(types) = include {
            if !types.iter().any(|t| *t == row.target_type) {
                filtered_rows += 1;
                continue;
            }
        }

        aggregator.add_row(row);
    }

    if filtered_rows > 0 {
        log::debug!("Include-types filter removed {} rows", filtered_rows);
    }

    AssembledGraph {
        data: aggregator.finish(),
        dropped_rows,
        filtered_rows,
    }
}
