use thiserror::Error;

/// Main error type for reportgraph
#[derive(Error, Debug)]
pub enum ReportGraphError {
    /// Relational store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph store errors (connection, query execution, row decoding)
    #[error("Graph store error: {0}")]
    Graph(String),

    /// Report not found
    #[error("Report not found: {0}")]
    ReportNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A raw relationship row is missing required fields
    #[error("Invalid relationship row, missing: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    /// Entity persistence failed and was rolled back
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Every dispatched category query failed
    #[error("All {0} graph queries failed")]
    AllQueriesFailed(usize),

    /// The pipeline did not settle before its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// A spawned query task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl From<neo4rs::Error> for ReportGraphError {
    fn from(err: neo4rs::Error) -> Self {
        ReportGraphError::Graph(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ReportGraphError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReportGraphError::Task(err.to_string())
    }
}

/// Convenient Result type using ReportGraphError
pub type Result<T> = std::result::Result<T, ReportGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReportGraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: ReportGraphError = rusqlite_err.into();
        assert!(matches!(err, ReportGraphError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReportGraphError = io_err.into();
        assert!(matches!(err, ReportGraphError::Io(_)));
    }

    #[test]
    fn test_validation_lists_missing_fields() {
        let err = ReportGraphError::Validation(vec!["source_id", "relationship_type"]);
        assert_eq!(
            err.to_string(),
            "Invalid relationship row, missing: source_id, relationship_type"
        );
    }

    #[test]
    fn test_all_queries_failed_display() {
        let err = ReportGraphError::AllQueriesFailed(3);
        assert_eq!(err.to_string(), "All 3 graph queries failed");
    }
}
