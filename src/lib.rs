pub mod config;
pub mod error;
pub mod db;
pub mod entities;
pub mod persistence;
pub mod graph;
pub mod pipeline;
pub mod http;

pub use config::Config;
pub use error::{ReportGraphError, Result};
pub use graph::{AggregationResult, GraphStore, VisualizationOptions};
pub use pipeline::{VisualizationPipeline, VisualizationReport};
