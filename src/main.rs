use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reportgraph::config::Config;
use reportgraph::db::{migrate, Db};
use reportgraph::entities::{ReportStatus, SqliteEntityStore};
use reportgraph::error::ReportGraphError;
use reportgraph::graph;
use reportgraph::http::GraphApiServer;
use reportgraph::pipeline::{VisualizationPipeline, VisualizationReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "reportgraph", version)]
#[command(about = "Knowledge-graph visualization data for analyst reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve report graphs over HTTP
    Serve,
    /// Build the visualization for one stored report and print it as JSON
    Visualize {
        report_id: String,
        /// Answer graph queries from a JSON fixture instead of Neo4j
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Comma separated node types to keep, e.g. Industry,Theme
        #[arg(long, value_delimiter = ',')]
        include_types: Vec<String>,
        /// Row limit per category query
        #[arg(long)]
        limit: Option<usize>,
        /// Print the full report (failures, dropped rows) instead of only the graph
        #[arg(long)]
        full: bool,
    },
    /// Apply migrations and verify the database schema (default)
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.reportgraph.log_level.as_str()),
    )
    .init();

    match cli.command.unwrap_or(Command::Verify) {
        Command::Serve => run_http_server(config).await?,
        Command::Visualize {
            report_id,
            fixture,
            include_types,
            limit,
            full,
        } => run_visualize(config, &report_id, fixture.as_deref(), include_types, limit, full).await?,
        Command::Verify => run_schema_verification(config).await?,
    }

    Ok(())
}

async fn open_database(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.migrate().await.context("Failed to apply migrations")?;
    log::info!("Database initialized: {}", config.db_path().display());
    Ok(db)
}

/// Run the HTTP graph API
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting reportgraph HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&config).await?;
    let store = graph::open_store(&config, None).await?;
    let pipeline = VisualizationPipeline::new(store);
    let source = Arc::new(SqliteEntityStore::new(db));

    let server = GraphApiServer::from_config(pipeline, source, &config);
    server.run(config.http_server.port).await?;
    Ok(())
}

async fn run_visualize(
    config: Config,
    report_id: &str,
    fixture: Option<&Path>,
    include_types: Vec<String>,
    limit: Option<usize>,
    full: bool,
) -> Result<()> {
    let db = open_database(&config).await?;
    let entity_store = SqliteEntityStore::new(db);
    let pipeline = VisualizationPipeline::new(graph::open_store(&config, fixture).await?);

    let mut options = config.visualization_options();
    if !include_types.is_empty() {
        options.include_types = Some(include_types);
    }
    if let Some(limit) = limit {
        options.row_limit = limit;
    }

    entity_store
        .update_report_status(report_id, ReportStatus::GeneratingVisualization)
        .await?;

    let outcome = pipeline.generate_for_report(&entity_store, report_id, &options).await;
    let report = record_outcome(&entity_store, report_id, outcome).await?;

    for failure in &report.failed_categories {
        log::warn!("{} category unavailable: {}", failure.category, failure.error);
    }

    let json = if full {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string_pretty(&report.data)?
    };
    println!("{}", json);
    Ok(())
}

/// Store the final report status. A pipeline error wins over a failed status update.
async fn record_outcome(
    store: &SqliteEntityStore,
    report_id: &str,
    outcome: std::result::Result<VisualizationReport, ReportGraphError>,
) -> std::result::Result<VisualizationReport, ReportGraphError> {
    match outcome {
        Ok(report) => {
            store.update_report_status(report_id, ReportStatus::Completed).await?;
            Ok(report)
        }
        Err(e) => {
            if let Err(status_err) = store.update_report_status(report_id, ReportStatus::Failed).await {
                log::error!("Failed to mark report {} as failed: {}", report_id, status_err);
            }
            Err(e)
        }
    }
}

/// Run database schema verification
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting reportgraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Graph store: {}", config.neo4j.uri);

    let db = open_database(&config).await?;
    verify_database_schema(&db).await?;
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let mut missing = Vec::new();
        for table in ["reports", "entities", "schema_migrations"] {
            if tables.iter().any(|t| t == table) {
                log::debug!("✓ Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                missing.push(table);
            }
        }
        if !missing.is_empty() {
            return Err(ReportGraphError::Config(format!("Missing tables: {}", missing.join(", "))));
        }

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND name = 'idx_entities_report_id'",
        )?;
        if !stmt.exists([])? {
            log::warn!("Index idx_entities_report_id not found");
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(ReportGraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(ReportGraphError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(ReportGraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn entity_store() -> (TempDir, SqliteEntityStore) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        (temp_dir, SqliteEntityStore::new(db))
    }

    #[tokio::test]
    async fn test_pipeline_error_survives_failed_status_update() {
        let (_dir, store) = entity_store().await;
        // No report row, so the status update itself fails.
        let err = record_outcome(&store, "missing", Err(ReportGraphError::Timeout(250)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportGraphError::Timeout(250)));
    }

    #[tokio::test]
    async fn test_pipeline_error_marks_report_failed() {
        let (_dir, store) = entity_store().await;
        store.create_report("r1", "q3.pdf", None).await.unwrap();

        let err = record_outcome(&store, "r1", Err(ReportGraphError::AllQueriesFailed(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportGraphError::AllQueriesFailed(2)));
        assert_eq!(store.report_status("r1").await.unwrap(), Some(ReportStatus::Failed));
    }
}
