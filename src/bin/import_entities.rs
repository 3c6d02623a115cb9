use anyhow::{Context, Result};
use clap::Parser;
use reportgraph::db::{migrate, Db};
use reportgraph::entities::{ExtractedEntities, SqliteEntityStore};
use reportgraph::graph;
use reportgraph::persistence::save_entities;
use reportgraph::pipeline::VisualizationPipeline;
use reportgraph::Config;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "import-entities")]
#[command(about = "Register a report and store its extracted entities")]
struct Args {
    /// JSON file with {"companies": [...], "industries": [...], "themes": [...]}
    input: PathBuf,

    /// Report id (a new UUID when omitted)
    #[arg(long)]
    report_id: Option<String>,

    /// Source document name recorded on the report
    #[arg(long)]
    filename: Option<String>,

    #[arg(long)]
    title: Option<String>,

    /// Apply migrations from this directory instead of the bundled ones
    #[arg(long)]
    migrations: Option<PathBuf>,

    /// Also build the visualization, persisting entities alongside, and print it
    #[arg(long)]
    visualize: bool,

    /// Graph fixture used with --visualize instead of Neo4j
    #[arg(long, requires = "visualize")]
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let db = Db::new(config.db_path());

    match args.migrations.clone() {
        Some(dir) => db.with_connection(move |conn| migrate::run_migrations(conn, &dir)).await?,
        None => db.migrate().await?,
    }

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let extracted: ExtractedEntities =
        serde_json::from_str(&text).context("Input is not a valid entity extraction result")?;
    let records = extracted.into_records();

    let report_id = args.report_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let filename = args.filename.unwrap_or_else(|| {
        args.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let store = SqliteEntityStore::new(db);
    store
        .create_report(&report_id, &filename, args.title.as_deref())
        .await?;

    if !args.visualize {
        let stats = save_entities(store.db(), &report_id, &records).await?;
        log::info!("Imported {} entities into report {}", stats.total, report_id);
        println!("{}", report_id);
        return Ok(());
    }

    let graph_store = graph::open_store(&config, args.fixture.as_deref()).await?;
    let pipeline = VisualizationPipeline::new(graph_store).with_sink(store.db().clone());
    let mut options = config.visualization_options();
    options.persist_entities = true;

    let report = pipeline.generate(&report_id, &records, &options).await?;
    match (&report.persisted, &report.persistence_error) {
        (Some(stats), _) => log::info!("Imported {} entities into report {}", stats.total, report_id),
        (None, Some(e)) => log::warn!("Entities for report {} were not saved: {}", report_id, e),
        (None, None) if report.persistence_pending => log::warn!(
            "Entities for report {} were still being written at exit; re-run without --visualize to import them",
            report_id
        ),
        (None, None) => {}
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
