use crate::config::{Config, MAX_ROW_LIMIT};
use crate::entities::EntitySource;
use crate::error::{ReportGraphError, Result};
use crate::graph::VisualizationOptions;
use crate::pipeline::VisualizationPipeline;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// HTTP boundary serving report graphs
pub struct GraphApiServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<VisualizationPipeline>,
    source: Arc<dyn EntitySource>,
    defaults: VisualizationOptions,
}

impl GraphApiServer {
    pub fn new(
        pipeline: VisualizationPipeline,
        source: Arc<dyn EntitySource>,
        defaults: VisualizationOptions,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            state: AppState {
                pipeline: Arc::new(pipeline),
                source,
                defaults,
            },
            allowed_origins,
        }
    }

    pub fn from_config(pipeline: VisualizationPipeline, source: Arc<dyn EntitySource>, config: &Config) -> Self {
        Self::new(
            pipeline,
            source,
            config.visualization_options(),
            config.http_server.allowed_origins.clone(),
        )
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);
        if !check_port_available(port).await {
            return Err(ReportGraphError::Config(format!(
                "Port {} is already in use. Set http_server.port in config.toml to use another port.",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            ReportGraphError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting graph API on http://{}", addr);
        log::info!("Graph endpoint: http://{}/reports/{{report_id}}/graph", addr);

        axum::serve(listener, self.create_router())
            .await
            .map_err(|e| ReportGraphError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))?;

        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        // No configured origins means local use: allow any.
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/reports/:report_id/graph", get(handle_report_graph))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Query string of the graph endpoint
#[derive(Debug, Default, Deserialize)]
struct GraphParams {
    /// Comma separated node types, e.g. `Company,Theme`
    include_types: Option<String>,
    limit: Option<usize>,
}

impl GraphParams {
    fn apply(&self, defaults: &VisualizationOptions) -> Result<VisualizationOptions> {
        let mut options = defaults.clone();

        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_ROW_LIMIT {
                return Err(ReportGraphError::InvalidInput(format!(
                    "limit must be between 1 and {}",
                    MAX_ROW_LIMIT
                )));
            }
            options.row_limit = limit;
        }

        if let Some(raw) = &self.include_types {
            let types: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            options.include_types = if types.is_empty() { None } else { Some(types) };
        }

        Ok(options)
    }
}

/// Error response: `{"error": ..., "details": ...}`
struct ApiError(ReportGraphError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ReportGraphError::ReportNotFound(_) => StatusCode::NOT_FOUND,
            ReportGraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ReportGraphError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ReportGraphError::AllQueriesFailed(_) | ReportGraphError::Graph(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Graph request failed: {}", self.0);
        }
        let error = status.canonical_reason().unwrap_or("Error");
        (
            status,
            Json(serde_json::json!({
                "error": error,
                "details": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

impl From<ReportGraphError> for ApiError {
    fn from(err: ReportGraphError) -> Self {
        ApiError(err)
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "reportgraph",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_report_graph(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Query(params): Query<GraphParams>,
) -> std::result::Result<Response, ApiError> {
    let options = params.apply(&state.defaults)?;
    let report = state
        .pipeline
        .generate_for_report(state.source.as_ref(), &report_id, &options)
        .await?;

    if !report.failed_categories.is_empty() {
        log::warn!(
            "Report {} served with {} failed categories",
            report_id,
            report.failed_categories.len()
        );
    }
    Ok((StatusCode::OK, Json(report.data)).into_response())
}
