//! The HTTP sync API consumed by the graph editor frontend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::export::export_all_graphs;
use crate::generate::{GraphGenerator, MAX_PROMPT_CHARS, clamp_max_nodes};
use crate::graph::{DEFAULT_GRAPH_KIND, Graph, SceneDefaults, normalize_graph};
use crate::store::{GraphSummary, Store, StoreConfig};

// The single-document endpoint predates multi-graph storage and kept its
// original default name.
const LEGACY_GRAPH_NAME: &str = "Default Graph";

/// Arguments for running the graphnotes web server
#[derive(Debug, Clone, Parser)]
#[command(name = "graphnotes serve", about = "Start the graphnotes web sync API server.")]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Path to the sqlite database. Defaults to GRAPHNOTES_DB_PATH or the
    /// user data directory.
    #[arg(long = "db-path")]
    pub db_path: Option<PathBuf>,

    /// Allowed CORS origins, comma separated; '*' allows any origin.
    #[arg(long = "cors-origin", default_value = "http://localhost:5173")]
    pub cors_origin: String,

    /// Document id served by the single-document /api/graph endpoint.
    #[arg(long = "graph-id", default_value = "default")]
    pub graph_id: String,
}

struct AppState {
    store: Store,
    graph_id: String,
    defaults: SceneDefaults,
    generator: Option<GraphGenerator>,
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = StoreConfig::default();
    if let Some(path) = args.db_path.clone() {
        config.path = path;
    }
    let defaults = config.defaults;
    let store = Store::connect(config).await?;

    let generator = GraphGenerator::from_env();
    if generator.is_none() {
        println!("OPENAI_API_KEY is not set; POST /api/ai/graph is disabled.");
    }

    let state = Arc::new(AppState {
        store,
        graph_id: args.graph_id.clone(),
        defaults,
        generator,
    });

    let app = Router::new()
        .route("/api/health", get(get_health))
        .route("/api/graph", get(get_legacy_graph).put(put_legacy_graph))
        .route("/api/graphs", get(list_graphs).post(create_graph))
        .route(
            "/api/graphs/:id",
            get(get_graph).put(put_graph).delete(delete_graph),
        )
        .route("/api/export", get(get_export))
        .route("/api/ai/graph", post(post_ai_graph))
        .with_state(state)
        .layer(cors_layer(&args.cors_origin)?);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("graphnotes server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn cors_layer(origins: &str) -> Result<CorsLayer> {
    if origins.trim() == "*" {
        return Ok(CorsLayer::permissive());
    }
    let mut allowed = Vec::new();
    for entry in origins.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        allowed.push(
            entry
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin '{entry}'"))?,
        );
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn get_health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_legacy_graph(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Graph>, (StatusCode, String)> {
    let stored = state
        .store
        .fetch(&state.graph_id)
        .await
        .map_err(internal_error)?;
    let graph = match stored {
        Some(stored) => stored.graph,
        None => {
            let mut fallback = Graph::default_for(DEFAULT_GRAPH_KIND);
            fallback.name = LEGACY_GRAPH_NAME.to_string();
            fallback
        }
    };
    Ok(Json(graph))
}

async fn put_legacy_graph(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<StatusCode, (StatusCode, String)> {
    let payload = parse_body(&body)?;
    let mut graph = validated_document(&payload, &state.defaults)?;
    if payload
        .get("name")
        .and_then(Value::as_str)
        .is_none_or(|name| name.trim().is_empty())
    {
        graph.name = LEGACY_GRAPH_NAME.to_string();
    }
    state
        .store
        .upsert(&state.graph_id, &graph)
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    kind: Option<String>,
}

async fn list_graphs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<GraphSummary>>, (StatusCode, String)> {
    let kind = query.kind.as_deref().unwrap_or(DEFAULT_GRAPH_KIND);
    let summaries = state.store.list(kind).await.map_err(internal_error)?;
    Ok(Json(summaries))
}

async fn create_graph(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, Json<GraphSummary>), (StatusCode, String)> {
    let graph = if body.trim().is_empty() {
        Graph::default_for(DEFAULT_GRAPH_KIND)
    } else {
        let payload = parse_body(&body)?;
        validated_document(&payload, &state.defaults)?
    };
    let summary = state.store.create(&graph).await.map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_graph(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Graph>, (StatusCode, String)> {
    match state.store.fetch(&id).await.map_err(internal_error)? {
        Some(stored) => Ok(Json(stored.graph)),
        None => Err((StatusCode::NOT_FOUND, "graph not found".to_string())),
    }
}

async fn put_graph(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    body: String,
) -> Result<StatusCode, (StatusCode, String)> {
    let payload = parse_body(&body)?;
    let graph = validated_document(&payload, &state.defaults)?;
    state
        .store
        .upsert(&id, &graph)
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_graph(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.store.delete(&id).await.map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "graph not found".to_string()))
    }
}

async fn get_export(
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, String)> {
    let bytes = export_all_graphs(state.store.pool())
        .await
        .map_err(internal_error)?;
    if bytes.is_empty() {
        return Err((StatusCode::NOT_FOUND, "no graphs to export".to_string()));
    }

    let mut response = Response::new(bytes.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"graphnotes-export.zip\""),
    );
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiGraphRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    max_nodes: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AiGraphResponse {
    graph: Graph,
}

async fn post_ai_graph(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<AiGraphResponse>, (StatusCode, String)> {
    let Some(generator) = state.generator.as_ref() else {
        return Err((
            StatusCode::NOT_IMPLEMENTED,
            "graph generation is not configured".to_string(),
        ));
    };

    let request: AiGraphRequest = serde_json::from_str(&body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid json".to_string()))?;
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "prompt is required".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err((StatusCode::BAD_REQUEST, "prompt is too long".to_string()));
    }

    let max_nodes = clamp_max_nodes(request.max_nodes.unwrap_or(0));
    match generator.generate(prompt, max_nodes).await {
        Ok(graph) => Ok(Json(AiGraphResponse { graph })),
        Err(err) => {
            let detail: String = err.to_string().chars().take(500).collect();
            tracing::error!("ai graph failed: {detail}");
            Err((
                StatusCode::BAD_GATEWAY,
                "failed to generate graph".to_string(),
            ))
        }
    }
}

fn parse_body(body: &str) -> Result<Value, (StatusCode, String)> {
    serde_json::from_str(body.trim())
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid json".to_string()))
}

/// Write payloads must at least be shaped like a document; everything inside
/// is repaired by normalization rather than rejected.
fn validated_document(
    payload: &Value,
    defaults: &SceneDefaults,
) -> Result<Graph, (StatusCode, String)> {
    let nodes_ok = payload.get("nodes").is_some_and(Value::is_array);
    let edges_ok = payload.get("edges").is_some_and(Value::is_array);
    if !nodes_ok || !edges_ok {
        return Err((
            StatusCode::BAD_REQUEST,
            "nodes and edges are required".to_string(),
        ));
    }
    Ok(normalize_graph(Some(payload), DEFAULT_GRAPH_KIND, defaults))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("{err:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
