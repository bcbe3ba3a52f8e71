//! Sqlite persistence for graph documents.
//!
//! Each row stores the canonical document JSON plus denormalized name/kind
//! columns for listing, and a `node_notes` column holding the per-node notes
//! extracted at save time so external tooling can read them without parsing
//! whole documents. Whatever is on disk flows through the normalizer on load,
//! so a row written by an old client or corrupted by hand still comes back as
//! a usable document.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::graph::{DEFAULT_GRAPH_KIND, Graph, SceneDefaults, normalize_graph};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub defaults: SceneDefaults,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = std::env::var("GRAPHNOTES_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        Self {
            path,
            defaults: SceneDefaults::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "graphnotes")
        .map(|dirs| dirs.data_dir().join("graphnotes.db"))
        .unwrap_or_else(|| PathBuf::from("graphnotes.db"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredGraph {
    pub id: String,
    pub graph: Graph,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    defaults: SceneDefaults,
}

impl Store {
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory '{}'", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at '{}'", config.path.display()))?;

        let store = Self {
            pool,
            defaults: config.defaults,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graphs (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL DEFAULT 'Untitled Graph',
                kind TEXT NOT NULL DEFAULT 'note',
                data TEXT NOT NULL,
                node_notes TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create graphs table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_graphs_kind ON graphs(kind, updated_at DESC)")
            .execute(&self.pool)
            .await
            .context("Failed to create graphs kind index")?;

        // Rows written before the denormalized columns carried real values
        // keep name and kind only inside the document JSON.
        sqlx::query(
            r#"
            UPDATE graphs
            SET name = COALESCE(NULLIF(TRIM(json_extract(data, '$.name')), ''), 'Untitled Graph')
            WHERE TRIM(name) = ''
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to backfill graph names")?;

        sqlx::query(
            r#"
            UPDATE graphs
            SET kind = COALESCE(NULLIF(TRIM(json_extract(data, '$.kind')), ''), 'note')
            WHERE TRIM(kind) = ''
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to backfill graph kinds")?;

        Ok(())
    }

    /// Summaries of every document of the given kind, most recently updated
    /// first. A blank kind lists the default kind.
    pub async fn list(&self, kind: &str) -> Result<Vec<GraphSummary>> {
        let kind = kind.trim();
        let kind = if kind.is_empty() { DEFAULT_GRAPH_KIND } else { kind };

        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            name: String,
            updated_at: String,
        }

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT id, name, updated_at FROM graphs WHERE kind = ? ORDER BY updated_at DESC",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list graphs")?;

        Ok(rows
            .into_iter()
            .map(|row| GraphSummary {
                id: row.id,
                name: row.name,
                updated_at: parse_timestamp(&row.updated_at),
            })
            .collect())
    }

    /// Inserts a new document under a fresh id and returns its summary.
    pub async fn create(&self, graph: &Graph) -> Result<GraphSummary> {
        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let data = serde_json::to_string(graph).context("Failed to encode graph")?;

        sqlx::query(
            r#"
            INSERT INTO graphs (id, name, kind, data, node_notes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&graph.name)
        .bind(&graph.kind)
        .bind(&data)
        .bind(extract_node_notes(graph))
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to create graph")?;

        Ok(GraphSummary {
            id,
            name: graph.name.clone(),
            updated_at: now,
        })
    }

    /// Loads one document, re-normalized. `None` when the id is unknown.
    pub async fn fetch(&self, id: &str) -> Result<Option<StoredGraph>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            data: String,
            updated_at: String,
        }

        let row: Option<Row> = sqlx::query_as("SELECT id, data, updated_at FROM graphs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load graph")?;

        Ok(row.map(|row| {
            let graph = match serde_json::from_str::<serde_json::Value>(&row.data) {
                Ok(value) => normalize_graph(Some(&value), DEFAULT_GRAPH_KIND, &self.defaults),
                Err(err) => {
                    tracing::warn!("stored graph {} held unparseable json: {err}", row.id);
                    Graph::default_for(DEFAULT_GRAPH_KIND)
                }
            };
            StoredGraph {
                id: row.id,
                graph,
                updated_at: parse_timestamp(&row.updated_at),
            }
        }))
    }

    /// Writes a document under the given id, inserting or replacing.
    pub async fn upsert(&self, id: &str, graph: &Graph) -> Result<()> {
        let data = serde_json::to_string(graph).context("Failed to encode graph")?;

        sqlx::query(
            r#"
            INSERT INTO graphs (id, name, kind, data, node_notes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                data = excluded.data,
                node_notes = excluded.node_notes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&graph.name)
        .bind(&graph.kind)
        .bind(&data)
        .bind(extract_node_notes(graph))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save graph")?;

        Ok(())
    }

    /// Deletes one document; `false` when the id was unknown.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM graphs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete graph")?
            .rows_affected();
        Ok(affected > 0)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeNotesEntry<'a> {
    id: &'a str,
    node_notes: &'a str,
}

fn extract_node_notes(graph: &Graph) -> String {
    let entries: Vec<NodeNotesEntry> = graph
        .nodes
        .iter()
        .filter_map(|node| {
            node.node_notes.as_deref().map(|notes| NodeNotesEntry {
                id: &node.id,
                node_notes: notes,
            })
        })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}
