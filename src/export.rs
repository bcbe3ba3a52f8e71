//! Bulk export of stored documents as a zip archive.

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use zip::write::{FileOptions, ZipWriter};

#[derive(sqlx::FromRow)]
struct ExportRow {
    id: String,
    name: String,
    data: String,
}

/// Bundles every stored document into a zip of pretty-printed JSON files.
/// An empty store yields an empty byte vector.
pub async fn export_all_graphs(pool: &SqlitePool) -> Result<Vec<u8>> {
    let rows: Vec<ExportRow> =
        sqlx::query_as("SELECT id, name, data FROM graphs ORDER BY updated_at DESC")
            .fetch_all(pool)
            .await
            .context("Failed to fetch graphs for export")?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options: FileOptions<()> = FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);

    for row in &rows {
        // Stored documents are compact; re-render them readable. Rows that
        // somehow hold broken JSON are exported verbatim rather than lost.
        let rendered = match serde_json::from_str::<serde_json::Value>(&row.data) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| row.data.clone()),
            Err(_) => row.data.clone(),
        };
        zip.start_file(entry_name(&row.name, &row.id), options)
            .context("Failed to start zip entry")?;
        zip.write_all(rendered.as_bytes())
            .context("Failed to write zip entry")?;
    }

    zip.finish().context("Failed to finalize zip archive")?;
    Ok(cursor.into_inner())
}

// `{slugified-name}-{id prefix}.json`; the id prefix keeps entries unique
// when documents share a name.
fn entry_name(name: &str, id: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let stem = if slug.is_empty() { "graph" } else { slug };
    let suffix: String = id.chars().take(8).collect();
    format!("{stem}-{suffix}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::store::{Store, StoreConfig};
    use std::io::Read;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::connect(StoreConfig {
            path: dir.path().join("test.db"),
            ..StoreConfig::default()
        })
        .await
        .expect("Failed to open store");
        (dir, store)
    }

    #[tokio::test]
    async fn exports_each_stored_graph_as_json_entry() {
        let (_dir, store) = temp_store().await;

        let mut first = Graph::default_for("note");
        first.name = "Release Plan".to_string();
        store.create(&first).await.expect("create first");
        let mut second = Graph::default_for("note");
        second.name = "Release Plan".to_string();
        store.create(&second).await.expect("create second");

        let bytes = export_all_graphs(store.pool()).await.expect("export");
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).expect("export should be a zip");
        assert_eq!(archive.len(), 2);

        let mut names = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).expect("entry should open");
            names.push(entry.name().to_string());
            let mut contents = String::new();
            entry.read_to_string(&mut contents).expect("entry should read");
            assert!(contents.contains("\"Release Plan\""));
        }
        assert!(names.iter().all(|name| name.starts_with("release-plan-")));
        assert_ne!(names[0], names[1], "shared names must not collide");
    }

    #[tokio::test]
    async fn empty_store_exports_nothing() {
        let (_dir, store) = temp_store().await;
        let bytes = export_all_graphs(store.pool()).await.expect("export");
        assert!(bytes.is_empty());
    }

    #[test]
    fn entry_names_are_slugged_and_suffixed() {
        assert_eq!(entry_name("Release Plan", "abcdef1234"), "release-plan-abcdef12.json");
        assert_eq!(entry_name("   ", "abcdef1234"), "graph-abcdef12.json");
    }
}
