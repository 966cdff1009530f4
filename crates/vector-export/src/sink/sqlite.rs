//! `SQLite` tables holding exported rows.
//!
//! One table per collection, named after the collection as a quoted
//! identifier. JSON-encoded columns keep the vector, sparse values,
//! metadata and references lossless.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::schema::{ExportedRow, RowLayout};

/// Name of the manifest table.
pub const MANIFEST_TABLE: &str = "_export_manifest";

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Collection (and table) name.
    pub collection: String,
    /// Backend short name.
    pub backend: String,
    /// Embedding model recorded with the data.
    pub model_name: String,
    /// Rows in the table.
    pub row_count: u64,
    /// Vector dimension of the exported rows, if any row was exported.
    pub dimension: Option<usize>,
    /// Whether the table carries sparse values.
    pub sparse: bool,
    /// Whether the table carries cross-references.
    pub cross_references: bool,
    /// Path of the Parquet file.
    pub parquet_path: String,
    /// RFC 3339 finalize time.
    pub exported_at: String,
}

/// Quotes a name as an SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names of a collection table, in storage order.
pub fn columns(layout: RowLayout) -> Vec<&'static str> {
    let mut cols = vec!["id", "vector"];
    if layout.sparse_values {
        cols.push("sparse_values");
    }
    cols.push("metadata");
    cols.push("vector_id_field_name");
    if layout.cross_references {
        cols.push("cross_references");
    }
    cols
}

/// Applies connection pragmas and creates the manifest table.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MANIFEST_TABLE} (
            collection TEXT PRIMARY KEY,
            backend TEXT NOT NULL,
            model_name TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            dimension INTEGER,
            sparse INTEGER NOT NULL,
            cross_references INTEGER NOT NULL,
            parquet_path TEXT NOT NULL,
            exported_at TEXT NOT NULL
        )"
    ))?;
    Ok(())
}

/// Drops a table left by a previous run and creates it for `layout`.
pub fn recreate_table(conn: &Connection, table: &str, layout: RowLayout) -> Result<()> {
    if table == MANIFEST_TABLE {
        return Err(Error::Persistence(format!(
            "collection name '{table}' is reserved"
        )));
    }

    let quoted = quote_identifier(table);
    let definitions: Vec<&str> = columns(layout)
        .into_iter()
        .map(|col| match col {
            "id" => "id TEXT PRIMARY KEY",
            "vector" => "vector TEXT NOT NULL",
            "sparse_values" => "sparse_values TEXT NOT NULL",
            "metadata" => "metadata TEXT NOT NULL",
            "vector_id_field_name" => "vector_id_field_name TEXT",
            _ => "cross_references TEXT NOT NULL",
        })
        .collect();

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {quoted};
         CREATE TABLE {quoted} ({});",
        definitions.join(", ")
    ))?;
    Ok(())
}

/// Reads the layout of an existing collection table.
///
/// Returns `None` if the table does not exist.
pub fn table_layout(conn: &Connection, table: &str) -> Result<Option<RowLayout>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if names.is_empty() {
        return Ok(None);
    }
    Ok(Some(RowLayout {
        sparse_values: names.iter().any(|n| n == "sparse_values"),
        cross_references: names.iter().any(|n| n == "cross_references"),
    }))
}

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Persistence(format!("cannot encode column '{column}': {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str, column: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Persistence(format!("cannot decode column '{column}': {e}")))
}

fn row_values(row: &ExportedRow, layout: RowLayout) -> Result<Vec<SqlValue>> {
    let mut values = vec![
        SqlValue::Text(row.id.clone()),
        SqlValue::Text(to_json(&row.vector, "vector")?),
    ];
    if layout.sparse_values {
        let sparse = row.sparse_values.clone().unwrap_or_default();
        values.push(SqlValue::Text(to_json(&sparse, "sparse_values")?));
    }
    values.push(SqlValue::Text(to_json(&row.metadata, "metadata")?));
    values.push(
        row.vector_id_field_name
            .clone()
            .map_or(SqlValue::Null, SqlValue::Text),
    );
    if layout.cross_references {
        let refs = row.cross_references.clone().unwrap_or_default();
        values.push(SqlValue::Text(to_json(&refs, "cross_references")?));
    }
    Ok(values)
}

/// Inserts rows in one transaction.
///
/// Either every row of the batch is stored or none is.
pub fn insert_batch(
    conn: &mut Connection,
    table: &str,
    layout: RowLayout,
    rows: &[ExportedRow],
) -> Result<usize> {
    let cols = columns(layout);
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        cols.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row_values(row, layout)?))?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

/// Reads the table in insertion order, handing rows over in chunks.
///
/// Returns the number of rows read.
pub fn for_each_chunk<F>(
    conn: &Connection,
    table: &str,
    layout: RowLayout,
    chunk_size: usize,
    mut f: F,
) -> Result<u64>
where
    F: FnMut(&[ExportedRow]) -> Result<()>,
{
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        columns(layout).join(", "),
        quote_identifier(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let chunk_size = chunk_size.max(1);
    let mut chunk = Vec::with_capacity(chunk_size);
    let mut total = 0u64;

    while let Some(row) = rows.next()? {
        let vector: String = row.get("vector")?;
        let metadata: String = row.get("metadata")?;
        let sparse_values = if layout.sparse_values {
            let text: String = row.get("sparse_values")?;
            Some(from_json(&text, "sparse_values")?)
        } else {
            None
        };
        let cross_references = if layout.cross_references {
            let text: String = row.get("cross_references")?;
            Some(from_json(&text, "cross_references")?)
        } else {
            None
        };

        chunk.push(ExportedRow {
            id: row.get("id")?,
            vector: from_json(&vector, "vector")?,
            sparse_values,
            metadata: from_json(&metadata, "metadata")?,
            vector_id_field_name: row.get("vector_id_field_name")?,
            cross_references,
        });

        if chunk.len() == chunk_size {
            f(&chunk)?;
            total += chunk.len() as u64;
            chunk.clear();
        }
    }

    if !chunk.is_empty() {
        f(&chunk)?;
        total += chunk.len() as u64;
    }
    Ok(total)
}

/// Inserts or replaces the manifest line of a collection.
pub fn upsert_manifest(conn: &Connection, entry: &ManifestEntry) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {MANIFEST_TABLE}
             (collection, backend, model_name, row_count, dimension, sparse,
              cross_references, parquet_path, exported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            entry.collection,
            entry.backend,
            entry.model_name,
            i64::try_from(entry.row_count).unwrap_or(i64::MAX),
            entry.dimension.and_then(|d| i64::try_from(d).ok()),
            entry.sparse,
            entry.cross_references,
            entry.parquet_path,
            entry.exported_at,
        ],
    )?;
    Ok(())
}

/// Reads the manifest line of a collection.
pub fn manifest_entry(conn: &Connection, collection: &str) -> Result<Option<ManifestEntry>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT collection, backend, model_name, row_count, dimension, sparse,
                        cross_references, parquet_path, exported_at
                 FROM {MANIFEST_TABLE} WHERE collection = ?1"
            ),
            [collection],
            |row| {
                Ok(ManifestEntry {
                    collection: row.get(0)?,
                    backend: row.get(1)?,
                    model_name: row.get(2)?,
                    row_count: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                    dimension: row
                        .get::<_, Option<i64>>(4)?
                        .and_then(|d| usize::try_from(d).ok()),
                    sparse: row.get(5)?,
                    cross_references: row.get(6)?,
                    parquet_path: row.get(7)?,
                    exported_at: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CrossReference, Metadata, SparseValues};

    fn row_count(conn: &Connection, table: &str) -> u64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get::<_, i64>(0),
        )
        .unwrap() as u64
    }

    fn row(id: &str) -> ExportedRow {
        ExportedRow {
            id: id.to_string(),
            vector: vec![0.25, 0.5],
            sparse_values: Some(SparseValues::from([(3, 0.75)])),
            metadata: Metadata::from([("k".to_string(), serde_json::json!(id))]),
            vector_id_field_name: Some("k".to_string()),
            cross_references: Some(vec![CrossReference {
                referenced_class: "Author".to_string(),
                referenced_id: "x".to_string(),
            }]),
        }
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("docs"), "\"docs\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_columns_follow_layout() {
        assert_eq!(
            columns(RowLayout::default()),
            vec!["id", "vector", "metadata", "vector_id_field_name"]
        );
        let full = RowLayout {
            sparse_values: true,
            cross_references: true,
        };
        assert_eq!(columns(full).len(), 6);
    }

    #[test]
    fn test_insert_and_read_back() {
        let mut conn = conn();
        let layout = RowLayout {
            sparse_values: true,
            cross_references: true,
        };
        recreate_table(&conn, "my docs", layout).unwrap();
        insert_batch(&mut conn, "my docs", layout, &[row("a"), row("b"), row("c")]).unwrap();

        assert_eq!(table_layout(&conn, "my docs").unwrap(), Some(layout));
        assert_eq!(row_count(&conn, "my docs"), 3);

        let mut chunks = Vec::new();
        let total = for_each_chunk(&conn, "my docs", layout, 2, |chunk| {
            chunks.push(chunk.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(total, 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][0], row("a"));
        assert_eq!(chunks[1][0].id, "c");
    }

    #[test]
    fn test_duplicate_id_rolls_back_batch() {
        let mut conn = conn();
        recreate_table(&conn, "docs", RowLayout::default()).unwrap();
        let mut dense = row("a");
        dense.sparse_values = None;
        dense.cross_references = None;

        let result = insert_batch(
            &mut conn,
            "docs",
            RowLayout::default(),
            &[dense.clone(), dense],
        );
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(row_count(&conn, "docs"), 0);
    }

    #[test]
    fn test_recreate_drops_previous_rows() {
        let mut conn = conn();
        recreate_table(&conn, "docs", RowLayout::default()).unwrap();
        insert_batch(&mut conn, "docs", RowLayout::default(), &[row("a")]).unwrap();
        recreate_table(&conn, "docs", RowLayout::default()).unwrap();
        assert_eq!(row_count(&conn, "docs"), 0);
    }

    #[test]
    fn test_manifest_name_is_reserved() {
        let conn = conn();
        assert!(recreate_table(&conn, MANIFEST_TABLE, RowLayout::default()).is_err());
    }

    #[test]
    fn test_missing_table_has_no_layout() {
        assert_eq!(table_layout(&conn(), "nope").unwrap(), None);
    }

    #[test]
    fn test_manifest_upsert() {
        let conn = conn();
        let mut entry = ManifestEntry {
            collection: "docs".to_string(),
            backend: "qdrant".to_string(),
            model_name: "m".to_string(),
            row_count: 3,
            dimension: Some(4),
            sparse: false,
            cross_references: false,
            parquet_path: "out/docs.parquet".to_string(),
            exported_at: "2024-01-01T00:00:00+00:00".to_string(),
        };
        upsert_manifest(&conn, &entry).unwrap();
        entry.row_count = 5;
        upsert_manifest(&conn, &entry).unwrap();

        assert_eq!(manifest_entry(&conn, "docs").unwrap(), Some(entry));
        assert_eq!(manifest_entry(&conn, "other").unwrap(), None);
    }
}
