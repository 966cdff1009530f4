//! Parquet files written from exported rows.
//!
//! Columns: `id` Utf8, `vector` List<Float32>, optional `sparse_values`
//! Map<UInt32, Float32>, `metadata` Utf8 (JSON), nullable
//! `vector_id_field_name` Utf8 and optional `cross_references` Utf8 (JSON).
//! Files are written with Snappy compression to a temporary path and
//! renamed into place when complete.

use arrow::array::{
    Array, ArrayRef, Float32Builder, ListBuilder, MapBuilder, StringArray, UInt32Builder,
};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{ExportedRow, RowLayout};

/// File-name form of a collection name.
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept and every other byte is
/// written as `%XX`, so two collection names never share a file. Names made
/// only of dots get their first dot encoded too.
pub fn file_stem(collection: &str) -> String {
    if collection.is_empty() {
        return "%".to_string();
    }

    let mut stem = String::with_capacity(collection.len());
    for byte in collection.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    if stem.bytes().all(|b| b == b'.') {
        stem.replace_range(..1, "%2E");
    }
    stem
}

/// Path of the Parquet file of a collection.
pub fn parquet_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{}.parquet", file_stem(collection)))
}

fn json_column(
    rows: &[ExportedRow],
    column: &str,
    encode: impl Fn(&ExportedRow) -> serde_json::Result<String>,
) -> Result<StringArray> {
    let encoded = rows
        .iter()
        .map(|row| {
            encode(row).map_err(|e| {
                Error::Persistence(format!("cannot encode Parquet column '{column}': {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(StringArray::from(encoded))
}

/// Builds the columns of a batch, paired with their names and nullability.
fn build_columns(
    rows: &[ExportedRow],
    layout: RowLayout,
) -> Result<Vec<(&'static str, ArrayRef, bool)>> {
    let ids: StringArray = rows.iter().map(|r| Some(r.id.as_str())).collect();

    let mut vectors = ListBuilder::new(Float32Builder::new());
    for row in rows {
        vectors.values().append_slice(&row.vector);
        vectors.append(true);
    }

    let mut columns: Vec<(&'static str, ArrayRef, bool)> = vec![
        ("id", Arc::new(ids) as ArrayRef, false),
        ("vector", Arc::new(vectors.finish()) as ArrayRef, false),
    ];

    if layout.sparse_values {
        let mut sparse = MapBuilder::new(None, UInt32Builder::new(), Float32Builder::new());
        for row in rows {
            if let Some(values) = &row.sparse_values {
                for (index, value) in values {
                    sparse.keys().append_value(*index);
                    sparse.values().append_value(*value);
                }
            }
            sparse.append(true)?;
        }
        columns.push(("sparse_values", Arc::new(sparse.finish()) as ArrayRef, false));
    }

    let metadata = json_column(rows, "metadata", |r| serde_json::to_string(&r.metadata))?;
    columns.push(("metadata", Arc::new(metadata) as ArrayRef, false));

    let id_fields: StringArray = rows
        .iter()
        .map(|r| r.vector_id_field_name.as_deref())
        .collect();
    columns.push(("vector_id_field_name", Arc::new(id_fields) as ArrayRef, true));

    if layout.cross_references {
        columns.push((
            "cross_references",
            Arc::new(json_column(rows, "cross_references", |r| {
                serde_json::to_string(r.cross_references.as_deref().unwrap_or_default())
            })?) as ArrayRef,
            false,
        ));
    }

    Ok(columns)
}

/// Arrow schema of a collection file.
///
/// Field types are taken from the builders so batches always match. File
/// metadata is not part of the schema: it goes into the footer key/value
/// list, which readers merge back into the schema they return.
pub fn schema(layout: RowLayout) -> Result<Schema> {
    let fields: Vec<Field> = build_columns(&[], layout)?
        .into_iter()
        .map(|(name, array, nullable)| Field::new(name, array.data_type().clone(), nullable))
        .collect();
    Ok(Schema::new(fields))
}

/// Streaming writer for one collection file.
pub struct ParquetFileWriter {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    layout: RowLayout,
    temp_path: PathBuf,
    final_path: PathBuf,
    rows: u64,
}

impl ParquetFileWriter {
    /// Starts writing `path` through a temporary sibling file.
    ///
    /// `metadata` is stored in the footer in key order, so the same rows
    /// always produce the same bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn create(
        path: &Path,
        layout: RowLayout,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let schema = Arc::new(schema(layout)?);
        let temp_path = path.with_extension("parquet.tmp");

        let key_values: Vec<KeyValue> = metadata
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_key_value_metadata(Some(key_values))
            .build();

        let file = File::create(&temp_path).map_err(|e| {
            Error::Persistence(format!("cannot create {}: {e}", temp_path.display()))
        })?;
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))?;

        Ok(Self {
            writer,
            schema,
            layout,
            temp_path,
            final_path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Appends rows as one record batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be encoded or written.
    pub fn write_rows(&mut self, rows: &[ExportedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns = build_columns(rows, self.layout)?
            .into_iter()
            .map(|(_, array, _)| array)
            .collect();
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), columns)?;
        self.writer.write(&batch)?;
        self.rows += rows.len() as u64;
        Ok(())
    }

    /// Closes the file and moves it into place, returning the row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the footer cannot be written or the rename fails.
    pub fn finish(self) -> Result<u64> {
        self.writer.close()?;
        std::fs::rename(&self.temp_path, &self.final_path).map_err(|e| {
            Error::Persistence(format!(
                "cannot move {} into place: {e}",
                self.final_path.display()
            ))
        })?;
        Ok(self.rows)
    }

    /// Drops the partial file after a failure.
    pub fn abort(self) {
        let temp_path = self.temp_path.clone();
        drop(self);
        let _ = std::fs::remove_file(temp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Metadata, SparseValues};
    use arrow::array::{ListArray, MapArray};
    use arrow::datatypes::DataType;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn row(id: &str, sparse: Option<SparseValues>) -> ExportedRow {
        ExportedRow {
            id: id.to_string(),
            vector: vec![1.0, 2.0, 3.0],
            sparse_values: sparse,
            metadata: Metadata::from([("title".to_string(), serde_json::json!(id))]),
            vector_id_field_name: None,
            cross_references: None,
        }
    }

    fn meta() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("model_name".to_string(), "text-embedding-ada-002".to_string()),
            ("backend".to_string(), "qdrant".to_string()),
        ])
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("docs"), "docs");
        assert_eq!(file_stem("idx-ns.v2"), "idx-ns.v2");
        assert_eq!(file_stem("a/b c"), "a%2Fb%20c");
        assert_eq!(file_stem("100%"), "100%25");
        assert_eq!(file_stem("caf\u{e9}"), "caf%C3%A9");
        assert_eq!(file_stem(".."), "%2E.");
        assert_eq!(file_stem(""), "%");
    }

    #[test]
    fn test_file_stem_keeps_names_apart() {
        let names = ["x/y", "x_y", "x%2Fy", "x y", "x%20y", ".", "%2E", "", "%"];
        let stems: std::collections::HashSet<String> =
            names.iter().map(|name| file_stem(name)).collect();
        assert_eq!(stems.len(), names.len());
    }

    #[test]
    fn test_schema_follows_layout() {
        let dense = schema(RowLayout::default()).unwrap();
        assert_eq!(dense.fields().len(), 4);
        assert!(dense.field_with_name("sparse_values").is_err());
        assert!(matches!(
            dense.field_with_name("vector").unwrap().data_type(),
            DataType::List(_)
        ));
        assert!(dense.field_with_name("vector_id_field_name").unwrap().is_nullable());

        let sparse = schema(
            RowLayout {
                sparse_values: true,
                cross_references: true,
            },
        )
        .unwrap();
        assert_eq!(sparse.fields().len(), 6);
        assert!(matches!(
            sparse.field_with_name("sparse_values").unwrap().data_type(),
            DataType::Map(_, _)
        ));
        assert!(sparse.metadata().is_empty());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = parquet_path(dir.path(), "docs");
        let layout = RowLayout {
            sparse_values: true,
            cross_references: false,
        };

        let mut writer = ParquetFileWriter::create(&path, layout, &meta()).unwrap();
        writer
            .write_rows(&[row("a", Some(SparseValues::from([(4, 0.5), (1, 0.25)])))])
            .unwrap();
        writer.write_rows(&[row("b", Some(SparseValues::new()))]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
        assert!(!path.with_extension("parquet.tmp").exists());

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        assert_eq!(
            builder.schema().metadata().get("model_name").map(String::as_str),
            Some("text-embedding-ada-002")
        );
        let batches: Vec<RecordBatch> = builder
            .build()
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(total, 2);

        let first = &batches[0];
        let vectors = first
            .column_by_name("vector")
            .unwrap()
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        assert_eq!(vectors.value(0).len(), 3);
        let sparse = first
            .column_by_name("sparse_values")
            .unwrap()
            .as_any()
            .downcast_ref::<MapArray>()
            .unwrap();
        assert_eq!(sparse.value(0).len(), 2);
    }

    #[test]
    fn test_same_rows_write_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = meta();
        metadata.insert("collection".to_string(), "docs".to_string());
        metadata.insert("exporter".to_string(), "vector-export".to_string());

        let write = |name: &str| {
            let path = parquet_path(dir.path(), name);
            let mut writer =
                ParquetFileWriter::create(&path, RowLayout::default(), &metadata).unwrap();
            writer.write_rows(&[row("a", None), row("b", None)]).unwrap();
            writer.finish().unwrap();
            std::fs::read(path).unwrap()
        };

        assert_eq!(write("first"), write("second"));
    }

    #[test]
    fn test_empty_file_has_schema_and_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = parquet_path(dir.path(), "empty");

        let writer = ParquetFileWriter::create(&path, RowLayout::default(), &meta()).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
        assert_eq!(builder.metadata().file_metadata().num_rows(), 0);
        assert!(builder.schema().field_with_name("id").is_ok());
    }

    #[test]
    fn test_abort_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = parquet_path(dir.path(), "docs");
        let writer = ParquetFileWriter::create(&path, RowLayout::default(), &meta()).unwrap();
        writer.abort();
        assert!(!path.exists());
        assert!(!path.with_extension("parquet.tmp").exists());
    }
}
