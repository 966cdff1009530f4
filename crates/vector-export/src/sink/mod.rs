//! Local persistence of exported rows.
//!
//! Rows are buffered and flushed in `batch_size` transactions into one
//! `SQLite` table per collection. Finalizing a collection rewrites its
//! Parquet file from the table and records a manifest line.

pub mod parquet_file;
pub mod sqlite;

use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::OutputOptions;
use crate::error::{Error, Result};
use crate::schema::{Backend, CollectionDescriptor, ExportedRow, RowLayout};
use self::parquet_file::{parquet_path, ParquetFileWriter};
use self::sqlite::ManifestEntry;

/// Outcome of finalizing one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSummary {
    /// Collection name.
    pub collection: String,
    /// Rows in the table and the Parquet file.
    pub rows: u64,
    /// Batches flushed since `begin`.
    pub batches: u64,
    /// Vector dimension of the exported rows.
    pub dimension: Option<usize>,
    /// Path of the Parquet file.
    pub parquet_path: PathBuf,
}

/// Destination of normalized rows.
pub trait RowSink: Send {
    /// Prepares an empty destination for a collection.
    ///
    /// Anything left by a previous run for the same collection is replaced.
    fn begin(&mut self, collection: &CollectionDescriptor, layout: RowLayout) -> Result<()>;

    /// Buffers rows, flushing every full batch.
    fn append(&mut self, rows: Vec<ExportedRow>) -> Result<()>;

    /// Flushes the remaining rows and writes the collection's artifacts.
    ///
    /// Finalizing the same collection again rewrites the same artifacts.
    fn finalize(&mut self, collection: &CollectionDescriptor) -> Result<SinkSummary>;
}

struct ActiveTable {
    name: String,
    layout: RowLayout,
    buffer: Vec<ExportedRow>,
    batches: u64,
}

/// `SQLite` database plus one Parquet file per collection.
pub struct LocalSink {
    conn: Connection,
    dir: PathBuf,
    batch_size: usize,
    backend: Backend,
    model_name: String,
    active: Option<ActiveTable>,
}

impl LocalSink {
    /// Opens (or creates) the output directory and database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the directory or database cannot be
    /// created.
    pub fn open(output: &OutputOptions, backend: Backend, model_name: &str) -> Result<Self> {
        if output.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }

        std::fs::create_dir_all(&output.dir).map_err(|e| {
            Error::Persistence(format!("cannot create {}: {e}", output.dir.display()))
        })?;

        let db_path = output.database_path();
        let conn = Connection::open(&db_path)?;
        sqlite::initialize(&conn)?;
        debug!("Opened export database {}", db_path.display());

        Ok(Self {
            conn,
            dir: output.dir.clone(),
            batch_size: output.batch_size,
            backend,
            model_name: model_name.to_string(),
            active: None,
        })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Manifest line of a finalized collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read.
    pub fn manifest(&self, collection: &str) -> Result<Option<ManifestEntry>> {
        sqlite::manifest_entry(&self.conn, collection)
    }

    fn flush(&mut self, all: bool) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        while active.buffer.len() >= self.batch_size || (all && !active.buffer.is_empty()) {
            let take = active.buffer.len().min(self.batch_size);
            let batch: Vec<ExportedRow> = active.buffer.drain(..take).collect();
            sqlite::insert_batch(&mut self.conn, &active.name, active.layout, &batch)?;
            active.batches += 1;
            debug!(
                "Flushed batch {} ({} rows) into '{}'",
                active.batches,
                batch.len(),
                active.name
            );
        }
        Ok(())
    }

    fn write_parquet(
        &self,
        name: &str,
        layout: RowLayout,
    ) -> Result<(u64, Option<usize>, PathBuf)> {
        let path = parquet_path(&self.dir, name);
        let metadata = BTreeMap::from([
            ("model_name".to_string(), self.model_name.clone()),
            ("backend".to_string(), self.backend.to_string()),
            ("collection".to_string(), name.to_string()),
        ]);

        let mut writer = ParquetFileWriter::create(&path, layout, &metadata)?;
        let mut dimension = None;
        let written = sqlite::for_each_chunk(&self.conn, name, layout, self.batch_size, |chunk| {
            if dimension.is_none() {
                dimension = chunk.first().map(|row| row.vector.len()).filter(|d| *d > 0);
            }
            writer.write_rows(chunk)
        });

        match written {
            Ok(_) => {
                let rows = writer.finish()?;
                Ok((rows, dimension, path))
            }
            Err(e) => {
                writer.abort();
                Err(e)
            }
        }
    }
}

impl RowSink for LocalSink {
    fn begin(&mut self, collection: &CollectionDescriptor, layout: RowLayout) -> Result<()> {
        if let Some(active) = &self.active {
            if active.name != collection.name {
                return Err(Error::Persistence(format!(
                    "collection '{}' was not finalized before '{}' began",
                    active.name, collection.name
                )));
            }
        }

        sqlite::recreate_table(&self.conn, &collection.name, layout)?;
        self.active = Some(ActiveTable {
            name: collection.name.clone(),
            layout,
            buffer: Vec::with_capacity(self.batch_size),
            batches: 0,
        });
        info!("Writing collection '{}'", collection.name);
        Ok(())
    }

    fn append(&mut self, rows: Vec<ExportedRow>) -> Result<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::Persistence("append called before begin".to_string()))?;
        active.buffer.extend(rows);
        self.flush(false)
    }

    fn finalize(&mut self, collection: &CollectionDescriptor) -> Result<SinkSummary> {
        let mut batches = 0;
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.name == collection.name)
        {
            self.flush(true)?;
            batches = self.active.take().map_or(0, |active| active.batches);
        } else if let Some(active) = &self.active {
            return Err(Error::Persistence(format!(
                "cannot finalize '{}' while '{}' is open",
                collection.name, active.name
            )));
        }

        let layout = sqlite::table_layout(&self.conn, &collection.name)?.ok_or_else(|| {
            Error::Persistence(format!("no table for collection '{}'", collection.name))
        })?;

        let (rows, dimension, path) = self.write_parquet(&collection.name, layout)?;

        sqlite::upsert_manifest(
            &self.conn,
            &ManifestEntry {
                collection: collection.name.clone(),
                backend: self.backend.to_string(),
                model_name: self.model_name.clone(),
                row_count: rows,
                dimension,
                sparse: layout.sparse_values,
                cross_references: layout.cross_references,
                parquet_path: path.display().to_string(),
                exported_at: chrono::Utc::now().to_rfc3339(),
            },
        )?;

        info!(
            "Finalized '{}': {} rows, Parquet file {}",
            collection.name,
            rows,
            path.display()
        );

        Ok(SinkSummary {
            collection: collection.name.clone(),
            rows,
            batches,
            dimension,
            parquet_path: path,
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
