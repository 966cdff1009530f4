//! Export orchestration.
//!
//! One invocation walks `Configuring → ResolvingTargets → Exporting(c)… →
//! Done`. Collections are exported one after another; each one is
//! finalized before the next begins, and the first error ends the run.

use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{ExportJob, ExportTarget};
use crate::connectors::{create_adapter, stream_records, ExportAdapter, StreamOptions};
use crate::error::{Error, Result};
use crate::schema::{Backend, CollectionDescriptor};
use crate::sink::{LocalSink, RowSink};

/// Phase of an export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPhase {
    /// The job is being assembled.
    Configuring,
    /// The collections to export are being listed.
    ResolvingTargets,
    /// A collection is being exported.
    Exporting(String),
    /// Every collection was exported.
    Done,
}

/// Statistics of one exported collection.
#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    /// Collection name.
    pub collection: String,
    /// Rows written.
    pub rows: u64,
    /// Batches handed to the sink.
    pub batches: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Parquet file of the collection.
    pub parquet_path: PathBuf,
}

impl ExportStats {
    /// Calculate throughput (rows per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.rows as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Source backend.
    pub backend: Backend,
    /// Embedding model recorded with the data.
    pub model_name: String,
    /// Per-collection statistics, in export order.
    pub collections: Vec<ExportStats>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl ExportReport {
    /// Rows written across all collections.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.collections.iter().map(|c| c.rows).sum()
    }
}

/// Export runner.
pub struct Exporter {
    job: ExportJob,
    adapter: Box<dyn ExportAdapter>,
    sink: Box<dyn RowSink>,
    phase: ExportPhase,
}

impl Exporter {
    /// Creates an exporter writing to the local output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is invalid or the output cannot be opened.
    pub fn new(job: ExportJob) -> Result<Self> {
        job.validate()?;
        let adapter = create_adapter(&job.source)?;
        let sink = LocalSink::open(&job.output, job.source.backend(), &job.model_name)?;
        Ok(Self::with_parts(job, adapter, Box::new(sink)))
    }

    /// Creates an exporter from an existing adapter and sink.
    pub fn with_parts(
        job: ExportJob,
        adapter: Box<dyn ExportAdapter>,
        sink: Box<dyn RowSink>,
    ) -> Self {
        Self {
            job,
            adapter,
            sink,
            phase: ExportPhase::Configuring,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &ExportPhase {
        &self.phase
    }

    /// Lists the collections the job exports, in backend order.
    ///
    /// `SQLite` table names ignore ASCII case, so two collections whose
    /// names differ only in case cannot be exported together.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot list its collections, or
    /// [`Error::Config`] if two of them would share an output name.
    pub async fn resolve_targets(&self) -> Result<Vec<CollectionDescriptor>> {
        let targets = match self.job.target() {
            ExportTarget::All => self.adapter.list_collections().await?,
            ExportTarget::Named(name) => vec![self.adapter.descriptor(&name)],
        };

        let mut seen = HashSet::with_capacity(targets.len());
        for target in &targets {
            if !seen.insert(target.name.to_ascii_lowercase()) {
                return Err(Error::Config(format!(
                    "more than one collection would be written as '{}'; export them by name",
                    target.name
                )));
            }
        }
        Ok(targets)
    }

    /// Run the export.
    ///
    /// # Errors
    ///
    /// Returns the first backend, normalization or persistence error.
    pub async fn run(&mut self) -> Result<ExportReport> {
        let start = Instant::now();
        let backend = self.adapter.backend();

        self.phase = ExportPhase::ResolvingTargets;
        info!("Resolving {} collections for '{}'", backend, self.job.source.selector());
        let targets = self.resolve_targets().await?;
        if targets.is_empty() {
            warn!("{} reported no collections to export", backend);
        }

        let mut collections = Vec::with_capacity(targets.len());
        for target in &targets {
            collections.push(self.export_collection(target).await?);
        }

        self.phase = ExportPhase::Done;
        let report = ExportReport {
            backend,
            model_name: self.job.model_name.clone(),
            collections,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            "Export complete: {} collections, {} rows in {:.2}s",
            report.collections.len(),
            report.total_rows(),
            report.duration_secs
        );
        Ok(report)
    }

    async fn export_collection(
        &mut self,
        collection: &CollectionDescriptor,
    ) -> Result<ExportStats> {
        let start = Instant::now();
        self.phase = ExportPhase::Exporting(collection.name.clone());
        info!("Exporting '{}'", collection.name);

        let batch_size = self.job.output.batch_size.max(1);
        let options = StreamOptions {
            page_size: self.job.output.page_size,
            include_cross_references: self.job.source.include_cross_references(),
        };

        let mut stream = stream_records(self.adapter.as_mut(), collection, options).await?;
        self.sink.begin(collection, stream.layout)?;

        let progress = create_progress_bar(stream.info.total, self.job.show_progress);
        progress.set_message(collection.name.clone());

        let mut stats = ExportStats {
            collection: collection.name.clone(),
            ..Default::default()
        };
        let mut buffer = Vec::with_capacity(batch_size);

        while let Some(row) = stream.rows.try_next().await? {
            buffer.push(row);
            if buffer.len() >= batch_size {
                stats.rows += buffer.len() as u64;
                stats.batches += 1;
                progress.inc(buffer.len() as u64);
                self.sink.append(std::mem::take(&mut buffer))?;
            }
        }
        if !buffer.is_empty() {
            stats.rows += buffer.len() as u64;
            stats.batches += 1;
            progress.inc(buffer.len() as u64);
            self.sink.append(buffer)?;
        }

        let summary = self.sink.finalize(collection)?;
        progress.finish_and_clear();

        stats.duration_secs = start.elapsed().as_secs_f64();
        stats.parquet_path = summary.parquet_path;
        info!(
            "Exported '{}': {} rows in {:.2}s ({:.0} rows/sec)",
            stats.collection,
            stats.rows,
            stats.duration_secs,
            stats.throughput()
        );
        Ok(stats)
    }
}

fn create_progress_bar(total: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    match total {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed_precise}] {pos} rows")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    }
}
