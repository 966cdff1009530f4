// Export tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Vector Export
//!
//! `vector-export` is a CLI tool and library for backing up vector records
//! from hosted vector databases into local files: one `SQLite` table and one
//! Parquet file per exported collection.
//!
//! ## Supported Sources
//!
//! | Source | Collection | Pagination | Notes |
//! |--------|------------|------------|-------|
//! | Pinecone | index, or index × namespace | list token | sparse values for `dotproduct` indexes |
//! | Weaviate | class | offset | optional cross-references |
//! | Qdrant | collection | scroll offset | named and sparse vectors |
//!
//! ## Quick Start
//!
//! ```bash
//! # One Qdrant collection
//! vector-export qdrant -u http://localhost:6333 -c documents
//!
//! # Every Weaviate class, with cross-references
//! vector-export weaviate -u http://localhost:8080 -c all -i Y
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! model_name: all-MiniLM-L6-v2
//!
//! source:
//!   type: qdrant
//!   url: http://localhost:6333
//!   collection: all
//!
//! output:
//!   dir: ./vector_export
//!   database: export.db
//!   batch_size: 1000
//!   page_size: 100
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod wizard;

pub use config::{ExportConfig, ExportJob, ExportTarget, OutputOptions, SourceConfig};
pub use connectors::{create_adapter, stream_records, Cursor, ExportAdapter, RecordStream};
pub use error::{Error, Result};
pub use pipeline::{ExportPhase, ExportReport, ExportStats, Exporter};
pub use schema::{Backend, CollectionDescriptor, CrossReference, ExportedRow, RowLayout};
pub use sink::{LocalSink, RowSink, SinkSummary};
