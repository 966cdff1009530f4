//! Configuration types for vector-export.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schema::Backend;

/// Literal selector meaning "every collection of the backend".
pub const ALL_COLLECTIONS: &str = "all";

/// Default embedding model recorded with the exported data.
pub const DEFAULT_MODEL_NAME: &str = "text-embedding-ada-002";

/// Environment variable holding the Pinecone API key.
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";

/// Environment variable holding the Weaviate API key.
pub const WEAVIATE_API_KEY_ENV: &str = "WEAVIATE_API_KEY";

/// Environment variable holding the Qdrant API key.
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

/// Configuration file contents.
///
/// Every field is optional; command-line flags override file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Source database, when the file describes the whole job.
    #[serde(default)]
    pub source: Option<SourceConfig>,
    /// Embedding model recorded alongside the data.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Local output options.
    #[serde(default)]
    pub output: OutputOptions,
}

/// Source database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Pinecone indexes.
    #[serde(rename = "pinecone")]
    Pinecone(PineconeConfig),
    /// Weaviate classes.
    #[serde(rename = "weaviate")]
    Weaviate(WeaviateConfig),
    /// Qdrant collections.
    #[serde(rename = "qdrant")]
    Qdrant(QdrantConfig),
}

/// Pinecone configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PineconeConfig {
    /// Pinecone API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment (e.g., "us-east-1-aws").
    #[serde(default)]
    pub environment: String,
    /// Index name, or "all".
    #[serde(default = "default_all")]
    pub index: String,
    /// Namespace to export when a single index is named.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Control plane URL override.
    #[serde(default)]
    pub controller_url: Option<String>,
}

/// Weaviate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaviateConfig {
    /// Weaviate server URL.
    #[serde(default)]
    pub url: String,
    /// Class name, or "all".
    #[serde(default)]
    pub class_name: String,
    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Resolve and export cross-references.
    #[serde(default)]
    pub include_cross_references: Option<bool>,
}

/// Qdrant configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Qdrant server URL.
    #[serde(default)]
    pub url: String,
    /// Collection name, or "all".
    #[serde(default)]
    pub collection: String,
    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Named dense vector to export (default: first by name).
    #[serde(default)]
    pub vector_name: Option<String>,
}

/// Local output options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Directory receiving the database file and the Parquet files.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// SQLite database file name inside `dir`.
    #[serde(default = "default_database")]
    pub database: String,
    /// Rows buffered before one write to the tabular store.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Records requested per page from the backend.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            database: default_database(),
            batch_size: default_batch_size(),
            page_size: default_page_size(),
        }
    }
}

impl OutputOptions {
    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.dir.join(&self.database)
    }
}

fn default_all() -> String {
    ALL_COLLECTIONS.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./vector_export")
}

fn default_database() -> String {
    "export.db".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_page_size() -> usize {
    100
}

/// What a job exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Every collection reported by the backend.
    All,
    /// One named collection.
    Named(String),
}

impl ExportTarget {
    /// Parses a user selector; the literal "all" selects every collection.
    pub fn from_selector(selector: &str) -> Self {
        if selector == ALL_COLLECTIONS {
            Self::All
        } else {
            Self::Named(selector.to_string())
        }
    }
}

impl SourceConfig {
    /// Backend of this source.
    pub fn backend(&self) -> Backend {
        match self {
            Self::Pinecone(_) => Backend::Pinecone,
            Self::Weaviate(_) => Backend::Weaviate,
            Self::Qdrant(_) => Backend::Qdrant,
        }
    }

    /// Empty source configuration for a backend.
    pub fn empty(backend: Backend) -> Self {
        match backend {
            Backend::Pinecone => Self::Pinecone(PineconeConfig {
                index: String::new(),
                ..Default::default()
            }),
            Backend::Weaviate => Self::Weaviate(WeaviateConfig::default()),
            Backend::Qdrant => Self::Qdrant(QdrantConfig::default()),
        }
    }

    /// Collection selector (name or "all").
    pub fn selector(&self) -> &str {
        match self {
            Self::Pinecone(cfg) => &cfg.index,
            Self::Weaviate(cfg) => &cfg.class_name,
            Self::Qdrant(cfg) => &cfg.collection,
        }
    }

    /// Whether cross-references were requested.
    pub fn include_cross_references(&self) -> bool {
        match self {
            Self::Weaviate(cfg) => cfg.include_cross_references.unwrap_or(false),
            _ => false,
        }
    }

    /// Validates that every required value is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid value.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Pinecone(cfg) => {
                if cfg.api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Config("Pinecone API key is required".to_string()));
                }
                if cfg.environment.is_empty() && cfg.controller_url.is_none() {
                    return Err(Error::Config(
                        "Pinecone environment is required".to_string(),
                    ));
                }
                if let Some(url) = &cfg.controller_url {
                    crate::connectors::common::validate_url(url)?;
                }
            }
            Self::Weaviate(cfg) => crate::connectors::common::validate_url(&cfg.url)?,
            Self::Qdrant(cfg) => crate::connectors::common::validate_url(&cfg.url)?,
        }
        if self.selector().is_empty() {
            return Err(Error::Config(format!(
                "{} collection name cannot be empty",
                self.backend()
            )));
        }
        Ok(())
    }
}

/// One fully configured export invocation.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Source database.
    pub source: SourceConfig,
    /// Embedding model recorded alongside the data.
    pub model_name: String,
    /// Local output options.
    pub output: OutputOptions,
    /// Render progress indicators.
    pub show_progress: bool,
}

impl ExportJob {
    /// Collection(s) the job exports.
    pub fn target(&self) -> ExportTarget {
        ExportTarget::from_selector(self.source.selector())
    }

    /// Validates the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or output options are invalid.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        if self.output.batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.output.page_size == 0 {
            return Err(Error::Config("page_size must be greater than 0".to_string()));
        }
        if self.output.database.is_empty() {
            return Err(Error::Config(
                "database file name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ExportConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
