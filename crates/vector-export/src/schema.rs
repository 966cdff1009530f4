//! Common row schema shared by every backend.
//!
//! All adapters converge on [`ExportedRow`]. Optional fields are omitted
//! entirely when the collection lacks the capability, so a serialized row of
//! a dense-only collection carries no `sparse_values` key at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key-sorted metadata map. Sorted keys keep serialization deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Sparse vector as index to value.
pub type SparseValues = BTreeMap<u32, f32>;

/// The normalized unit of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRow {
    /// Vendor-assigned identifier, unique within a collection.
    pub id: String,
    /// Dense vector.
    pub vector: Vec<f32>,
    /// Sparse vector, present only for sparse-capable collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseValues>,
    /// Metadata exactly as the backend returned it.
    #[serde(default)]
    pub metadata: Metadata,
    /// Metadata key that duplicates `id`, if any. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_id_field_name: Option<String>,
    /// Resolved cross-references, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_references: Option<Vec<CrossReference>>,
}

/// A typed pointer to an object of another class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossReference {
    /// Class of the referenced object.
    pub referenced_class: String,
    /// Id of the referenced object.
    pub referenced_id: String,
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pinecone indexes.
    Pinecone,
    /// Weaviate classes.
    Weaviate,
    /// Qdrant collections.
    Qdrant,
}

impl Backend {
    /// Returns all backends.
    pub fn all() -> [Self; 3] {
        [Self::Pinecone, Self::Weaviate, Self::Qdrant]
    }

    /// Short name used on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Pinecone => "pinecone",
            Self::Weaviate => "weaviate",
            Self::Qdrant => "qdrant",
        }
    }

    /// Whether records of this backend can carry cross-references.
    pub fn supports_cross_references(&self) -> bool {
        matches!(self, Self::Weaviate)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl std::str::FromStr for Backend {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::all()
            .into_iter()
            .find(|b| b.short_name() == name)
            .ok_or_else(|| {
                crate::error::Error::Config(format!(
                    "Invalid vector database '{}'. Supported: pinecone, weaviate, qdrant",
                    s.trim()
                ))
            })
    }
}

/// Backend-specific address of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionAddress {
    /// Pinecone index and namespace (`""` is the default namespace).
    Index {
        /// Index name.
        index: String,
        /// Namespace inside the index.
        namespace: String,
    },
    /// Weaviate class.
    Class(String),
    /// Qdrant collection.
    Collection(String),
}

/// A collection discovered by, or addressed on, a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    /// Name of the exported table and columnar file.
    pub name: String,
    /// Where the records live on the backend.
    pub address: CollectionAddress,
}

impl CollectionDescriptor {
    /// Descriptor for a Pinecone index namespace.
    ///
    /// The default namespace is named after the index; any other is
    /// `{index}.{namespace}`. Index names never contain a dot, so the first
    /// dot always ends the index part.
    pub fn pinecone(index: impl Into<String>, namespace: impl Into<String>) -> Self {
        let index = index.into();
        let namespace = namespace.into();
        let name = if namespace.is_empty() {
            index.clone()
        } else {
            format!("{index}.{namespace}")
        };
        Self {
            name,
            address: CollectionAddress::Index { index, namespace },
        }
    }

    /// Descriptor for a Weaviate class.
    pub fn weaviate(class: impl Into<String>) -> Self {
        let class = class.into();
        Self {
            name: class.clone(),
            address: CollectionAddress::Class(class),
        }
    }

    /// Descriptor for a Qdrant collection.
    pub fn qdrant(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            name: collection.clone(),
            address: CollectionAddress::Collection(collection),
        }
    }

    /// Name the backend knows the collection by.
    pub fn remote_name(&self) -> &str {
        match &self.address {
            CollectionAddress::Index { index, .. } => index,
            CollectionAddress::Class(class) => class,
            CollectionAddress::Collection(collection) => collection,
        }
    }
}

/// Capabilities reported by the backend when a collection is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Declared vector dimension, when the backend reports one.
    pub dimension: Option<usize>,
    /// Whether the collection stores sparse vectors.
    pub sparse: bool,
    /// Total number of records, if known.
    pub total: Option<u64>,
}

/// Presence of the optional columns for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowLayout {
    /// `sparse_values` column present.
    pub sparse_values: bool,
    /// `cross_references` column present.
    pub cross_references: bool,
}

impl RowLayout {
    /// Derives the layout from the collection capabilities and the request.
    pub fn for_collection(
        backend: Backend,
        info: &CollectionInfo,
        include_cross_references: bool,
    ) -> Self {
        Self {
            sparse_values: info.sparse,
            cross_references: include_cross_references && backend.supports_cross_references(),
        }
    }
}
