//! Translation of backend records into [`ExportedRow`]s.
//!
//! Adapters parse the vendor response into [`RawRecord`]s; the
//! [`Normalizer`] then applies the presence rules of the collection layout
//! and validates the record shape. It is pure, so identical remote data
//! always produce identical rows.

use crate::error::{Error, Result};
use crate::schema::{
    CollectionInfo, CrossReference, ExportedRow, Metadata, RowLayout, SparseValues,
};
use serde_json::Value;

/// A record as parsed from a backend page, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// Record id.
    pub id: String,
    /// Dense vector (empty for metadata-only records).
    pub vector: Vec<f32>,
    /// Sparse vector as returned by the backend, if any.
    pub sparse: Option<SparseValues>,
    /// Metadata/payload/properties.
    pub metadata: Metadata,
    /// References already resolved by the adapter; dangling ones are absent.
    pub references: Vec<CrossReference>,
}

/// Applies the normalization policy for one collection.
#[derive(Debug, Clone)]
pub struct Normalizer {
    dimension: Option<usize>,
    layout: RowLayout,
}

impl Normalizer {
    /// Creates a normalizer for a collection.
    pub fn new(info: &CollectionInfo, layout: RowLayout) -> Self {
        Self {
            dimension: info.dimension.filter(|d| *d > 0),
            layout,
        }
    }

    /// Normalizes one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Normalization`] for an empty id or a vector whose
    /// length differs from the declared dimension.
    pub fn normalize(&self, raw: RawRecord) -> Result<ExportedRow> {
        if raw.id.is_empty() {
            return Err(Error::Normalization("record has an empty id".to_string()));
        }

        if let Some(dimension) = self.dimension {
            if raw.vector.len() != dimension {
                return Err(Error::Normalization(format!(
                    "record '{}' has a {}-dimensional vector, collection declares {}",
                    raw.id,
                    raw.vector.len(),
                    dimension
                )));
            }
        }

        let sparse_values = if self.layout.sparse_values {
            Some(raw.sparse.unwrap_or_default())
        } else {
            None
        };

        let cross_references = if self.layout.cross_references {
            Some(raw.references)
        } else {
            None
        };

        let vector_id_field_name = detect_id_field(&raw.id, &raw.metadata);

        Ok(ExportedRow {
            id: raw.id,
            vector: raw.vector,
            sparse_values,
            metadata: raw.metadata,
            vector_id_field_name,
            cross_references,
        })
    }
}

/// Finds the first metadata key (in sorted order) whose value equals the id.
///
/// The key stays in the metadata; the result is bookkeeping only.
pub fn detect_id_field(id: &str, metadata: &Metadata) -> Option<String> {
    metadata
        .iter()
        .find(|(_, value)| match value {
            Value::String(s) => s == id,
            Value::Number(n) => n.to_string() == id,
            _ => false,
        })
        .map(|(key, _)| key.clone())
}

/// Parses a dense vector from a JSON array of numbers.
///
/// # Errors
///
/// Returns [`Error::Normalization`] if the value is not an array of numbers.
pub fn parse_vector(value: &Value, field_name: &str) -> Result<Vec<f32>> {
    match value {
        Value::Array(arr) => arr
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    Error::Normalization(format!(
                        "element of vector field '{field_name}' is not a number"
                    ))
                })
            })
            .collect(),
        _ => Err(Error::Normalization(format!(
            "vector field '{field_name}' is not an array"
        ))),
    }
}

/// Builds a sparse vector from parallel index and value arrays.
///
/// # Errors
///
/// Returns [`Error::Normalization`] if the arrays differ in length.
pub fn sparse_from_parts(indices: &[u32], values: &[f32]) -> Result<SparseValues> {
    if indices.len() != values.len() {
        return Err(Error::Normalization(format!(
            "sparse vector has {} indices but {} values",
            indices.len(),
            values.len()
        )));
    }
    Ok(indices.iter().copied().zip(values.iter().copied()).collect())
}

/// Converts a JSON object into key-sorted metadata.
///
/// `null` (absent payload) becomes empty metadata; any other non-object is
/// a normalization error.
///
/// # Errors
///
/// Returns [`Error::Normalization`] if the value is neither an object nor null.
pub fn metadata_from_json(value: Option<Value>) -> Result<Metadata> {
    match value {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(map)) => Ok(map.into_iter().collect()),
        Some(other) => Err(Error::Normalization(format!(
            "metadata is not an object: {other}"
        ))),
    }
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
