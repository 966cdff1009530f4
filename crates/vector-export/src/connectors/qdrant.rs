//! Qdrant adapter.
//!
//! Points are read with the scroll API. Collections may hold one unnamed
//! dense vector or several named ones, optionally next to sparse vectors.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::common::{create_http_client, join_url, read_json, transport_error};
use super::{Cursor, ExportAdapter, PageRequest, RawPage};
use crate::config::QdrantConfig;
use crate::error::{Error, Result};
use crate::normalize::{metadata_from_json, parse_vector, sparse_from_parts, RawRecord};
use crate::schema::{Backend, CollectionDescriptor, CollectionInfo, SparseValues};

const SOURCE: &str = "Qdrant";

/// Name Qdrant gives the unnamed dense vector inside a named map.
const DEFAULT_VECTOR_NAME: &str = "";

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsList {
    #[serde(default)]
    collections: Vec<CollectionName>,
}

#[derive(Debug, Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionDetails {
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    #[serde(default)]
    vectors: Option<VectorsConfig>,
    #[serde(default)]
    sparse_vectors: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(BTreeMap<String, VectorParams>),
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Debug, Serialize)]
struct ScrollRequest<'a> {
    limit: usize,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<QdrantPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Value>,
}

/// Vector names exported from the opened collection.
#[derive(Debug, Clone, Default, PartialEq)]
struct VectorSelection {
    /// Named dense vector; `None` for a single unnamed vector.
    dense: Option<String>,
    /// Sparse vector, when the collection declares any.
    sparse: Option<String>,
}

/// Qdrant adapter.
pub struct QdrantAdapter {
    config: QdrantConfig,
    client: Client,
    selection: VectorSelection,
}

impl QdrantAdapter {
    /// Creates a new Qdrant adapter.
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            config,
            client: create_http_client(),
            selection: VectorSelection::default(),
        }
    }

    /// Builds a request, adding the API key when configured.
    fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) if !key.is_empty() => req.header("api-key", key),
            _ => req,
        }
    }

    /// Picks the exported vectors and derives the declared dimension.
    fn select_vectors(
        &self,
        params: &CollectionParams,
    ) -> Result<(VectorSelection, Option<usize>)> {
        let sparse = params
            .sparse_vectors
            .as_ref()
            .and_then(|names| names.keys().next().cloned());

        let (dense, dimension) = match &params.vectors {
            None => (None, None),
            Some(VectorsConfig::Single(p)) => (None, Some(p.size)),
            Some(VectorsConfig::Named(named)) => {
                let name = match &self.config.vector_name {
                    Some(name) => name.clone(),
                    None => match named.keys().next() {
                        Some(first) => first.clone(),
                        None => return Ok((VectorSelection { dense: None, sparse }, None)),
                    },
                };
                let params = named.get(&name).ok_or_else(|| {
                    Error::Config(format!(
                        "Qdrant collection has no vector named '{}'",
                        name
                    ))
                })?;
                (Some(name), Some(params.size))
            }
        };

        Ok((VectorSelection { dense, sparse }, dimension))
    }
}

fn point_id(id: &Value) -> Result<String> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::Normalization(format!(
            "Qdrant point id must be a string or an integer, got {other}"
        ))),
    }
}

fn parse_sparse(value: &Value) -> Result<SparseValues> {
    #[derive(Deserialize)]
    struct SparseBody {
        indices: Vec<u32>,
        values: Vec<f32>,
    }

    let body: SparseBody = serde_json::from_value(value.clone())
        .map_err(|e| Error::Normalization(format!("Invalid Qdrant sparse vector: {}", e)))?;
    sparse_from_parts(&body.indices, &body.values)
}

/// Splits a point's vector field into the selected dense and sparse parts.
fn split_vectors(
    vector: Option<&Value>,
    selection: &VectorSelection,
) -> Result<(Vec<f32>, Option<SparseValues>)> {
    let Some(vector) = vector else {
        return Ok((Vec::new(), None));
    };

    if vector.is_array() {
        return Ok((parse_vector(vector, "vector")?, None));
    }

    let Some(named) = vector.as_object() else {
        return Err(Error::Normalization(format!(
            "Qdrant vector must be an array or an object, got {vector}"
        )));
    };

    let dense_name = selection.dense.as_deref().unwrap_or(DEFAULT_VECTOR_NAME);
    let dense = match named.get(dense_name) {
        Some(value) => parse_vector(value, dense_name)?,
        None => Vec::new(),
    };
    let sparse = match selection.sparse.as_deref().and_then(|name| named.get(name)) {
        Some(value) => Some(parse_sparse(value)?),
        None => None,
    };

    Ok((dense, sparse))
}

#[async_trait]
impl ExportAdapter for QdrantAdapter {
    fn backend(&self) -> Backend {
        Backend::Qdrant
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>> {
        let url = join_url(&self.config.url, "collections");
        let response = self
            .build_request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        let list: QdrantResponse<CollectionsList> = read_json(response, SOURCE, None).await?;

        Ok(list
            .result
            .collections
            .into_iter()
            .map(|c| CollectionDescriptor::qdrant(c.name))
            .collect())
    }

    fn descriptor(&self, name: &str) -> CollectionDescriptor {
        CollectionDescriptor::qdrant(name)
    }

    async fn open(&mut self, collection: &CollectionDescriptor) -> Result<CollectionInfo> {
        let url = join_url(
            &self.config.url,
            &format!("collections/{}", collection.remote_name()),
        );
        let response = self
            .build_request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        let details: QdrantResponse<CollectionDetails> =
            read_json(response, SOURCE, Some(&collection.name)).await?;
        let details = details.result;

        let (selection, dimension) = self.select_vectors(&details.config.params)?;
        debug!(
            "Opened Qdrant collection '{}' (dense: {:?}, sparse: {:?})",
            collection.name, selection.dense, selection.sparse
        );

        let info = CollectionInfo {
            dimension,
            sparse: selection.sparse.is_some(),
            total: details.points_count,
        };
        self.selection = selection;
        Ok(info)
    }

    async fn next_page(
        &self,
        collection: &CollectionDescriptor,
        request: PageRequest<'_>,
    ) -> Result<RawPage> {
        let offset = match request.cursor {
            None => None,
            Some(Cursor::Scroll(offset)) => Some(offset),
            Some(other) => {
                return Err(Error::Config(format!(
                    "Qdrant cannot page with cursor {other:?}"
                )))
            }
        };

        let url = join_url(
            &self.config.url,
            &format!("collections/{}/points/scroll", collection.remote_name()),
        );
        let body = ScrollRequest {
            limit: request.limit,
            with_payload: true,
            with_vector: true,
            offset,
        };
        let response = self
            .build_request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        let scroll: QdrantResponse<ScrollResult> =
            read_json(response, SOURCE, Some(&collection.name)).await?;

        let records = scroll
            .result
            .points
            .into_iter()
            .map(|point| {
                let (vector, sparse) = split_vectors(point.vector.as_ref(), &self.selection)?;
                Ok(RawRecord {
                    id: point_id(&point.id)?,
                    vector,
                    sparse,
                    metadata: metadata_from_json(point.payload)?,
                    references: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let next = scroll
            .result
            .next_page_offset
            .filter(|v| !v.is_null())
            .map(Cursor::Scroll);

        Ok(RawPage { records, next })
    }
}

#[cfg(test)]
#[path = "qdrant_tests.rs"]
mod tests;
