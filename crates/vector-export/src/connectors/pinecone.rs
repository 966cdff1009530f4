//! Pinecone adapter.
//!
//! Indexes are described on the control plane; records are read from the
//! index host by listing ids page by page and fetching their values.

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::common::{create_http_client, join_url, read_json, transport_error};
use super::{Cursor, ExportAdapter, PageRequest, RawPage};
use crate::config::PineconeConfig;
use crate::error::{Error, Result};
use crate::normalize::{metadata_from_json, sparse_from_parts, RawRecord};
use crate::schema::{Backend, CollectionAddress, CollectionDescriptor, CollectionInfo};

const SOURCE: &str = "Pinecone";

/// Largest page the list endpoint serves.
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct IndexDescription {
    database: IndexDatabase,
    status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexDatabase {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    metric: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    host: String,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStats {
    #[serde(default)]
    namespaces: IndexMap<String, NamespaceStats>,
}

#[derive(Debug, Default, Deserialize)]
struct NamespaceStats {
    #[serde(default, rename = "vectorCount")]
    vector_count: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedId>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default, rename = "sparseValues")]
    sparse_values: Option<SparseBody>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SparseBody {
    indices: Vec<u32>,
    values: Vec<f32>,
}

/// Pinecone adapter.
pub struct PineconeAdapter {
    config: PineconeConfig,
    api_key: String,
    client: Client,
    /// Data-plane host of the opened index.
    host: Option<String>,
}

impl PineconeAdapter {
    /// Creates a new Pinecone adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API key is configured.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("Pinecone API key is required".to_string()))?;

        Ok(Self {
            config,
            api_key,
            client: create_http_client(),
            host: None,
        })
    }

    /// Control plane base URL.
    fn controller_url(&self) -> String {
        self.config.controller_url.clone().unwrap_or_else(|| {
            format!("https://controller.{}.pinecone.io", self.config.environment)
        })
    }

    /// Builds an authenticated request.
    fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("Accept", "application/json")
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let url = join_url(&self.controller_url(), "databases");
        let response = self
            .build_request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, None).await
    }

    async fn describe_index(&self, index: &str) -> Result<IndexDescription> {
        let url = join_url(&self.controller_url(), &format!("databases/{index}"));
        let response = self
            .build_request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, Some(index)).await
    }

    async fn describe_index_stats(&self, host: &str, index: &str) -> Result<IndexStats> {
        let url = join_url(host, "describe_index_stats");
        let response = self
            .build_request(Method::POST, &url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, Some(index)).await
    }

    fn data_host(&self) -> Result<&str> {
        self.host
            .as_deref()
            .ok_or_else(|| Error::Config("Pinecone index has not been opened".to_string()))
    }

    async fn list_ids(
        &self,
        host: &str,
        collection: &str,
        namespace: &str,
        request: PageRequest<'_>,
    ) -> Result<ListResponse> {
        let limit = request.limit.min(MAX_LIST_LIMIT).to_string();
        let mut query = vec![("namespace", namespace.to_string()), ("limit", limit)];
        match request.cursor {
            Some(Cursor::Token(token)) => query.push(("paginationToken", token.clone())),
            Some(other) => {
                return Err(Error::Config(format!(
                    "Pinecone cannot page with cursor {other:?}"
                )))
            }
            None => {}
        }

        let response = self
            .build_request(Method::GET, &join_url(host, "vectors/list"))
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, Some(collection)).await
    }

    async fn fetch_vectors(
        &self,
        host: &str,
        collection: &str,
        namespace: &str,
        ids: &[String],
    ) -> Result<FetchResponse> {
        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        query.push(("namespace", namespace));

        let response = self
            .build_request(Method::GET, &join_url(host, "vectors/fetch"))
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, Some(collection)).await
    }
}

fn with_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn index_address(collection: &CollectionDescriptor) -> Result<(&str, &str)> {
    match &collection.address {
        CollectionAddress::Index { index, namespace } => Ok((index.as_str(), namespace.as_str())),
        other => Err(Error::Config(format!("Pinecone cannot export {other:?}"))),
    }
}

fn to_raw_record(vector: FetchedVector) -> Result<RawRecord> {
    let sparse = vector
        .sparse_values
        .map(|s| sparse_from_parts(&s.indices, &s.values))
        .transpose()?;

    Ok(RawRecord {
        id: vector.id,
        vector: vector.values,
        sparse,
        metadata: metadata_from_json(vector.metadata)?,
        references: Vec::new(),
    })
}

#[async_trait]
impl ExportAdapter for PineconeAdapter {
    fn backend(&self) -> Backend {
        Backend::Pinecone
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>> {
        let mut descriptors = Vec::new();
        for index in self.list_indexes().await? {
            let description = self.describe_index(&index).await?;
            let host = with_scheme(&description.status.host);
            let stats = self.describe_index_stats(&host, &index).await?;

            if stats.namespaces.is_empty() {
                descriptors.push(CollectionDescriptor::pinecone(index.as_str(), ""));
            } else {
                descriptors.extend(
                    stats
                        .namespaces
                        .keys()
                        .map(|ns| CollectionDescriptor::pinecone(index.as_str(), ns.as_str())),
                );
            }
        }
        debug!("Pinecone listed {} index namespaces", descriptors.len());
        Ok(descriptors)
    }

    fn descriptor(&self, name: &str) -> CollectionDescriptor {
        CollectionDescriptor::pinecone(name, self.config.namespace.clone().unwrap_or_default())
    }

    async fn open(&mut self, collection: &CollectionDescriptor) -> Result<CollectionInfo> {
        let (index, namespace) = index_address(collection)?;
        let description = self.describe_index(index).await?;
        let host = with_scheme(&description.status.host);
        let stats = self.describe_index_stats(&host, index).await?;

        let info = CollectionInfo {
            dimension: description.database.dimension,
            sparse: description
                .database
                .metric
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case("dotproduct")),
            total: Some(stats.namespaces.get(namespace).map_or(0, |ns| ns.vector_count)),
        };

        debug!(
            "Opened Pinecone index '{}' namespace '{}' at {}",
            index, namespace, host
        );
        self.host = Some(host);
        Ok(info)
    }

    async fn next_page(
        &self,
        collection: &CollectionDescriptor,
        request: PageRequest<'_>,
    ) -> Result<RawPage> {
        let (_, namespace) = index_address(collection)?;
        let host = self.data_host()?;

        let listed = self
            .list_ids(host, &collection.name, namespace, request)
            .await?;
        let next = listed
            .pagination
            .and_then(|p| p.next)
            .filter(|token| !token.is_empty())
            .map(Cursor::Token);

        let ids: Vec<String> = listed.vectors.into_iter().map(|v| v.id).collect();
        if ids.is_empty() {
            return Ok(RawPage {
                records: Vec::new(),
                next,
            });
        }

        let mut fetched = self
            .fetch_vectors(host, &collection.name, namespace, &ids)
            .await?
            .vectors;

        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            match fetched.remove(id) {
                Some(vector) => records.push(to_raw_record(vector)?),
                None => debug!("Pinecone id '{}' listed but not fetched, skipping", id),
            }
        }

        Ok(RawPage { records, next })
    }
}

#[cfg(test)]
#[path = "pinecone_tests.rs"]
mod tests;
