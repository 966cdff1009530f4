//! Weaviate adapter.
//!
//! Objects are read with offset paging through the REST objects endpoint.
//! Cross-references are kept only when they point into a class exported by
//! the same run and the target object passes a memoized existence check.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

use super::common::{create_http_client, handle_http_error, join_url, read_json, transport_error};
use super::{Cursor, ExportAdapter, PageRequest, RawPage};
use crate::config::{ExportTarget, WeaviateConfig};
use crate::error::{Error, Result};
use crate::normalize::{metadata_from_json, RawRecord};
use crate::schema::{Backend, CollectionDescriptor, CollectionInfo, CrossReference};

const SOURCE: &str = "Weaviate";

const BEACON_SCHEME: &str = "weaviate://";

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    classes: Vec<ClassSchema>,
}

#[derive(Debug, Deserialize)]
struct ClassSchema {
    class: String,
    #[serde(default)]
    properties: Vec<PropertySchema>,
}

#[derive(Debug, Deserialize)]
struct PropertySchema {
    name: String,
    #[serde(default, rename = "dataType")]
    data_type: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<WeaviateObject>,
}

#[derive(Debug, Deserialize)]
struct WeaviateObject {
    id: String,
    #[serde(default)]
    properties: Option<serde_json::Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

/// Schema facts of the opened class.
#[derive(Debug, Default)]
struct ClassState {
    /// Classes written by this run.
    exported_classes: HashSet<String>,
    /// Reference property name to its target classes.
    reference_properties: BTreeMap<String, Vec<String>>,
}

/// Weaviate adapter.
pub struct WeaviateAdapter {
    config: WeaviateConfig,
    client: Client,
    state: ClassState,
    /// Memoized target existence, keyed by (class, id).
    known_objects: Mutex<HashMap<(String, String), bool>>,
}

impl WeaviateAdapter {
    /// Creates a new Weaviate adapter.
    pub fn new(config: WeaviateConfig) -> Self {
        Self {
            config,
            client: create_http_client(),
            state: ClassState::default(),
            known_objects: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a request, adding the bearer token when configured.
    fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    async fn get_schema(&self) -> Result<Schema> {
        let url = join_url(&self.config.url, "v1/schema");
        let response = self
            .build_request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        read_json(response, SOURCE, None).await
    }

    /// Checks that a referenced object exists, memoizing the answer.
    async fn object_exists(&self, class: &str, id: &str) -> Result<bool> {
        let key = (class.to_string(), id.to_string());
        if let Some(known) = self.cached_existence(&key) {
            return Ok(known);
        }

        let url = join_url(&self.config.url, &format!("v1/objects/{class}/{id}"));
        let response = self
            .build_request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;

        let exists = match response.status() {
            status if status.is_success() => true,
            StatusCode::NOT_FOUND => false,
            status => return Err(handle_http_error(status.as_u16(), "", SOURCE, None)),
        };

        if let Ok(mut cache) = self.known_objects.lock() {
            cache.insert(key, exists);
        }
        Ok(exists)
    }

    fn cached_existence(&self, key: &(String, String)) -> Option<bool> {
        self.known_objects
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).copied())
    }

    /// Resolves the reference properties of one object to exported targets.
    async fn resolve_references(
        &self,
        properties: Option<&serde_json::Value>,
    ) -> Result<Vec<CrossReference>> {
        let mut references = Vec::new();
        let Some(properties) = properties else {
            return Ok(references);
        };

        for (property, targets) in &self.state.reference_properties {
            let Some(beacons) = properties.get(property).and_then(|v| v.as_array()) else {
                continue;
            };

            for beacon in beacons
                .iter()
                .filter_map(|b| b.get("beacon").and_then(|v| v.as_str()))
            {
                let Some(reference) = parse_beacon(beacon, targets) else {
                    debug!("Skipping unparsable beacon '{}'", beacon);
                    continue;
                };
                if !self.state.exported_classes.contains(&reference.referenced_class) {
                    debug!(
                        "Skipping reference to unexported class '{}'",
                        reference.referenced_class
                    );
                    continue;
                }
                if self
                    .object_exists(&reference.referenced_class, &reference.referenced_id)
                    .await?
                {
                    references.push(reference);
                } else {
                    debug!(
                        "Skipping dangling reference {}/{}",
                        reference.referenced_class, reference.referenced_id
                    );
                }
            }
        }

        Ok(references)
    }
}

/// Parses `weaviate://host/Class/uuid`, or legacy `weaviate://host/uuid`
/// whose class is the property's single target class.
fn parse_beacon(beacon: &str, targets: &[String]) -> Option<CrossReference> {
    let rest = beacon.strip_prefix(BEACON_SCHEME)?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [_host, class, id] => Some(CrossReference {
            referenced_class: (*class).to_string(),
            referenced_id: (*id).to_string(),
        }),
        [_host, id] => match targets {
            [class] => Some(CrossReference {
                referenced_class: class.clone(),
                referenced_id: (*id).to_string(),
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Properties whose data type names another class of the schema.
fn reference_properties(
    class: &ClassSchema,
    live_classes: &HashSet<String>,
) -> BTreeMap<String, Vec<String>> {
    class
        .properties
        .iter()
        .filter_map(|p| {
            let targets: Vec<String> = p
                .data_type
                .iter()
                .filter(|t| live_classes.contains(*t))
                .cloned()
                .collect();
            (!targets.is_empty()).then(|| (p.name.clone(), targets))
        })
        .collect()
}

#[async_trait]
impl ExportAdapter for WeaviateAdapter {
    fn backend(&self) -> Backend {
        Backend::Weaviate
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>> {
        let schema = self.get_schema().await?;
        Ok(schema
            .classes
            .into_iter()
            .map(|c| CollectionDescriptor::weaviate(c.class))
            .collect())
    }

    fn descriptor(&self, name: &str) -> CollectionDescriptor {
        CollectionDescriptor::weaviate(name)
    }

    async fn open(&mut self, collection: &CollectionDescriptor) -> Result<CollectionInfo> {
        let schema = self.get_schema().await?;
        let live_classes: HashSet<String> =
            schema.classes.iter().map(|c| c.class.clone()).collect();

        let class = schema
            .classes
            .iter()
            .find(|c| c.class == collection.remote_name())
            .ok_or_else(|| Error::CollectionNotFound(collection.name.clone()))?;

        let reference_properties = reference_properties(class, &live_classes);
        let exported_classes = match ExportTarget::from_selector(&self.config.class_name) {
            ExportTarget::All => live_classes,
            ExportTarget::Named(name) => HashSet::from([name]),
        };
        debug!(
            "Opened Weaviate class '{}' with {} reference properties",
            class.class,
            reference_properties.len()
        );

        self.state = ClassState {
            exported_classes,
            reference_properties,
        };

        Ok(CollectionInfo::default())
    }

    async fn next_page(
        &self,
        collection: &CollectionDescriptor,
        request: PageRequest<'_>,
    ) -> Result<RawPage> {
        let offset = match request.cursor {
            None => 0,
            Some(Cursor::Offset(offset)) => *offset,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Weaviate cannot page with cursor {other:?}"
                )))
            }
        };

        let url = join_url(&self.config.url, "v1/objects");
        let response = self
            .build_request(Method::GET, &url)
            .query(&[
                ("class", collection.remote_name().to_string()),
                ("limit", request.limit.to_string()),
                ("offset", offset.to_string()),
                ("include", "vector".to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&e, SOURCE))?;
        let page: ObjectsResponse = read_json(response, SOURCE, Some(&collection.name)).await?;

        let returned = page.objects.len();
        let mut records = Vec::with_capacity(returned);
        for object in page.objects {
            let references = if request.include_cross_references {
                self.resolve_references(object.properties.as_ref()).await?
            } else {
                Vec::new()
            };

            records.push(RawRecord {
                id: object.id,
                vector: object.vector.unwrap_or_default(),
                sparse: None,
                metadata: metadata_from_json(object.properties)?,
                references,
            });
        }

        let next = (returned > 0 && returned == request.limit)
            .then(|| Cursor::Offset(offset + returned));
        Ok(RawPage { records, next })
    }
}

#[cfg(test)]
#[path = "weaviate_tests.rs"]
mod tests;
