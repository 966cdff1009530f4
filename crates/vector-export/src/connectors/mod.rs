//! Backend adapters for the supported vector databases.
//!
//! Each adapter exposes one capability per vendor: "produce the next page of
//! raw records given the previous page's continuation state". The
//! [`stream_records`] function turns that capability into a lazy stream of
//! normalized rows, so orchestration never branches on the vendor.

pub mod common;
pub mod pinecone;
pub mod qdrant;
pub mod weaviate;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::normalize::{Normalizer, RawRecord};
use crate::schema::{Backend, CollectionDescriptor, CollectionInfo, ExportedRow, RowLayout};

/// Continuation state returned by one page for the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Opaque pagination token (Pinecone).
    Token(String),
    /// Record offset (Weaviate).
    Offset(usize),
    /// Scroll position, an id of the next point (Qdrant).
    Scroll(serde_json::Value),
}

/// Parameters of one page fetch.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Cursor returned by the previous page; `None` for the first page.
    pub cursor: Option<&'a Cursor>,
    /// Maximum number of records requested.
    pub limit: usize,
    /// Resolve cross-references for the records of this page.
    pub include_cross_references: bool,
}

/// One page of raw records.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Records in backend order.
    pub records: Vec<RawRecord>,
    /// Cursor for the next page; `None` once the collection is exhausted.
    pub next: Option<Cursor>,
}

/// Options of one record stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Records requested per page.
    pub page_size: usize,
    /// Resolve and emit cross-references.
    pub include_cross_references: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            include_cross_references: false,
        }
    }
}

/// Trait for backend adapters.
///
/// Implement this trait to add support for a new vector database.
#[async_trait]
pub trait ExportAdapter: Send + Sync {
    /// Backend served by this adapter.
    fn backend(&self) -> Backend;

    /// Enumerates every exportable collection, in backend order.
    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>>;

    /// Addresses a user-named collection without contacting the backend.
    fn descriptor(&self, name: &str) -> CollectionDescriptor;

    /// Fetches the capabilities of a collection and prepares paging.
    ///
    /// Adapters keep whatever per-collection state paging needs (hosts,
    /// schema details) until the next call to `open`.
    async fn open(&mut self, collection: &CollectionDescriptor) -> Result<CollectionInfo>;

    /// Fetches one page of raw records.
    async fn next_page(
        &self,
        collection: &CollectionDescriptor,
        request: PageRequest<'_>,
    ) -> Result<RawPage>;
}

/// A lazy, finite, non-restartable sequence of normalized rows.
pub struct RecordStream<'a> {
    /// Capabilities of the streamed collection.
    pub info: CollectionInfo,
    /// Column layout of the rows.
    pub layout: RowLayout,
    /// The rows, in backend order.
    pub rows: BoxStream<'a, Result<ExportedRow>>,
}

enum PageState {
    First,
    After(Cursor),
    Exhausted,
}

/// Opens a collection and streams its records.
///
/// Pages are fetched only when the previous page has been consumed; each
/// page is normalized as a whole before any of its rows is yielded, so a
/// malformed record aborts the stream before the page reaches the sink.
///
/// # Errors
///
/// Returns an error if the collection cannot be opened. Paging and
/// normalization errors are yielded by the stream.
pub async fn stream_records<'a>(
    adapter: &'a mut dyn ExportAdapter,
    collection: &'a CollectionDescriptor,
    options: StreamOptions,
) -> Result<RecordStream<'a>> {
    if options.page_size == 0 {
        return Err(Error::Config("page_size must be greater than 0".to_string()));
    }

    let info = adapter.open(collection).await?;
    let layout = RowLayout::for_collection(
        adapter.backend(),
        &info,
        options.include_cross_references,
    );
    let normalizer = Normalizer::new(&info, layout);
    let adapter: &'a dyn ExportAdapter = adapter;

    let pages = stream::try_unfold(PageState::First, move |state| {
        let normalizer = normalizer.clone();
        async move {
            let cursor = match state {
                PageState::Exhausted => return Ok(None),
                PageState::First => None,
                PageState::After(cursor) => Some(cursor),
            };

            let page = adapter
                .next_page(
                    collection,
                    PageRequest {
                        cursor: cursor.as_ref(),
                        limit: options.page_size,
                        include_cross_references: layout.cross_references,
                    },
                )
                .await?;

            let rows = page
                .records
                .into_iter()
                .map(|record| normalizer.normalize(record))
                .collect::<Result<Vec<_>>>()?;

            let next = match page.next {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(Error::Normalization(format!(
                        "{} returned the same cursor twice for '{}'",
                        adapter.backend(),
                        collection.name
                    )));
                }
                Some(next) => PageState::After(next),
                None => PageState::Exhausted,
            };

            Ok(Some((rows, next)))
        }
    });

    let rows = pages
        .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
        .try_flatten()
        .boxed();

    Ok(RecordStream { info, layout, rows })
}

/// Create a backend adapter from configuration.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete.
pub fn create_adapter(config: &SourceConfig) -> Result<Box<dyn ExportAdapter>> {
    config.validate()?;
    match config {
        SourceConfig::Pinecone(cfg) => Ok(Box::new(pinecone::PineconeAdapter::new(cfg.clone())?)),
        SourceConfig::Weaviate(cfg) => Ok(Box::new(weaviate::WeaviateAdapter::new(cfg.clone()))),
        SourceConfig::Qdrant(cfg) => Ok(Box::new(qdrant::QdrantAdapter::new(cfg.clone()))),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
