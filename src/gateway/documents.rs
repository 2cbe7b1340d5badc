//! # Document Gateway
//!
//! Public surface of the proxy: one method per document operation. Each
//! method validates its arguments, derives the cache key, runs the read or
//! mutation flow of the [`RequestPipeline`] and decodes the origin payload.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use super::pipeline::RequestPipeline;
use super::request::{DocumentReply, DocumentRequest};
use crate::caching::{
    CacheCoordinator, CacheKey, CacheStats, DistributedCache, KeyBuilder, KeyClass, LocalCache,
    RedisCache, TtlPolicy,
};
use crate::core::config::ProxyConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{Document, DocumentDraft, DocumentPage, DocumentPatch, Pagination, SearchField};
use crate::protocols::http::{OriginClient, OriginRequest};
use crate::traffic::ConcurrencyGate;

const DOCUMENTS_ENDPOINT: &str = "/documents";
const DOCUMENT_ENDPOINT: &str = "/documents/{id}";

/// Cached, concurrency-bounded access to the origin document API
pub struct DocumentGateway {
    pipeline: RequestPipeline,
    keys: KeyBuilder,
    sweeper: Option<JoinHandle<()>>,
}

impl DocumentGateway {
    /// Assemble a gateway from already-built parts
    pub fn new(
        cache: Arc<CacheCoordinator>,
        gate: Arc<ConcurrencyGate>,
        origin: Arc<OriginClient>,
        keys: KeyBuilder,
    ) -> Self {
        Self {
            pipeline: RequestPipeline::new(cache, gate, origin),
            keys,
            sweeper: None,
        }
    }

    /// Build every component from configuration
    ///
    /// The Redis tier is probed once here. An unreachable Redis is logged and
    /// the gateway starts with the local tier serving alone.
    pub async fn from_config(config: &ProxyConfig) -> ProxyResult<Self> {
        config.validate()?;

        let origin = Arc::new(OriginClient::new(&config.origin)?);
        let gate = Arc::new(ConcurrencyGate::new(
            config.gate.max_concurrent_requests,
            config.gate.effective_acquire_timeout(&config.origin),
        ));

        let local = Arc::new(LocalCache::new(&config.cache.local));
        let distributed: Option<Arc<dyn DistributedCache>> = if config.cache.redis.enabled {
            let redis = RedisCache::new(config.cache.redis.clone())
                .map_err(|e| ProxyError::config(e.to_string()))?;
            // Failure is logged by the probe; the tier reconnects lazily later.
            let _ = redis.probe().await;
            Some(Arc::new(redis))
        } else {
            info!("Redis tier disabled, using local cache only");
            None
        };

        let ttl = TtlPolicy {
            document: config.cache.document_ttl,
            listing: config.cache.listing_ttl,
        };
        let cache = Arc::new(CacheCoordinator::new(local.clone(), distributed, ttl));
        let keys = KeyBuilder::new(config.cache.key_prefix.clone(), config.cache.max_key_length);

        let mut gateway = Self::new(cache, gate, origin, keys);
        gateway.sweeper = Some(local.spawn_sweeper(config.cache.local.sweep_interval));

        info!(
            origin = %config.origin.base_url,
            max_concurrent_requests = config.gate.max_concurrent_requests,
            redis_enabled = config.cache.redis.enabled,
            "Document gateway ready"
        );
        Ok(gateway)
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        self.pipeline.cache()
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        self.pipeline.gate()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }

    /// Drop every entry of the local cache tier
    pub fn clear_local(&self) {
        self.cache().clear_local();
    }

    /// Create a document
    ///
    /// The created document is seeded into the cache under its read key, so
    /// an immediate `get_document` does not reach the origin.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_document(&self, draft: &DocumentDraft) -> ProxyResult<Document> {
        draft.validate()?;

        let request = OriginRequest::post("/documents", DOCUMENTS_ENDPOINT).with_json(draft)?;
        let response = self.pipeline.mutate(&request, None).await?;
        let document: Document = serde_json::from_slice(&response.body)?;

        let key = self.document_key(&document.id);
        let ttl = self.cache().ttl_policy().document;
        self.cache().populate(&key, response.body, ttl).await;
        Ok(document)
    }

    /// List documents page by page
    #[instrument(skip(self))]
    pub async fn get_documents(&self, pagination: Pagination) -> ProxyResult<DocumentPage> {
        pagination.validate()?;

        let request = OriginRequest::get("/documents", DOCUMENTS_ENDPOINT)
            .with_query("page", pagination.page)
            .with_query("per_page", pagination.per_page);
        let key = self.listing_key(&request);
        self.pipeline
            .read(&key, &request, self.cache().ttl_policy().listing, |body| {
                DocumentPage::decode(body, pagination)
            })
            .await
    }

    /// Fetch one document by id
    #[instrument(skip(self))]
    pub async fn get_document(&self, doc_id: &str) -> ProxyResult<Document> {
        let path = document_path(doc_id)?;
        let request = OriginRequest::get(path.clone(), DOCUMENT_ENDPOINT);
        let key = self.keys.document(&path);
        self.pipeline
            .read(&key, &request, self.cache().ttl_policy().document, |body| {
                Ok(serde_json::from_slice::<Document>(body)?)
            })
            .await
    }

    /// Update the fields set in `patch`
    #[instrument(skip(self, patch))]
    pub async fn update_document(&self, doc_id: &str, patch: &DocumentPatch) -> ProxyResult<Document> {
        let path = document_path(doc_id)?;
        if patch.is_empty() {
            return Err(ProxyError::invalid_request("patch", "at least one field must be set"));
        }

        let request = OriginRequest::put(path.clone(), DOCUMENT_ENDPOINT).with_json(patch)?;
        let key = self.keys.document(&path);
        let response = self.pipeline.mutate(&request, Some(&key)).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Delete a document
    #[instrument(skip(self))]
    pub async fn delete_document(&self, doc_id: &str) -> ProxyResult<()> {
        let path = document_path(doc_id)?;
        let request = OriginRequest::delete(path.clone(), DOCUMENT_ENDPOINT);
        let key = self.keys.document(&path);
        // Any 2xx counts, with or without a body.
        self.pipeline.mutate(&request, Some(&key)).await?;
        Ok(())
    }

    /// Search documents by keyword, title or subtitle
    #[instrument(skip(self))]
    pub async fn search(&self, field: SearchField, term: &str, pagination: Pagination) -> ProxyResult<DocumentPage> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ProxyError::invalid_request("term", "must not be empty"));
        }
        pagination.validate()?;

        let request = OriginRequest::get(field.path(), field.path())
            .with_query("term", term)
            .with_query("page", pagination.page)
            .with_query("per_page", pagination.per_page);
        let key = self.listing_key(&request);
        self.pipeline
            .read(&key, &request, self.cache().ttl_policy().listing, |body| {
                DocumentPage::decode(body, pagination)
            })
            .await
    }

    pub async fn search_by_keyword(&self, keyword: &str, pagination: Pagination) -> ProxyResult<DocumentPage> {
        self.search(SearchField::Keyword, keyword, pagination).await
    }

    pub async fn search_by_title(&self, title: &str, pagination: Pagination) -> ProxyResult<DocumentPage> {
        self.search(SearchField::Title, title, pagination).await
    }

    pub async fn search_by_subtitle(&self, subtitle: &str, pagination: Pagination) -> ProxyResult<DocumentPage> {
        self.search(SearchField::Subtitle, subtitle, pagination).await
    }

    /// Run a typed request and wrap the result for the caller
    pub async fn dispatch(&self, request: DocumentRequest) -> ProxyResult<DocumentReply> {
        let reply = match request {
            DocumentRequest::CreateDocument(draft) => {
                DocumentReply::Created(self.create_document(&draft).await?)
            }
            DocumentRequest::GetDocuments(pagination) => {
                DocumentReply::Listed(self.get_documents(pagination).await?)
            }
            DocumentRequest::GetDocument { doc_id } => {
                DocumentReply::Fetched(self.get_document(&doc_id).await?)
            }
            DocumentRequest::UpdateDocument { doc_id, patch } => {
                DocumentReply::Updated(self.update_document(&doc_id, &patch).await?)
            }
            DocumentRequest::DeleteDocument { doc_id } => {
                self.delete_document(&doc_id).await?;
                DocumentReply::Deleted { doc_id }
            }
            DocumentRequest::Search { field, term, pagination } => {
                let page = self.search(field, &term, pagination).await?;
                DocumentReply::Searched { field, term, page }
            }
        };
        Ok(reply)
    }

    fn document_key(&self, doc_id: &str) -> CacheKey {
        let path = format!("/documents/{}", urlencoding::encode(doc_id));
        self.keys.document(&path)
    }

    fn listing_key(&self, request: &OriginRequest) -> CacheKey {
        self.keys.build(
            &request.method,
            &request.path,
            request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            KeyClass::Listing,
        )
    }
}

impl Drop for DocumentGateway {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

fn document_path(doc_id: &str) -> ProxyResult<String> {
    if doc_id.trim().is_empty() {
        return Err(ProxyError::invalid_request("doc_id", "must not be empty"));
    }
    Ok(format!("/documents/{}", urlencoding::encode(doc_id)))
}
