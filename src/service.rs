//! Request handling
//!
//! `AttributeService` ties the pieces together for one request:
//! normalize, fingerprint, look up the cache, and on a miss open the volume,
//! compute on the blocking pool and store the response.

use crate::cache::{new_cache, CacheEntry, CacheKey, ResultCache};
use crate::config::Config;
use crate::engine::{AttributeEngine, Capacity};
use crate::error::{VdsError, VdsResult};
use crate::request::{
    AttributeAlongSurfaceRequest, AttributeBetweenSurfacesRequest, DataRequest, Request,
    ResponseMetadata,
};
use crate::volume::Connector;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A response and how it was produced
#[derive(Debug, Clone)]
pub struct Served {
    pub entry: Arc<CacheEntry>,
    pub cache_hit: bool,
    /// `None` when the request could not be fingerprinted
    pub key: Option<CacheKey>,
}

/// Serves attribute requests against one cache, connector and engine
pub struct AttributeService {
    cache: Arc<dyn ResultCache>,
    connector: Arc<dyn Connector>,
    engine: Arc<AttributeEngine>,
    tolerate_fingerprint_errors: bool,
}

impl AttributeService {
    pub fn new(
        cache: Arc<dyn ResultCache>,
        connector: Arc<dyn Connector>,
        engine: Arc<AttributeEngine>,
    ) -> Self {
        Self {
            cache,
            connector,
            engine,
            tolerate_fingerprint_errors: true,
        }
    }

    /// Build the cache and engine described by `config`
    pub fn from_config(config: &Config, connector: Arc<dyn Connector>) -> VdsResult<Self> {
        let cache = new_cache(config.cache.budget_bytes());
        let engine = AttributeEngine::new(Capacity::from(&config.engine))?;
        Ok(Self::new(cache, connector, Arc::new(engine))
            .tolerate_fingerprint_errors(config.cache.tolerate_fingerprint_errors))
    }

    /// Whether an unfingerprintable request is computed without caching
    /// (true) or rejected (false)
    pub fn tolerate_fingerprint_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_fingerprint_errors = tolerate;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }

    pub async fn along_surface(&self, request: AttributeAlongSurfaceRequest) -> VdsResult<Served> {
        self.serve(request).await
    }

    pub async fn between_surfaces(
        &self,
        request: AttributeBetweenSurfacesRequest,
    ) -> VdsResult<Served> {
        self.serve(request).await
    }

    /// Serve either kind of request
    pub async fn dispatch(&self, request: Request) -> VdsResult<Served> {
        match request {
            Request::Along(r) => self.along_surface(r).await,
            Request::Between(r) => self.between_surfaces(r).await,
        }
    }

    pub async fn serve<R: DataRequest>(&self, request: R) -> VdsResult<Served> {
        let span = info_span!("request", id = %Uuid::new_v4());
        self.serve_inner(request).instrument(span).await
    }

    async fn serve_inner<R: DataRequest>(&self, mut request: R) -> VdsResult<Served> {
        request.resource_mut().normalize()?;

        let key = match request.fingerprint() {
            Ok(key) => Some(key),
            Err(e) if self.tolerate_fingerprint_errors => {
                warn!("Serving without cache: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(key) = &key {
            if let Some(entry) = self.cache.get(key) {
                // Credentials are not part of the key
                self.connector.authorize(request.resource()).await?;
                debug!(key = %key, "Cache hit");
                return Ok(Served {
                    entry,
                    cache_hit: true,
                    key: Some(*key),
                });
            }
            debug!(key = %key, cache = self.cache.name(), "Cache miss");
        }

        let job = request.job()?;
        let shape = job.shape();
        let handle = self.connector.open(request.resource()).await?;

        let engine = Arc::clone(&self.engine);
        let data = tokio::task::spawn_blocking(move || {
            let computed = job.execute(&engine, &*handle);
            if let Err(e) = handle.close() {
                warn!("Failed to close data source: {}", e);
            }
            computed
        })
        .await
        .map_err(|e| VdsError::internal(format!("Attribute task failed: {}", e)))??;

        let metadata = serde_json::to_vec(&ResponseMetadata::new(shape))?;
        let entry = Arc::new(CacheEntry::new(metadata, data));
        if let Some(key) = key {
            self.cache.set(key, Arc::clone(&entry));
        }

        info!(rows = shape[0], cols = shape[1], bytes = entry.cost(), "Computed attributes");
        Ok(Served {
            entry,
            cache_hit: false,
            key,
        })
    }

    /// Release the cache
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
