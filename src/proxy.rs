//! Cache-aside proxy serving named collections.

use std::future::Future;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use crate::{
    client::encode_path,
    store::{CacheStore, MAX_ENTRY_TTL},
    types::{ApiCollectionItem, ApiCollectionResponse},
    ApiClient, ApiError,
};

/// TTL applied to every cached collection unless configured otherwise.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Whether a collection was served from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// Serialized collection payload plus its cache status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedCollection {
    /// JSON body `{ collection, items, timestamp }`, exactly as stored.
    pub body: String,
    pub status: CacheStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Input validation failure; surfaced as HTTP 400.
    #[error("collection parameter is missing")]
    MissingParameter,
    /// `.` and `..` cannot name a collection; surfaced as HTTP 400.
    #[error("collection parameter is invalid")]
    InvalidParameter,
    #[error("origin fetch failed: {0}")]
    Origin(#[from] ApiError),
    #[error("collection payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Source of fresh collection data on a cache miss.
pub trait CollectionOrigin: Send + Sync {
    fn fetch_collection(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ApiCollectionResponse, ApiError>> + Send;
}

/// Placeholder origin producing three items per collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleOrigin;

impl CollectionOrigin for SampleOrigin {
    async fn fetch_collection(&self, name: &str) -> Result<ApiCollectionResponse, ApiError> {
        let items = (1..=3)
            .map(|id| ApiCollectionItem::new(id, format!("Post {id} in {name} (from server)")))
            .collect();
        Ok(ApiCollectionResponse {
            collection: name.to_owned(),
            items,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            total: None,
            page: None,
        })
    }
}

/// Origin backed by the backend API's `GET /collections/{name}`.
#[derive(Clone, Debug)]
pub struct ApiOrigin {
    client: ApiClient,
}

impl ApiOrigin {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl CollectionOrigin for ApiOrigin {
    async fn fetch_collection(&self, name: &str) -> Result<ApiCollectionResponse, ApiError> {
        self.client.get(&encode_path(&["collections", name])?).await
    }
}

/// Origin selected at startup.
#[derive(Clone, Debug)]
pub enum OriginProvider {
    Sample(SampleOrigin),
    Api(ApiOrigin),
}

impl CollectionOrigin for OriginProvider {
    async fn fetch_collection(&self, name: &str) -> Result<ApiCollectionResponse, ApiError> {
        match self {
            Self::Sample(origin) => origin.fetch_collection(name).await,
            Self::Api(origin) => origin.fetch_collection(name).await,
        }
    }
}

/// Read-through cache in front of a [`CollectionOrigin`].
///
/// Store failures are logged and absorbed; only missing input and origin
/// failures reach the caller. Concurrent misses for the same key each hit
/// the origin.
#[derive(Clone, Debug)]
pub struct CollectionProxy<S, O> {
    store: S,
    origin: O,
    ttl: Duration,
}

impl<S: CacheStore, O: CollectionOrigin> CollectionProxy<S, O> {
    pub fn new(store: S, origin: O) -> Self {
        Self {
            store,
            origin,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Sets the entry TTL, clamped to [`MAX_ENTRY_TTL`].
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.min(MAX_ENTRY_TTL);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache_key(name: &str) -> String {
        format!("collection:{name}")
    }

    pub async fn get_collection(&self, name: &str) -> Result<CachedCollection, ProxyError> {
        if name.trim().is_empty() {
            return Err(ProxyError::MissingParameter);
        }
        if matches!(name, "." | "..") {
            return Err(ProxyError::InvalidParameter);
        }
        let key = Self::cache_key(name);

        match self.store.get(&key).await {
            Ok(Some(body)) if !body.is_empty() => {
                tracing::debug!(key = %key, "serving collection from cache");
                return Ok(CachedCollection {
                    body,
                    status: CacheStatus::Hit,
                });
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    provider = self.store.provider_name(),
                    error = %err,
                    "cache read failed, fetching from origin"
                );
            }
        }

        tracing::debug!(key = %key, "fetching collection from origin");
        let payload = self.origin.fetch_collection(name).await?;
        let body = serde_json::to_string(&payload)?;

        if let Err(err) = self.store.set_with_ttl(&key, &body, self.ttl).await {
            tracing::warn!(
                key = %key,
                provider = self.store.provider_name(),
                error = %err,
                "cache write failed"
            );
        }

        Ok(CachedCollection {
            body,
            status: CacheStatus::Miss,
        })
    }
}
