//! `bff-http` is the backend-for-frontend layer of a web application.
//!
//! - [`ApiClient`]: outbound HTTP with per-attempt timeout, bounded retry
//!   with linear backoff and typed [`ApiError`] classification.
//! - [`CollectionProxy`]: cache-aside reads of named collections through a
//!   [`CacheStore`] with a fixed TTL, degrading to the origin when the
//!   store fails.
//! - [`BffService`] and [`routes`]: DTO-shaped collection and user
//!   endpoints built on the client.

mod client;
mod error;
mod options;
#[cfg(feature = "redis")]
mod redis_store;

pub mod envelope;
pub mod logging;
pub mod proxy;
pub mod routes;
pub mod service;
pub mod settings;
pub mod store;
pub mod transform;
pub mod types;

pub use client::{encode_path, ApiClient};
pub use envelope::{BffError, BffResponse, ErrorCode, ResponseMeta};
pub use error::{ApiError, ErrorKind};
pub use options::{ClientConfig, RequestOptions};
pub use proxy::{
    ApiOrigin, CacheStatus, CachedCollection, CollectionOrigin, CollectionProxy, OriginProvider,
    ProxyError, SampleOrigin,
};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use service::BffService;
pub use settings::Settings;
pub use store::{CacheError, CacheProvider, CacheResult, CacheStore, MemoryStore};

pub type Result<T> = std::result::Result<T, ApiError>;
