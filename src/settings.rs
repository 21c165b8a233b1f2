use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::{
    store::{DEFAULT_MEMORY_CAPACITY, MAX_ENTRY_TTL},
    ClientConfig,
};

/// Where the cache proxy gets fresh collections from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    #[default]
    Sample,
    Api,
}

/// Server settings, resolved once at startup.
///
/// Sources, later ones winning: built-in defaults, `config/default`,
/// `config/local`, then `BFF_*` environment variables. `REDIS_URL`,
/// `MAIN_API_URL` and `PUBLIC_API_URL` are honoured when the `BFF_`
/// equivalents are unset.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    pub api_url: Option<String>,
    pub api_timeout_ms: u64,
    pub api_max_retries: usize,
    pub api_retry_delay_ms: u64,
    pub redis_url: Option<String>,
    pub cache_ttl_secs: u64,
    /// Entry limit of the in-process cache used when Redis is absent.
    pub memory_cache_capacity: u64,
    pub collection_origin: OriginKind,
    pub log_level: String,
    pub log_json: bool,
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::defaults_builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("BFF").try_parsing(true))
            .build()?;

        let mut settings: Self = config.try_deserialize()?;
        settings.redis_url = settings.redis_url.or_else(|| env_non_empty("REDIS_URL"));
        settings.api_url = settings
            .api_url
            .or_else(|| env_non_empty("MAIN_API_URL"))
            .or_else(|| env_non_empty("PUBLIC_API_URL"));

        let max_ttl_secs = MAX_ENTRY_TTL.as_secs();
        if settings.cache_ttl_secs > max_ttl_secs {
            tracing::warn!(
                configured = settings.cache_ttl_secs,
                max = max_ttl_secs,
                "cache_ttl_secs exceeds the maximum, clamping"
            );
            settings.cache_ttl_secs = max_ttl_secs;
        }
        Ok(settings)
    }

    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0:4321")?
            .set_default("api_timeout_ms", 30_000)?
            .set_default("api_max_retries", 3)?
            .set_default("api_retry_delay_ms", 1_000)?
            .set_default("cache_ttl_secs", 300)?
            .set_default("memory_cache_capacity", DEFAULT_MEMORY_CAPACITY)?
            .set_default("collection_origin", "sample")?
            .set_default("log_level", "info")?
            .set_default("log_json", false)
    }

    /// Client config for the backend API, when an address is configured.
    pub fn client_config(&self) -> Option<ClientConfig> {
        let base_url = self.api_url.as_deref().filter(|url| !url.trim().is_empty())?;
        Some(
            ClientConfig::new(base_url)
                .with_timeout_ms(self.api_timeout_ms)
                .with_max_retries(self.api_max_retries)
                .with_retry_delay_ms(self.api_retry_delay_ms)
                .with_header("Accept", "application/json"),
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.clamp(1, MAX_ENTRY_TTL.as_secs()))
    }
}
