use std::collections::BTreeMap;

use crate::ApiError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Configures the base address, timeout and retry behavior of an
/// [`ApiClient`](crate::ApiClient).
///
/// Zero values for the numeric fields mean "use the default".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// Base address every request path is appended to.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry delay in milliseconds (linear strategy).
    pub retry_delay_ms: u64,
    /// Headers sent with every request.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Creates a config for `base_url` with default timeout and retry values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Creates a config from environment variables.
    ///
    /// Reads `<API_NAME>_API_URL` and falls back to `PUBLIC_API_URL`.
    /// Adds `Accept: application/json` as a default header.
    ///
    /// Meant to be called once at startup; request handling code receives
    /// the resulting client instead of reading the environment.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bff_http::ClientConfig;
    ///
    /// let config = ClientConfig::from_env("MAIN").expect("MAIN_API_URL or PUBLIC_API_URL");
    /// ```
    pub fn from_env(api_name: &str) -> Result<Self, ApiError> {
        let env_key = format!("{}_API_URL", api_name.trim().to_ascii_uppercase());
        let base_url = std::env::var(&env_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                std::env::var("PUBLIC_API_URL")
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            })
            .ok_or_else(|| {
                ApiError::Config(format!(
                    "API URL not configured, set {env_key} or PUBLIC_API_URL"
                ))
            })?;

        Ok(Self::new(base_url).with_header("Accept", "application/json"))
    }

    /// Replaces zero values with the documented defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.timeout_ms == 0 {
            self.timeout_ms = DEFAULT_TIMEOUT_MS;
        }
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.retry_delay_ms == 0 {
            self.retry_delay_ms = DEFAULT_RETRY_DELAY_MS;
        }
        self.base_url = self.base_url.trim().trim_end_matches('/').to_owned();
        self
    }
}

/// Per-call overrides merged over [`ClientConfig`] for a single request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestOptions {
    /// Timeout override; `None` or zero keeps the client timeout.
    pub timeout_ms: Option<u64>,
    /// Retry override; `Some(0)` disables retries for this call.
    pub max_retries: Option<usize>,
    /// Extra headers, applied after the client's default headers.
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds `Authorization: Bearer <token>`.
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token.trim()))
    }
}
