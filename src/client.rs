use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::sleep;

use crate::{types::ApiErrorResponse, ApiError, ClientConfig, RequestOptions, Result};

#[derive(Clone)]
/// HTTP client for a backend API with timeout, retry and error classification.
///
/// Cloning is cheap: clones share the connection pool and the immutable
/// configuration.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    default_headers: HeaderMap,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may hold credentials.
        let header_names: Vec<&str> = self.default_headers.keys().map(HeaderName::as_str).collect();
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("timeout_ms", &self.config.timeout_ms)
            .field("max_retries", &self.config.max_retries)
            .field("retry_delay_ms", &self.config.retry_delay_ms)
            .field("default_headers", &header_names)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client from a config.
    ///
    /// Fails when the base address is blank or a default header is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = config.normalized();
        if config.base_url.is_empty() {
            return Err(ApiError::Config("base address must not be empty".to_owned()));
        }
        let default_headers = parse_headers(&config.default_headers)?;

        Ok(Self {
            http: reqwest::Client::new(),
            config,
            default_headers,
        })
    }

    /// Creates a client for the API named `api_name` from environment
    /// variables. See [`ClientConfig::from_env`].
    pub fn from_env(api_name: &str) -> Result<Self> {
        Self::new(ClientConfig::from_env(api_name)?)
    }

    /// Replaces the underlying `reqwest` client, e.g. to share a pool.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with(path, &RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None, options).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    /// Sends a request and decodes the terminal response.
    ///
    /// Makes at most `max_retries + 1` attempts. 4xx responses are final on
    /// the first attempt; 5xx responses, timeouts and network failures are
    /// retried with a linear backoff of `retry_delay_ms * (attempt + 1)`.
    pub async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let timeout_ms = options
            .timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.config.timeout_ms);
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let headers = self.headers_for(&method, options)?;
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| ApiError::Config(format!("request body is not serializable: {err}")))?;

        let url = self.url_for(path);
        let response = self
            .send_with_retry(&method, &url, &headers, payload, timeout_ms, max_retries)
            .await?;
        decode_response(response)
    }

    /// Runs attempts until one yields a terminal response.
    ///
    /// The body is read inside the attempt, so a response that stalls after
    /// its headers is retried like any other timeout.
    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        payload: Option<Vec<u8>>,
        timeout_ms: u64,
        max_retries: usize,
    ) -> Result<RawResponse> {
        let mut attempt = 0usize;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url)
                .headers(headers.clone())
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(payload) = &payload {
                request = request.body(payload.clone());
            }

            let is_last = attempt >= max_retries;
            let outcome = match request.send().await {
                Ok(response) => read_response(response, timeout_ms).await,
                Err(err) => Err(classify_transport(err, timeout_ms)),
            };
            match outcome {
                Ok(response) if response.status.is_server_error() && !is_last => {
                    tracing::debug!(%method, url, status = response.status.as_u16(), attempt, "server error, retrying");
                }
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && !is_last => {
                    tracing::debug!(%method, url, error = %err, attempt, "transport failure, retrying");
                }
                Err(err) => return Err(err),
            }
            self.wait_before_retry(attempt).await;
            attempt += 1;
        }
    }

    /// Waits `retry_delay_ms * (attempt + 1)` before the next attempt.
    async fn wait_before_retry(&self, attempt: usize) {
        let factor = u64::try_from(attempt).unwrap_or(u64::MAX).saturating_add(1);
        let delay_ms = self.config.retry_delay_ms.saturating_mul(factor);
        tracing::debug!("retrying request after {} ms", delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;
    }

    fn url_for(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
            format!("{}{path}", self.config.base_url)
        } else {
            format!("{}/{path}", self.config.base_url)
        }
    }

    fn headers_for(&self, method: &Method, options: &RequestOptions) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if matches!(*method, Method::POST | Method::PUT) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        for (name, value) in &self.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &parse_headers(&options.headers)? {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Builds `/a/b/...` from raw segments, percent-encoding each one so that
/// `/`, `?` and `%` stay inside their segment.
///
/// Empty, `.` and `..` segments fail with [`ApiError::Config`].
pub fn encode_path<S: AsRef<str>>(segments: &[S]) -> Result<String> {
    let mut path = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if matches!(segment, "" | "." | "..") {
            return Err(ApiError::Config(format!(
                "invalid path segment '{segment}'"
            )));
        }
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    Ok(path)
}

fn parse_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiError::Config(format!("invalid header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| ApiError::Config(format!("invalid value for header '{name}': {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn classify_transport(err: reqwest::Error, timeout_ms: u64) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout { timeout_ms }
    } else if err.is_builder() {
        ApiError::Config(err.to_string())
    } else {
        ApiError::Network {
            message: err.to_string(),
        }
    }
}

/// Status and fully read body of one attempt.
struct RawResponse {
    status: StatusCode,
    is_json: bool,
    body: String,
}

async fn read_response(response: Response, timeout_ms: u64) -> Result<RawResponse> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));
    let body = response
        .text()
        .await
        .map_err(|err| classify_transport(err, timeout_ms))?;
    Ok(RawResponse {
        status,
        is_json,
        body,
    })
}

fn decode_response<T: DeserializeOwned>(response: RawResponse) -> Result<T> {
    let RawResponse {
        status,
        is_json,
        body,
    } = response;

    if !(status.is_success() || status.is_redirection()) {
        return Err(error_from_body(status, is_json, &body));
    }

    if is_json && !body.trim().is_empty() {
        serde_json::from_str::<T>(&body).map_err(|err| ApiError::Malformed {
            status: status.as_u16(),
            message: format!("invalid JSON body: {err}"),
        })
    } else {
        decode_text(status, body)
    }
}

/// Decodes a non-JSON body as a string payload.
///
/// An empty body also decodes into unit-like targets such as `()` and
/// `Option<T>`.
fn decode_text<T: DeserializeOwned>(status: StatusCode, body: String) -> Result<T> {
    if body.is_empty() {
        if let Ok(value) = serde_json::from_value::<T>(JsonValue::Null) {
            return Ok(value);
        }
    }
    serde_json::from_value::<T>(JsonValue::String(body)).map_err(|err| ApiError::Malformed {
        status: status.as_u16(),
        message: format!("expected a JSON response, got text: {err}"),
    })
}

fn error_from_body(status: StatusCode, is_json: bool, body: &str) -> ApiError {
    let decoded = if is_json {
        serde_json::from_str::<JsonValue>(body).ok()
    } else {
        None
    };
    let message = decoded
        .as_ref()
        .and_then(|value| ApiErrorResponse::deserialize(value).ok())
        .and_then(|error| error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "HTTP Error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_owned()
        });

    ApiError::Http {
        status: status.as_u16(),
        message,
        body: decoded,
    }
}
