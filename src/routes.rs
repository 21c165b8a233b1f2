//! HTTP endpoints for the cache proxy and the BFF services.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    envelope::{BffError, BffResponse, ErrorCode},
    proxy::{CollectionProxy, OriginProvider, ProxyError},
    service::BffService,
    store::CacheProvider,
    types::{CollectionQuery, SortBy, SortOrder},
};

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache-status");

/// Proxy shared by every request handler.
pub type SharedProxy = Arc<CollectionProxy<CacheProvider, OriginProvider>>;

/// `GET /api/collections/{collection}` served through the cache.
pub fn collection_routes(proxy: SharedProxy) -> Router {
    Router::new()
        .route("/api/collections", get(cached_collection))
        .route("/api/collections/", get(cached_collection))
        .route("/api/collections/:collection", get(cached_collection))
        .with_state(proxy)
}

/// BFF endpoints under `/api/bff`.
pub fn bff_routes(service: BffService) -> Router {
    Router::new()
        .route("/api/bff/collections/search", get(search_collection))
        .route("/api/bff/collections/aggregate", post(aggregate_collections))
        .route("/api/bff/collections/:collection", get(get_collection))
        .route("/api/bff/users/me", get(get_current_user))
        .route("/api/bff/users/:user_id", get(get_user))
        .with_state(service)
}

fn bad_request(message: &str, user_message: &str) -> Response {
    let body: BffResponse<()> = BffResponse::failure(BffError::bad_request(message, user_message));
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// `.` and `..` cannot be sent as a single upstream path segment.
fn is_dot_segment(value: &str) -> bool {
    matches!(value, "." | "..")
}

fn envelope_response<T: Serialize>(result: BffResponse<T>, cache_control: &'static str) -> Response {
    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, [(header::CACHE_CONTROL, cache_control)], Json(result)).into_response()
}

async fn cached_collection(
    State(proxy): State<SharedProxy>,
    collection: Option<Path<String>>,
) -> Response {
    let name = collection.map(|Path(name)| name).unwrap_or_default();

    match proxy.get_collection(&name).await {
        Ok(cached) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (CACHE_STATUS_HEADER, cached.status.as_str()),
            ],
            cached.body,
        )
            .into_response(),
        Err(ProxyError::MissingParameter) => bad_request(
            "Collection parameter is missing",
            "No collection name was given.",
        ),
        Err(ProxyError::InvalidParameter) => bad_request(
            "Collection parameter is invalid",
            "The collection name is not valid.",
        ),
        Err(ProxyError::Origin(err)) => {
            tracing::error!(collection = %name, error = %err, "collection origin failed");
            let body: BffResponse<()> = BffResponse::failure(BffError::from_api_error(&err));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        Err(err @ ProxyError::Encode(_)) => {
            tracing::error!(collection = %name, error = %err, "collection payload encoding failed");
            let body: BffResponse<()> =
                BffResponse::failure(BffError::new(ErrorCode::InternalError, "Internal server error"));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Parses `page, limit, tags, author, sortBy, order`; invalid values are
/// ignored.
pub fn parse_collection_query(params: &HashMap<String, String>) -> CollectionQuery {
    let number = |key: &str| {
        params
            .get(key)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0)
    };
    let non_empty = |key: &str| params.get(key).filter(|value| !value.is_empty());

    CollectionQuery {
        page: number("page"),
        limit: number("limit"),
        tags: non_empty("tags")
            .map(|tags| tags.split(',').map(str::to_owned).collect())
            .unwrap_or_default(),
        author: non_empty("author").cloned(),
        sort_by: params.get("sortBy").and_then(|value| match value.as_str() {
            "date" => Some(SortBy::Date),
            "title" => Some(SortBy::Title),
            "popularity" => Some(SortBy::Popularity),
            _ => None,
        }),
        order: params.get("order").and_then(|value| match value.as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }),
    }
}

async fn get_collection(
    State(service): State<BffService>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if collection.trim().is_empty() {
        return bad_request("Collection parameter is missing", "No collection name was given.");
    }
    if is_dot_segment(&collection) {
        return bad_request("Collection parameter is invalid", "The collection name is not valid.");
    }
    let query = parse_collection_query(&params);
    let result = service.get_collection(&collection, &query).await;
    envelope_response(result, "public, max-age=60")
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    collection: Option<String>,
    q: Option<String>,
}

async fn search_collection(
    State(service): State<BffService>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(collection) = params.collection.filter(|value| !value.is_empty()) else {
        return bad_request("Collection parameter is missing", "No collection name was given.");
    };
    if is_dot_segment(&collection) {
        return bad_request("Collection parameter is invalid", "The collection name is not valid.");
    }
    let Some(search) = params.q.filter(|value| !value.is_empty()) else {
        return bad_request("Search query is missing", "No search query was given.");
    };
    let result = service.search_collection(&collection, &search).await;
    envelope_response(result, "public, max-age=30")
}

async fn aggregate_collections(State(service): State<BffService>, body: Bytes) -> Response {
    let payload: JsonValue = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "aggregate request body is not valid JSON");
            let body: BffResponse<()> = BffResponse::failure(BffError::new(
                ErrorCode::InternalError,
                "Request body is not valid JSON",
            ));
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    let names: Vec<String> = payload
        .get("collections")
        .and_then(JsonValue::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(JsonValue::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        return bad_request("Collections array is required", "No collections were given.");
    }

    let result = service.get_multiple_collections(&names).await;
    envelope_response(result, "public, max-age=60")
}

async fn get_user(State(service): State<BffService>, Path(user_id): Path<String>) -> Response {
    if user_id.trim().is_empty() {
        return bad_request("User ID is missing", "No user ID was given.");
    }
    if is_dot_segment(&user_id) {
        return bad_request("User ID is invalid", "The user ID is not valid.");
    }
    let result = service.get_user(&user_id).await;
    envelope_response(result, "private, max-age=300")
}

async fn get_current_user(State(service): State<BffService>, headers: HeaderMap) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).to_owned());

    let result = service.get_current_user(token.as_deref()).await;
    let status = match result.error().map(|err| err.code) {
        None => StatusCode::OK,
        Some(ErrorCode::Unauthorized) => StatusCode::UNAUTHORIZED,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, [(header::CACHE_CONTROL, "private, no-cache")], Json(result)).into_response()
}
