use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bff_http::{
    routes::{bff_routes, collection_routes, CACHE_STATUS_HEADER},
    ApiClient, ApiOrigin, BffService, CacheProvider, ClientConfig, CollectionProxy, MemoryStore,
    OriginProvider,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone, Default)]
struct BackendState {
    collection_queries: Arc<Mutex<Vec<Option<String>>>>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl BackendState {
    fn record_path(&self, uri: &Uri) {
        self.paths
            .lock()
            .expect("path log mutex must not be poisoned")
            .push(uri.path().to_owned());
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "NotFound", "message": message, "statusCode": 404})),
    )
        .into_response()
}

async fn backend_collection(
    State(state): State<BackendState>,
    Path(name): Path<String>,
    uri: Uri,
) -> Response {
    state.record_path(&uri);
    state
        .collection_queries
        .lock()
        .expect("query log mutex must not be poisoned")
        .push(uri.query().map(str::to_owned));

    if name == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Internal", "message": "database is down", "statusCode": 500})),
        )
            .into_response();
    }
    if name == "missing" {
        return not_found("collection not found");
    }

    Json(json!({
        "collection": name,
        "items": [
            {
                "id": 1,
                "title": "Zebra caching",
                "content": "Redis in front of everything",
                "author": "Alice Smith",
                "createdAt": "2024-03-05T10:00:00Z",
                "tags": ["cache", "redis"]
            },
            {
                "id": 2,
                "title": "Async Rust",
                "author": "Bob",
                "createdAt": "2024-04-01T10:00:00Z",
                "tags": ["rust"]
            },
            {
                "id": 3,
                "title": "Apple pie",
                "author": "alice",
                "createdAt": "2023-01-15T10:00:00Z",
                "tags": ["food"]
            }
        ],
        "timestamp": "2024-05-02T00:00:00.000Z",
        "total": 25
    }))
    .into_response()
}

fn backend_user(id: u64) -> JsonValue {
    json!({
        "id": id,
        "username": "kit",
        "email": "kit@example.com",
        "firstName": "Kit",
        "lastName": "Marlowe",
        "avatar": "https://cdn.test/kit.png",
        "role": "admin",
        "createdAt": "2023-10-01T08:00:00Z"
    })
}

async fn backend_me(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value == "Bearer good-token");
    if authorized {
        Json(backend_user(1)).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized", "message": "token required", "statusCode": 401})),
        )
            .into_response()
    }
}

async fn backend_user_by_id(
    State(state): State<BackendState>,
    Path(id): Path<String>,
    uri: Uri,
) -> Response {
    state.record_path(&uri);
    match id.parse::<u64>() {
        Ok(id) => Json(backend_user(id)).into_response(),
        Err(_) => not_found("user not found"),
    }
}

async fn backend_fallback(State(state): State<BackendState>, uri: Uri) -> Response {
    state.record_path(&uri);
    not_found("no such route")
}

struct TestServer {
    base_url: String,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(app: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server must run");
    });
    TestServer {
        base_url: format!("http://{address}"),
        task,
    }
}

struct Harness {
    bff: TestServer,
    backend: TestServer,
    backend_state: BackendState,
    http: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let backend_state = BackendState::default();
        let backend = serve(
            Router::new()
                .route("/collections/:name", get(backend_collection))
                .route("/users/me", get(backend_me))
                .route("/users/:id", get(backend_user_by_id))
                .fallback(backend_fallback)
                .with_state(backend_state.clone()),
        )
        .await;

        let client = ApiClient::new(
            ClientConfig::new(&backend.base_url)
                .with_max_retries(1)
                .with_retry_delay_ms(1)
                .with_header("Accept", "application/json"),
        )
        .expect("client config must be valid");
        let bff = serve(bff_routes(BffService::new(client))).await;

        Self {
            bff,
            backend,
            backend_state,
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, HeaderMap, JsonValue) {
        let response = self
            .http
            .get(format!("{}{path}", self.bff.base_url))
            .send()
            .await
            .expect("request must complete");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.json().await.expect("response must be JSON");
        (status, headers, body)
    }

    async fn post(&self, path: &str, body: String) -> (StatusCode, JsonValue) {
        let response = self
            .http
            .post(format!("{}{path}", self.bff.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .expect("request must complete");
        let status = response.status();
        let body = response.json().await.expect("response must be JSON");
        (status, body)
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(
            ClientConfig::new(&self.backend.base_url)
                .with_max_retries(1)
                .with_retry_delay_ms(1),
        )
        .expect("client config must be valid")
    }

    fn upstream_paths(&self) -> Vec<String> {
        self.backend_state
            .paths
            .lock()
            .expect("path log mutex must not be poisoned")
            .clone()
    }

    fn collection_queries(&self) -> Vec<Option<String>> {
        self.backend_state
            .collection_queries
            .lock()
            .expect("query log mutex must not be poisoned")
            .clone()
    }
}

fn titles(body: &JsonValue) -> Vec<String> {
    body["data"]["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["title"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn collection_is_transformed_into_dto() {
    let harness = Harness::start().await;

    let (status, headers, body) = harness.get("/api/bff/collections/posts").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=60");
    assert_eq!(body["success"], true);
    assert_eq!(body["meta"]["cached"], false);
    assert!(body["meta"]["duration"].is_u64());

    let data = &body["data"];
    assert_eq!(data["name"], "posts");
    assert_eq!(data["totalItems"], 25);
    assert_eq!(data["updatedAt"], "2 May 2024");
    assert!(data.get("pagination").is_none());

    let first = &data["items"][0];
    assert_eq!(first["id"], "1");
    assert_eq!(first["excerpt"], "Redis in front of everything");
    assert_eq!(first["publishedDate"], "5 March 2024");
    assert_eq!(first["tags"], json!(["cache", "redis"]));
    assert_eq!(data["items"][1]["tags"], json!(["rust"]));
    assert_eq!(harness.collection_queries(), [None::<String>]);
}

#[tokio::test]
async fn pagination_is_forwarded_and_computed() {
    let harness = Harness::start().await;

    let (status, _, body) = harness
        .get("/api/bff/collections/posts?page=2&limit=10")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["pagination"],
        json!({"currentPage": 2, "totalPages": 3, "hasNext": true, "hasPrev": true})
    );
    assert_eq!(
        harness.collection_queries(),
        [Some("page=2&limit=10".to_owned())]
    );
}

#[tokio::test]
async fn filters_and_sorts_locally() {
    let harness = Harness::start().await;

    let (_, _, body) = harness
        .get("/api/bff/collections/posts?author=alice&sortBy=title&order=asc")
        .await;
    assert_eq!(titles(&body), ["Apple pie", "Zebra caching"]);
    assert_eq!(body["data"]["totalItems"], 2);

    let (_, _, body) = harness
        .get("/api/bff/collections/posts?sortBy=date&order=desc")
        .await;
    assert_eq!(titles(&body), ["Async Rust", "Zebra caching", "Apple pie"]);

    let (_, _, body) = harness.get("/api/bff/collections/posts?tags=rust,food").await;
    assert_eq!(titles(&body), ["Async Rust", "Apple pie"]);
}

#[tokio::test]
async fn backend_failure_becomes_error_envelope() {
    let harness = Harness::start().await;

    let (status, _, body) = harness.get("/api/bff/collections/missing").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "collection not found");
    assert_eq!(body["error"]["userMessage"], "The requested data was not found.");

    let (status, _, body) = harness.get("/api/bff/collections/broken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "SERVER_ERROR");
    // 500s are retried once.
    assert_eq!(harness.collection_queries().len(), 3);
}

#[tokio::test]
async fn search_matches_case_insensitively() {
    let harness = Harness::start().await;

    let (status, headers, body) = harness
        .get("/api/bff/collections/search?collection=posts&q=REDIS")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=30");
    assert_eq!(titles(&body), ["Zebra caching"]);
    assert_eq!(body["data"]["totalItems"], 1);
}

#[tokio::test]
async fn search_requires_collection_and_query() {
    let harness = Harness::start().await;

    let (status, _, body) = harness.get("/api/bff/collections/search?q=rust").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "Collection parameter is missing");

    let (status, _, body) = harness
        .get("/api/bff/collections/search?collection=posts")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Search query is missing");
    assert!(harness.collection_queries().is_empty());
}

#[tokio::test]
async fn aggregate_keeps_successful_collections() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post(
            "/api/bff/collections/aggregate",
            json!({"collections": ["posts", "missing", "news"]}).to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_object().expect("data must be a map");
    let mut names: Vec<&str> = data.keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, ["news", "posts"]);
    assert_eq!(data["news"]["name"], "news");
}

#[tokio::test]
async fn aggregate_fails_when_every_collection_fails() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post(
            "/api/bff/collections/aggregate",
            json!({"collections": ["missing"]}).to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "UNKNOWN_ERROR");
    let message = body["error"]["message"].as_str().expect("message");
    assert!(message.starts_with("Failed to fetch collections: missing:"));
}

#[tokio::test]
async fn aggregate_rejects_bad_bodies() {
    let harness = Harness::start().await;

    let (status, body) = harness
        .post(
            "/api/bff/collections/aggregate",
            json!({"collections": []}).to_string(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Collections array is required");

    let (status, body) = harness
        .post("/api/bff/collections/aggregate", "{not json".to_owned())
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn user_is_transformed_into_dto() {
    let harness = Harness::start().await;

    let (status, headers, body) = harness.get("/api/bff/users/42").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "private, max-age=300");
    assert_eq!(
        body["data"],
        json!({
            "id": "42",
            "username": "kit",
            "displayName": "Kit Marlowe",
            "email": "kit@example.com",
            "avatarUrl": "https://cdn.test/kit.png",
            "isAdmin": true,
            "memberSince": "October 2023"
        })
    );
}

#[tokio::test]
async fn current_user_forwards_bearer_token() {
    let harness = Harness::start().await;

    let response = harness
        .http
        .get(format!("{}/api/bff/users/me", harness.bff.base_url))
        .bearer_auth("good-token")
        .send()
        .await
        .expect("request must complete");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "private, no-cache");
    let body: JsonValue = response.json().await.expect("JSON body");
    assert_eq!(body["data"]["id"], "1");

    let (status, _, body) = harness.get("/api/bff/users/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn path_parameters_stay_inside_their_segment() {
    let harness = Harness::start().await;

    let (status, _, body) = harness.get("/api/bff/users/..%2Fadmin%2Fsecrets").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "user not found");

    let (status, _, body) = harness
        .get("/api/bff/collections/posts%3Fpage%3D999")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "posts?page=999");

    assert_eq!(
        harness.upstream_paths(),
        [
            "/users/..%2Fadmin%2Fsecrets",
            "/collections/posts%3Fpage%3D999"
        ]
    );
    assert_eq!(harness.collection_queries(), [None::<String>]);
}

#[tokio::test]
async fn cached_route_encodes_collection_name_upstream() {
    let harness = Harness::start().await;
    let proxy = CollectionProxy::new(
        CacheProvider::Memory(MemoryStore::new()),
        OriginProvider::Api(ApiOrigin::new(harness.client())),
    );
    let server = serve(collection_routes(Arc::new(proxy))).await;

    let response = harness
        .http
        .get(format!(
            "{}/api/collections/..%2Fusers%2Fme",
            server.base_url
        ))
        .send()
        .await
        .expect("request must complete");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_STATUS_HEADER.as_str()], "MISS");
    let body: JsonValue = response.json().await.expect("JSON body");
    assert_eq!(body["collection"], "../users/me");
    assert_eq!(harness.upstream_paths(), ["/collections/..%2Fusers%2Fme"]);
}
