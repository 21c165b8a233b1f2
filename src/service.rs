use std::collections::BTreeMap;
use std::time::Instant;

use futures::future::join_all;

use crate::{
    envelope::{log_error, BffError, BffResponse, ErrorCode, ResponseMeta},
    transform::{
        filter_and_sort_items, matches_search, transform_collection, transform_user,
        transform_users,
    },
    types::{ApiCollectionResponse, ApiUserResponse, CollectionDto, CollectionQuery, UserDto},
    client::encode_path,
    ApiClient, RequestOptions, Result,
};

/// Collection and user operations on top of the backend API.
///
/// Every operation returns an envelope; failures are logged and converted,
/// never propagated.
#[derive(Clone, Debug)]
pub struct BffService {
    client: ApiClient,
}

fn with_pagination(path: String, page: Option<u32>, limit: Option<u32>) -> String {
    let params: Vec<String> = [("page", page), ("limit", limit)]
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| *v > 0).map(|v| format!("{key}={v}")))
        .collect();
    if params.is_empty() {
        path
    } else {
        format!("{path}?{}", params.join("&"))
    }
}

fn meta_since(started: Instant) -> Option<ResponseMeta> {
    Some(ResponseMeta {
        cached: false,
        request_id: None,
        duration: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
    })
}

fn uncached() -> Option<ResponseMeta> {
    Some(ResponseMeta::default())
}

impl BffService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Fetches one collection, applying pagination, filters and sorting.
    pub async fn get_collection(
        &self,
        name: &str,
        query: &CollectionQuery,
    ) -> BffResponse<CollectionDto> {
        let started = Instant::now();
        match self.fetch_collection(name, query).await {
            Ok(collection) => BffResponse::ok(collection, meta_since(started)),
            Err(err) => {
                log_error(&err, &format!("get_collection({name})"));
                BffResponse::failure(BffError::from_api_error(&err))
            }
        }
    }

    /// Fetches several collections concurrently.
    ///
    /// Failed collections are left out; the call fails only when every
    /// collection failed.
    pub async fn get_multiple_collections(
        &self,
        names: &[String],
    ) -> BffResponse<BTreeMap<String, CollectionDto>> {
        let started = Instant::now();
        let query = CollectionQuery::default();
        let results = join_all(names.iter().map(|name| self.fetch_collection(name, &query))).await;

        let mut collections = BTreeMap::new();
        let mut errors = Vec::new();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(collection) => {
                    collections.insert(name.clone(), collection);
                }
                Err(err) => {
                    log_error(&err, &format!("get_collection({name})"));
                    errors.push(format!("{name}: {err}"));
                }
            }
        }

        if collections.is_empty() {
            let message = format!("Failed to fetch collections: {}", errors.join(", "));
            tracing::error!(context = "get_multiple_collections", %message, "bff request failed");
            return BffResponse::failure(BffError::new(ErrorCode::UnknownError, message));
        }

        BffResponse::ok(collections, meta_since(started))
    }

    /// Case-insensitive search over titles, excerpts and tags.
    pub async fn search_collection(&self, name: &str, search: &str) -> BffResponse<CollectionDto> {
        let started = Instant::now();
        match self.fetch_collection(name, &CollectionQuery::default()).await {
            Ok(mut collection) => {
                collection.items.retain(|item| matches_search(item, search));
                collection.total_items = collection.items.len() as u64;
                BffResponse::ok(collection, meta_since(started))
            }
            Err(err) => {
                log_error(&err, &format!("search_collection({name})"));
                BffResponse::failure(BffError::from_api_error(&err))
            }
        }
    }

    pub async fn get_user(&self, user_id: &str) -> BffResponse<UserDto> {
        let user = match encode_path(&["users", user_id]) {
            Ok(path) => self.client.get::<ApiUserResponse>(&path).await,
            Err(err) => Err(err),
        };
        match user {
            Ok(user) => BffResponse::ok(transform_user(user), uncached()),
            Err(err) => {
                log_error(&err, &format!("get_user({user_id})"));
                BffResponse::failure(BffError::from_api_error(&err))
            }
        }
    }

    pub async fn get_users(&self, page: Option<u32>, limit: Option<u32>) -> BffResponse<Vec<UserDto>> {
        let path = with_pagination("/users".to_owned(), page, limit);
        match self.client.get::<Vec<ApiUserResponse>>(&path).await {
            Ok(users) => BffResponse::ok(transform_users(users), uncached()),
            Err(err) => {
                log_error(&err, "get_users");
                BffResponse::failure(BffError::from_api_error(&err))
            }
        }
    }

    /// Fetches the user owning `token`, forwarded as a bearer token.
    pub async fn get_current_user(&self, token: Option<&str>) -> BffResponse<UserDto> {
        let options = match token.filter(|token| !token.trim().is_empty()) {
            Some(token) => RequestOptions::new().bearer(token),
            None => RequestOptions::new(),
        };
        match self
            .client
            .get_with::<ApiUserResponse>("/users/me", &options)
            .await
        {
            Ok(user) => BffResponse::ok(transform_user(user), uncached()),
            Err(err) => {
                log_error(&err, "get_current_user");
                BffResponse::failure(BffError::from_api_error(&err))
            }
        }
    }

    async fn fetch_collection(&self, name: &str, query: &CollectionQuery) -> Result<CollectionDto> {
        let path = with_pagination(encode_path(&["collections", name])?, query.page, query.limit);
        let response: ApiCollectionResponse = self.client.get(&path).await?;

        let mut collection = transform_collection(response, query.page, query.limit);
        if query.needs_local_processing() {
            collection.items = filter_and_sort_items(collection.items, query);
            collection.total_items = collection.items.len() as u64;
        }
        Ok(collection)
    }
}
