//! Conversions from backend API shapes into UI-facing DTOs.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::types::{
    ApiCollectionItem, ApiCollectionResponse, ApiUserResponse, CollectionDto, CollectionItemDto,
    CollectionQuery, Pagination, SortBy, SortOrder, UserDto,
};

const EXCERPT_MAX_CHARS: usize = 150;
const LONG_DATE_FORMAT: &str = "%-d %B %Y";
const MONTH_YEAR_FORMAT: &str = "%B %Y";

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|dt| dt.date())
                .ok()
        })
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

/// Formats a date as `16 October 2026`; today when absent.
///
/// Unparseable input is passed through unchanged.
pub fn format_date(value: Option<&str>) -> String {
    match value {
        None => Utc::now().date_naive().format(LONG_DATE_FORMAT).to_string(),
        Some(raw) => parse_date(raw)
            .map(|date| date.format(LONG_DATE_FORMAT).to_string())
            .unwrap_or_else(|| raw.to_owned()),
    }
}

fn format_month_year(value: &str) -> String {
    parse_date(value)
        .map(|date| date.format(MONTH_YEAR_FORMAT).to_string())
        .unwrap_or_else(|| value.to_owned())
}

/// Shortens content to at most 150 characters followed by `...`.
pub fn create_excerpt(content: Option<&str>) -> Option<String> {
    let content = content.filter(|content| !content.is_empty())?;
    if content.chars().count() <= EXCERPT_MAX_CHARS {
        return Some(content.to_owned());
    }
    let head: String = content.chars().take(EXCERPT_MAX_CHARS).collect();
    Some(format!("{}...", head.trim()))
}

pub fn transform_collection_item(item: ApiCollectionItem) -> CollectionItemDto {
    CollectionItemDto {
        id: item.id.to_string(),
        excerpt: create_excerpt(item.content.as_deref()),
        published_date: Some(format_date(item.created_at.as_deref())),
        title: item.title,
        author: item.author,
        tags: item.tags.unwrap_or_default(),
    }
}

/// Converts a collection response; pagination is computed only when both
/// `page` and `limit` are non-zero.
pub fn transform_collection(
    response: ApiCollectionResponse,
    page: Option<u32>,
    limit: Option<u32>,
) -> CollectionDto {
    let items: Vec<CollectionItemDto> = response
        .items
        .into_iter()
        .map(transform_collection_item)
        .collect();
    let total_items = response
        .total
        .filter(|total| *total > 0)
        .unwrap_or(items.len() as u64);

    let pagination = match (page, limit) {
        (Some(current_page), Some(limit)) if current_page > 0 && limit > 0 => {
            let total_pages = u32::try_from(total_items.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
            Some(Pagination {
                current_page,
                total_pages,
                has_next: current_page < total_pages,
                has_prev: current_page > 1,
            })
        }
        _ => None,
    };

    CollectionDto {
        name: response.collection,
        items,
        total_items,
        updated_at: format_date(Some(response.timestamp.as_str())),
        pagination,
    }
}

fn compare_titles(a: &CollectionItemDto, b: &CollectionItemDto) -> Ordering {
    a.title.cmp(&b.title)
}

fn compare_dates(a: &CollectionItemDto, b: &CollectionItemDto) -> Ordering {
    let a_raw = a.published_date.as_deref().unwrap_or_default();
    let b_raw = b.published_date.as_deref().unwrap_or_default();
    let parse = |raw: &str| NaiveDate::parse_from_str(raw, LONG_DATE_FORMAT).ok();
    match (parse(a_raw), parse(b_raw)) {
        (Some(a_date), Some(b_date)) => a_date.cmp(&b_date),
        _ => a_raw.cmp(b_raw),
    }
}

/// Filters by tags (any match) and author (case-insensitive substring),
/// then sorts by title or date. Popularity keeps the upstream order.
pub fn filter_and_sort_items(
    items: Vec<CollectionItemDto>,
    query: &CollectionQuery,
) -> Vec<CollectionItemDto> {
    let author = query.author.as_deref().map(str::to_lowercase);
    let mut filtered: Vec<CollectionItemDto> = items
        .into_iter()
        .filter(|item| query.tags.is_empty() || query.tags.iter().any(|tag| item.tags.contains(tag)))
        .filter(|item| match &author {
            Some(author) => item
                .author
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(author.as_str())),
            None => true,
        })
        .collect();

    let compare: fn(&CollectionItemDto, &CollectionItemDto) -> Ordering = match query.sort_by {
        Some(SortBy::Title) => compare_titles,
        Some(SortBy::Date) => compare_dates,
        Some(SortBy::Popularity) | None => return filtered,
    };
    let descending = query.order == Some(SortOrder::Desc);
    filtered.sort_by(|a, b| {
        let ordering = compare(a, b);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    filtered
}

/// Case-insensitive match over title, excerpt and tags.
pub fn matches_search(item: &CollectionItemDto, search: &str) -> bool {
    let needle = search.to_lowercase();
    item.title.to_lowercase().contains(&needle)
        || item
            .excerpt
            .as_deref()
            .is_some_and(|excerpt| excerpt.to_lowercase().contains(&needle))
        || item.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
}

fn display_name(user: &ApiUserResponse) -> String {
    let parts: Vec<&str> = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        user.username.clone()
    } else {
        parts.join(" ")
    }
}

pub fn transform_user(user: ApiUserResponse) -> UserDto {
    UserDto {
        id: user.id.to_string(),
        display_name: display_name(&user),
        is_admin: user.role == "admin",
        member_since: format_month_year(&user.created_at),
        username: user.username,
        email: user.email,
        avatar_url: user.avatar,
    }
}

pub fn transform_users(users: Vec<ApiUserResponse>) -> Vec<UserDto> {
    users.into_iter().map(transform_user).collect()
}
