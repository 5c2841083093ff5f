//! Favorites endpoints under `/favorites`.
//!
//! Every handler runs behind the identity gateway and reads the caller from
//! the [`CurrentUser`] request extension.

use axum::{
    Extension,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;

use crate::auth::CurrentUser;
use crate::error::{AppError, Result};
use crate::repository::{Favorite, Page, PopularProduct};
use crate::state::AppState;
use crate::validation::{
    PageQuery, Pagination, ValidationError, parse_new_favorite, parse_popular_limit,
    validate_product_id,
};

/// Window for `recent_count` in the stats.
const RECENT_WINDOW_DAYS: i64 = 30;
/// Entries in `most_recent` in the stats.
const MOST_RECENT_COUNT: usize = 5;

/// Response for listing favorites
#[derive(Debug, Serialize)]
pub struct ListFavoritesResponse {
    pub results: Vec<Favorite>,
    pub count: u64,
    pub page: usize,
    pub limit: usize,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct FavoriteCheckResponse {
    pub is_favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<Favorite>,
}

#[derive(Debug, Serialize)]
pub struct RecentFavorite {
    pub product_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FavoriteStatsResponse {
    pub total_favorites: u64,
    pub recent_count: u64,
    pub most_recent: Vec<RecentFavorite>,
}

#[derive(Debug, Serialize)]
pub struct PopularProductsResponse {
    pub popular_products: Vec<PopularProduct>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularQuery {
    pub limit: Option<String>,
}

/// GET /favorites/ - List the caller's favorites, newest first
///
/// # Errors
///
/// * `AppError::BadRequest` - If `page` or `limit` is invalid
pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListFavoritesResponse>> {
    let pagination = Pagination::parse(&query)?;

    let count = state.repository.count(&user.id).await?;
    let results = state
        .repository
        .list(&user.id, pagination.window())
        .await?;

    Ok(Json(ListFavoritesResponse {
        results,
        count,
        page: pagination.page,
        limit: pagination.limit,
        total_pages: pagination.total_pages(count),
    }))
}

/// POST /favorites/ - Add a product to the caller's favorites
///
/// An existing favorite only has its notes replaced (when new notes are
/// given) and is returned with 200. A new favorite is created only after the
/// catalog confirms the article, and is returned with 201.
///
/// # Errors
///
/// * `AppError::BadRequest` - If the body is invalid
/// * `AppError::Unprocessable` - If the catalog rejects the article
/// * `AppError::ServiceUnavailable` - If the catalog cannot be reached in time
/// * `AppError::Conflict` - If a concurrent request created the same favorite
pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Bytes,
) -> Result<Response> {
    let request = parse_new_favorite(&body)?;

    if let Some(existing) = state.repository.find(&user.id, &request.product_id).await? {
        let favorite = if request.notes.is_empty() {
            existing
        } else {
            state
                .repository
                .update_notes(existing.id, request.notes)
                .await?
        };
        debug!(favorite_id = %favorite.id, "Favorite already present");
        return Ok((StatusCode::OK, Json(favorite)).into_response());
    }

    state
        .validator
        .validate_article(&request.product_id, &user.id)
        .await?;

    let favorite = state
        .repository
        .insert(Favorite::new(user.id, request.product_id, request.notes))
        .await?;
    info!(
        favorite_id = %favorite.id,
        product_id = %favorite.product_id,
        "Favorite added"
    );

    Ok((StatusCode::CREATED, Json(favorite)).into_response())
}

/// GET /favorites/product/{product_id}/ - Is this product a favorite?
///
/// # Errors
///
/// * `AppError::BadRequest` - If the product id is out of bounds
pub async fn check_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<String>,
) -> Result<Json<FavoriteCheckResponse>> {
    validate_product_id(&product_id)?;

    let favorite = state.repository.find(&user.id, &product_id).await?;
    Ok(Json(FavoriteCheckResponse {
        is_favorite: favorite.is_some(),
        favorite,
    }))
}

/// DELETE /favorites/product/{product_id}/ - Remove a favorite by product
///
/// # Errors
///
/// * `AppError::BadRequest` - If the product id is out of bounds
/// * `AppError::NotFound` - If the product is not a favorite of the caller
pub async fn remove_by_product(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<String>,
) -> Result<StatusCode> {
    validate_product_id(&product_id)?;

    if state
        .repository
        .delete_by_product(&user.id, &product_id)
        .await?
    {
        info!(product_id = %product_id, "Favorite removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Product {product_id} is not a favorite"
        )))
    }
}

/// DELETE /favorites/{favorite_id}/ - Remove a favorite by id
///
/// # Errors
///
/// * `AppError::BadRequest` - If the id is malformed
/// * `AppError::NotFound` - If the caller has no favorite with this id
pub async fn remove_by_id(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(favorite_id): Path<String>,
) -> Result<StatusCode> {
    let id = Ulid::from_string(&favorite_id)
        .map_err(|_| ValidationError::for_field("favorite_id", "is not a valid id"))?;

    if state.repository.delete_by_id(&user.id, id).await? {
        info!(favorite_id = %id, "Favorite removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Favorite {id} not found")))
    }
}

/// GET /favorites/stats/ - Caller's favorite statistics
pub async fn favorite_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<FavoriteStatsResponse>> {
    let since = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);

    let total_favorites = state.repository.count(&user.id).await?;
    let recent_count = state.repository.count_since(&user.id, since).await?;
    let most_recent = state
        .repository
        .list(&user.id, Page::first(MOST_RECENT_COUNT))
        .await?
        .into_iter()
        .map(|favorite| RecentFavorite {
            product_id: favorite.product_id,
            created_at: favorite.created_at,
        })
        .collect();

    Ok(Json(FavoriteStatsResponse {
        total_favorites,
        recent_count,
        most_recent,
    }))
}

/// GET /favorites/admin/popular/?limit=10 - Most favorited products
///
/// # Errors
///
/// * `AppError::BadRequest` - If `limit` is not a number
pub async fn popular_products(
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> Result<Json<PopularProductsResponse>> {
    let limit = parse_popular_limit(query.limit.as_deref())?;
    let popular_products = state.repository.popular(limit).await?;
    Ok(Json(PopularProductsResponse { popular_products }))
}
