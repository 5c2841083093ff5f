//! REST API routes
//!
//! ## Route Structure
//!
//! - `GET /health` - Service and broker health (no identity check)
//! - `GET /favorites/` - List the caller's favorites, paginated
//! - `POST /favorites/` - Add a favorite or update its notes
//! - `GET /favorites/product/{product_id}/` - Is this product a favorite?
//! - `DELETE /favorites/product/{product_id}/` - Remove by product
//! - `DELETE /favorites/{favorite_id}/` - Remove by favorite id
//! - `GET /favorites/stats/` - Caller's favorite statistics
//! - `GET /favorites/admin/popular/` - Most favorited products overall
//!
//! Everything under `/favorites` passes through the identity gateway.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get},
};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub mod favorites;
pub mod health;

/// Assembles the API routes. The identity gateway is applied as a route
/// layer, so unknown paths still answer 404 rather than 401.
pub fn create_router(state: AppState) -> Router<AppState> {
    let favorite_routes = Router::new()
        .route(
            "/favorites/",
            get(favorites::list_favorites).post(favorites::add_favorite),
        )
        .route(
            "/favorites/product/{product_id}/",
            get(favorites::check_favorite).delete(favorites::remove_by_product),
        )
        .route("/favorites/{favorite_id}/", delete(favorites::remove_by_id))
        .route("/favorites/stats/", get(favorites::favorite_stats))
        .route("/favorites/admin/popular/", get(favorites::popular_products))
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(favorite_routes)
}
