//! # tm-api
//!
//! The HTTP routing and orchestration layer for Tastemap.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;

pub use error::ApiError;
pub use state::AppState;

/// Builds the full route table with the standard middleware stack applied.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/search", get(handlers::search))
        .route("/venues/{id}", get(handlers::venue_detail))
        .route(
            "/venues/{id}/reviews",
            get(handlers::list_reviews).post(handlers::create_review),
        )
        .route(
            "/reviews/{id}",
            put(handlers::update_review).delete(handlers::delete_review),
        )
        .route(
            "/venues/{id}/bookmark",
            put(handlers::add_bookmark).delete(handlers::remove_bookmark),
        )
        .route("/me", get(handlers::me))
        .route("/me/bookmarks", get(handlers::my_bookmarks))
        .route("/memberships/redeem", post(handlers::redeem))
        .route("/auth/login", post(handlers::login))
        .with_state(state);

    middleware::apply(routes, request_timeout)
}
