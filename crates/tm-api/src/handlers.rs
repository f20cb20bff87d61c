//! # tm-api Handlers
//!
//! Thin adapters between HTTP and the service layer. Authentication happens
//! in the extractors, so a write handler never runs without a user id.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use tm_core::params::{RawSearchParams, SearchParams};
use tm_core::{Bookmark, MembershipTier, Review, User};
use tm_services::accounts::{LoginRequest, Session};
use tm_services::bookmarks::BookmarkState;
use tm_services::reviews::ReviewInput;
use tm_services::search::SearchResponse;
use tm_services::venues::VenueDetail;

use crate::error::ApiResult;
use crate::extract::{AppJson, AppQuery, CurrentUser, MaybeUser};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /search`. Every query parameter is optional and malformed values are
/// coerced rather than rejected. List parameters accept repeated keys.
#[instrument(skip_all)]
pub async fn search(
    State(state): State<AppState>,
    AppQuery(pairs): AppQuery<Vec<(String, String)>>,
) -> ApiResult<Json<SearchResponse>> {
    let params = SearchParams::from_raw(RawSearchParams::from_pairs(pairs));
    Ok(Json(state.search.search(&params).await?))
}

pub async fn venue_detail(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VenueDetail>> {
    Ok(Json(state.venues.detail(id, viewer).await?))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(venue_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.list(venue_id).await?))
}

pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(venue_id): Path<Uuid>,
    AppJson(input): AppJson<ReviewInput>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let review = state.reviews.create(user_id, venue_id, input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(review_id): Path<Uuid>,
    AppJson(input): AppJson<ReviewInput>,
) -> ApiResult<Json<Review>> {
    Ok(Json(state.reviews.update(user_id, review_id, input, Utc::now()).await?))
}

pub async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(review_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.reviews.delete(user_id, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_bookmark(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(venue_id): Path<Uuid>,
) -> ApiResult<Json<BookmarkState>> {
    Ok(Json(state.bookmarks.add(user_id, venue_id, Utc::now()).await?))
}

pub async fn remove_bookmark(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(venue_id): Path<Uuid>,
) -> ApiResult<Json<BookmarkState>> {
    Ok(Json(state.bookmarks.remove(user_id, venue_id).await?))
}

pub async fn my_bookmarks(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<Bookmark>>> {
    Ok(Json(state.bookmarks.list(user_id).await?))
}

pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<User>> {
    Ok(Json(state.accounts.profile(user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[serde(alias = "code")]
    pub serial_number: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub membership: MembershipTier,
}

pub async fn redeem(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(request): AppJson<RedeemRequest>,
) -> ApiResult<Json<RedeemResponse>> {
    let membership = state
        .membership
        .redeem(user_id, &request.serial_number, Utc::now())
        .await?;
    Ok(Json(RedeemResponse { membership }))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.accounts.login(request, Utc::now()).await?))
}
