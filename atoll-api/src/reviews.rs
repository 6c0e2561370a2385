use atoll_booking::{Review, ReviewEntry};
use atoll_core::identity::CurrentUser;
use atoll_core::DomainError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    pub package_id: Uuid,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateReviewRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct DestinationFilter {
    pub destination: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModerateReviewResponse {
    message: String,
    review: Option<Review>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reviews", post(submit_review))
        .route("/v1/reviews/pending", get(list_pending_reviews))
        .route("/v1/reviews/mine", get(list_my_reviews))
        .route("/v1/reviews/{id}", put(moderate_review))
}

/// Approved listings are public; they bypass the auth middleware.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reviews/approved", get(list_approved_reviews))
        .route("/v1/packages/{id}/reviews", get(list_package_reviews))
}

async fn submit_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let rating = u8::try_from(req.rating).map_err(|_| {
        ApiError::Domain(DomainError::Validation("rating must be between 1 and 5".to_owned()))
    })?;
    let review = state.reviews.submit(user.id, req.package_id, rating, req.comment).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn list_pending_reviews(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<DestinationFilter>,
) -> Result<Json<Vec<ReviewEntry>>, ApiError> {
    let entries = state.reviews.list_pending(&user, filter.destination.as_deref()).await?;
    Ok(Json(entries))
}

async fn list_approved_reviews(
    State(state): State<AppState>,
    Query(filter): Query<DestinationFilter>,
) -> Result<Json<Vec<ReviewEntry>>, ApiError> {
    let entries = state.reviews.list_approved(filter.destination.as_deref()).await?;
    Ok(Json(entries))
}

async fn list_package_reviews(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(state.reviews.list_for_package(package_id).await?))
}

async fn list_my_reviews(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<ReviewEntry>>, ApiError> {
    Ok(Json(state.reviews.list_mine(user.id).await?))
}

async fn moderate_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<ModerateReviewRequest>,
) -> Result<Json<ModerateReviewResponse>, ApiError> {
    let outcome = state.reviews.moderate(id, &req.action, &user).await?;
    let response = match outcome {
        Some(review) => ModerateReviewResponse { message: "review approved".to_owned(), review: Some(review) },
        None => ModerateReviewResponse { message: "review rejected and removed".to_owned(), review: None },
    };
    Ok(Json(response))
}
