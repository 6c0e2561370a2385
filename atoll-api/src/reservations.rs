use atoll_booking::{Reservation, ReservationStatus, Traveler};
use atoll_core::identity::CurrentUser;
use atoll_core::DomainError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub package_id: Uuid,
    #[serde(default)]
    pub travelers: Vec<Traveler>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReservationStatusRequest {
    pub status: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_all_reservations))
        .route("/v1/reservations/mine", get(list_my_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/status", put(update_reservation_status))
}

async fn create_reservation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let reservation = state.reservations.create(user.id, req.package_id, req.travelers).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn list_all_reservations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    Ok(Json(state.reservations.list_all(&user).await?))
}

async fn list_my_reservations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    Ok(Json(state.reservations.list_mine(user.id).await?))
}

async fn get_reservation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(state.reservations.get(id, &user).await?))
}

async fn update_reservation_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReservationStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let status = ReservationStatus::parse(&req.status).ok_or_else(|| {
        ApiError::Domain(DomainError::Validation(format!(
            "unknown reservation status {:?}",
            req.status
        )))
    })?;
    state.reservations.update_status(id, status, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
