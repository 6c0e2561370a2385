use atoll_booking::{AuthorizePayment, Payment, PaymentMethod, PaymentStatus};
use atoll_core::identity::CurrentUser;
use atoll_core::DomainError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub reservation_id: Uuid,
    pub method: String,
    pub amount_cents: i64,
    pub installments: Option<u16>,
    pub cardholder_name: Option<String>,
    pub payer_document: Option<String>,
    pub card_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
struct PaymentStatusResponse {
    payment_id: Uuid,
    status: PaymentStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(create_payment))
        .route(
            "/v1/payments/{id}/status",
            get(get_payment_status).put(update_payment_status),
        )
}

async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let method = PaymentMethod::parse(&req.method).ok_or_else(|| {
        ApiError::Domain(DomainError::Validation(format!("unknown payment method {:?}", req.method)))
    })?;

    let payment = state
        .payments
        .authorize(
            user.id,
            AuthorizePayment {
                reservation_id: req.reservation_id,
                method,
                amount_cents: req.amount_cents,
                installments: req.installments,
                cardholder_name: req.cardholder_name,
                payer_document: req.payer_document,
                card_number: req.card_number,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

async fn get_payment_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let status = state.payments.get_status(id, &user).await?;
    Ok(Json(PaymentStatusResponse { payment_id: id, status }))
}

async fn update_payment_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<Payment>, ApiError> {
    let status = PaymentStatus::parse(&req.status).ok_or_else(|| {
        ApiError::Domain(DomainError::Validation(format!("unknown payment status {:?}", req.status)))
    })?;
    let payment = state.payments.update_status(id, status, &user).await?;
    Ok(Json(payment))
}
