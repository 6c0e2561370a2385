use atoll_core::identity::Role;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

/// Development token mint. Identity management (registration, login,
/// password reset) lives in an external collaborator; this endpoint stands
/// in for it by signing a claim set for the requested role.
#[derive(Debug, Deserialize)]
struct TokenRequest {
    user_id: Option<Uuid>,
    role: Role,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
    user_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(issue_token))
}

async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user_id = req.user_id.unwrap_or_else(Uuid::new_v4);
    let claims = Claims {
        sub: user_id.to_string(),
        role: req.role.to_string(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.auth.secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {e}")))?;

    Ok(Json(TokenResponse { token, user_id }))
}
