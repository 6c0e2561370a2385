use atoll_core::identity::{CurrentUser, Role};
use atoll_core::DomainError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims as minted by the identity collaborator: the subject is the
/// user id, the role one of ADMIN/CLIENT.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Authenticates the request and stashes the resolved `CurrentUser` in the
/// request extensions. Authorization (role and ownership) stays in the
/// engine, which is why there is a single middleware for both roles.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(unauthenticated)?;

    let token = header_value.strip_prefix("Bearer ").ok_or_else(unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| unauthenticated())?;

    let user = resolve_user(&token_data.claims).ok_or_else(unauthenticated)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

fn resolve_user(claims: &Claims) -> Option<CurrentUser> {
    let id = Uuid::parse_str(&claims.sub).ok()?;
    let role = Role::parse(&claims.role)?;
    Some(CurrentUser { id, role })
}

fn unauthenticated() -> ApiError {
    ApiError::Domain(DomainError::Unauthenticated(
        "a valid bearer token is required".to_owned(),
    ))
}
