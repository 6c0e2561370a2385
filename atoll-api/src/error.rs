use atoll_core::DomainError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Domain(err) => {
                let status = match &err {
                    DomainError::Validation(_) | DomainError::BusinessRule(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                    DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                    DomainError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                    DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("store failure: {err}");
                    (status, "internal server error".to_owned())
                } else {
                    (status, err.to_string())
                }
            }
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
