pub mod identity;
pub mod pii;

/// Error taxonomy shared by every component. Each operation fails fast with
/// the first violated precondition; Validation and BusinessRule carry the
/// caller-facing rule text.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("storage failure: {0}")]
    Store(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures surfaced by a backing store. `Conflict` is how a store reports
/// losing a check-and-write race (uniqueness guard, transition guard); the
/// message is the rule text for the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => DomainError::NotFound("record not found".to_owned()),
            StoreError::Conflict(msg) => DomainError::BusinessRule(msg),
            StoreError::Backend(msg) => DomainError::Store(msg),
        }
    }
}
