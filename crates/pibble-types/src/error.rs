use thiserror::Error;

/// Failure taxonomy shared by the realtime gateway and the HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Unknown or invalid credential. The caller may retry.
    #[error("{0}")]
    Authentication(String),

    /// Missing field, empty payload, disallowed media type.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Credential is valid but not allowed to perform the action.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Store unavailable or write rejected.
    #[error("{0}")]
    Persistence(String),
}

impl ChatError {
    pub fn invalid_credential() -> Self {
        Self::Authentication("Invalid post key".into())
    }
}
