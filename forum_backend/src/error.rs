use thiserror::Error;

/// Failures surfaced by the forum services.
///
/// Read paths never produce `NotFound`; they return `Option` or an empty list.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ForumResult<T> = std::result::Result<T, ForumError>;

impl ForumError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

/// Rejects blank values for a required field.
pub fn require_non_blank(field: &str, value: &str) -> ForumResult<()> {
    if value.trim().is_empty() {
        return Err(ForumError::validation(format!("{field} may not be empty")));
    }
    Ok(())
}
