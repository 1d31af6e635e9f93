//! Error kinds surfaced by the forum and blog services.

use thiserror::Error;

/// Result type returned by every service operation.
pub type ForumResult<T> = std::result::Result<T, ForumError>;

#[derive(Debug, Error)]
pub enum ForumError {
    /// A referenced entity does not exist (or vanished before the write).
    #[error("{0}")]
    NotFound(String),

    /// The request is well-formed but violates a content rule.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No actor id was supplied where one is required.
    #[error("authentication required")]
    Unauthenticated,

    /// The actor lacks the role or ownership the operation needs.
    #[error("not allowed: {0}")]
    Unauthorized(String),

    /// The identity provider could not be reached or answered with an error.
    #[error("identity provider failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl ForumError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ForumError::NotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ForumError::InvalidInput(reason.into())
    }
}

/// Repository closures return `anyhow::Result`; a `ForumError` raised inside
/// one is recovered here instead of being flattened into `Internal`.
impl From<anyhow::Error> for ForumError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ForumError>() {
            Ok(forum) => forum,
            Err(other) => ForumError::Internal(other),
        }
    }
}

impl From<rusqlite::Error> for ForumError {
    fn from(err: rusqlite::Error) -> Self {
        ForumError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forum_errors_survive_anyhow_round_trip() {
        let wrapped: anyhow::Error = ForumError::not_found("thread abc not found").into();
        match ForumError::from(wrapped) {
            ForumError::NotFound(msg) => assert_eq!(msg, "thread abc not found"),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn foreign_errors_become_internal() {
        let err = ForumError::from(anyhow::anyhow!("disk on fire"));
        assert!(matches!(err, ForumError::Internal(_)));
    }
}
