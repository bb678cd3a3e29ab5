use std::error::Error as StdError;

use thiserror::Error;

use crate::application::content::{ContentError, RenderError};
use crate::application::context::DeadlineExceeded;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;

/// Failure of a post lifecycle operation.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("`{requester}` may not modify posts owned by `{owner}`")]
    Unauthorized { requester: String, owner: String },
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("version numbering conflict: {message}")]
    VersioningConflict { message: String },
    #[error("persistent store unavailable")]
    StoreUnavailable(#[source] RepoError),
    #[error("content store unavailable")]
    ContentUnavailable(#[source] ContentError),
    #[error("cache unavailable")]
    CacheUnavailable(#[source] CacheError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),
    /// The version was committed but its analytics record was not created.
    #[error("version {version} was committed but its analytics record could not be created")]
    PartiallyApplied {
        version: String,
        #[source]
        source: RepoError,
    },
}

impl PostError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn unauthorized(requester: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::Unauthorized {
            requester: requester.into(),
            owner: owner.into(),
        }
    }

    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::NotFound { .. } => 404,
            Self::InvalidInput { .. } => 400,
            Self::VersioningConflict { .. } => 409,
            Self::StoreUnavailable(_) | Self::ContentUnavailable(_) | Self::CacheUnavailable(_) => {
                503
            }
            Self::DeadlineExceeded(_) => 504,
            Self::Render(_) | Self::PartiallyApplied { .. } => 500,
        }
    }

    /// The error message followed by every source in the chain.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

impl From<RepoError> for PostError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("record"),
            RepoError::Duplicate { constraint } => Self::VersioningConflict {
                message: format!("version already exists (`{constraint}`)"),
            },
            RepoError::InvalidInput { message } => Self::InvalidInput { message },
            other => Self::StoreUnavailable(other),
        }
    }
}

impl From<ContentError> for PostError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound { .. } => Self::not_found("content object"),
            other => Self::ContentUnavailable(other),
        }
    }
}

impl From<CacheError> for PostError {
    fn from(err: CacheError) -> Self {
        Self::CacheUnavailable(err)
    }
}

impl From<DomainError> for PostError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity } => Self::not_found(entity),
            DomainError::Validation { message } => Self::InvalidInput { message },
            DomainError::Invariant { message } => Self::VersioningConflict { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(PostError::unauthorized("mallory", "alice").status_code(), 401);
        assert_eq!(PostError::not_found("post").status_code(), 404);
        assert_eq!(PostError::from(RepoError::Timeout).status_code(), 503);
        assert_eq!(
            PostError::from(DeadlineExceeded { op: "versions.fetch" }).status_code(),
            504
        );
        assert_eq!(
            PostError::from(DomainError::invariant("malformed")).status_code(),
            409
        );
    }

    #[test]
    fn duplicate_versions_are_conflicts() {
        let err = PostError::from(RepoError::Duplicate {
            constraint: "post_versions_pkey".to_string(),
        });
        assert!(matches!(err, PostError::VersioningConflict { .. }));
    }

    #[test]
    fn messages_include_sources() {
        let err = PostError::PartiallyApplied {
            version: "3".to_string(),
            source: RepoError::Timeout,
        };
        let messages = err.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], "database timeout");
    }
}
