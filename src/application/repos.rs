//! Repository traits describing persistence adapters.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{AnalyticsRecord, ProfileRecord, VersionRecord, ViewedPostRecord};
use crate::domain::posts::{Owner, PostTitle, VersionNumber};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Version to insert as the new active version of its title.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub owner: Owner,
    pub title: PostTitle,
    pub version: VersionNumber,
    pub created_at: OffsetDateTime,
    pub content_ref: String,
}

/// Authoritative storage of post versions and their active flags.
///
/// Implementations guarantee that at most one version per (owner, title) is
/// active after every successful call and that no reader ever observes two.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// All versions of a title, in no particular order.
    async fn fetch_versions(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError>;

    async fn active_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Option<VersionRecord>, RepoError>;

    /// Deactivates every sibling and inserts `version` as active in one atomic
    /// step. Fails with [`RepoError::Duplicate`] when the number is taken.
    async fn insert_active_version(&self, version: NewVersion) -> Result<VersionRecord, RepoError>;

    /// Makes `version` the only active version of its title in one atomic
    /// step. Fails with [`RepoError::NotFound`], leaving every flag untouched,
    /// when the version does not exist.
    async fn activate_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<(), RepoError>;

    /// Removes every version of a title and returns what was removed.
    async fn delete_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError>;

    async fn list_owner_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError>;

    async fn list_active_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError>;

    /// Most recently created versions platform-wide, newest first.
    async fn newest_versions(&self, limit: usize) -> Result<Vec<VersionRecord>, RepoError>;

    async fn is_active(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<bool, RepoError>;
}

/// Engagement storage keyed by (owner, title, version).
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Creates an empty record. Fails with [`RepoError::Duplicate`] if one exists.
    async fn create_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        created_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Appends a view timestamp. Fails with [`RepoError::NotFound`] when the
    /// record does not exist.
    async fn record_view(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Adds `liker` if absent and returns `true`, otherwise removes it and
    /// returns `false`. Each call applies atomically.
    async fn toggle_like(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        liker: &str,
    ) -> Result<bool, RepoError>;

    async fn get_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<Option<AnalyticsRecord>, RepoError>;

    async fn view_count(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<u64, RepoError>;

    /// Records ordered by view count descending, earliest creation first on ties.
    async fn most_viewed(&self, limit: usize) -> Result<Vec<ViewedPostRecord>, RepoError>;

    /// Removes the records of every version of a title; returns how many.
    async fn delete_post_analytics(&self, owner: &Owner, title: &PostTitle)
    -> Result<u64, RepoError>;
}

/// Removes a whole title: every version and every analytics record.
#[async_trait]
pub trait TitleRemoval: Send + Sync {
    /// Returns the versions that were removed.
    async fn remove_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError>;
}

/// Title removal over two stores that share no transaction.
///
/// Analytics go first, so a failure there leaves the title untouched. If the
/// version delete then fails, the versions outlive their analytics until the
/// delete is retried.
#[derive(Clone)]
pub struct SplitTitleRemoval {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
}

impl SplitTitleRemoval {
    pub fn new(versions: Arc<dyn VersionStore>, analytics: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            versions,
            analytics,
        }
    }
}

#[async_trait]
impl TitleRemoval for SplitTitleRemoval {
    async fn remove_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        self.analytics.delete_post_analytics(owner, title).await?;
        self.versions.delete_title(owner, title).await
    }
}

/// Read access to the external user directory, plus the style preference
/// that style updates write through.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, owner: &Owner) -> Result<Option<ProfileRecord>, RepoError>;

    async fn set_style(&self, owner: &Owner, style: &str) -> Result<(), RepoError>;
}
