//! Owner-facing lifecycle operations on existing versions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::content::{ContentError, ContentStore};
use super::context::RequestContext;
use super::error::PostError;
use super::locks::TitleLocks;
use super::ensure_owner;
use super::repos::{ProfileDirectory, TitleRemoval, VersionStore};
use crate::cache::{CacheHandle, CacheKey};
use crate::domain::posts::{
    ContentKey, Endpoint, Owner, PostTitle, PostVersion, PostVersions, VersionNumber,
};

#[derive(Clone)]
pub struct Publisher {
    versions: Arc<dyn VersionStore>,
    removal: Arc<dyn TitleRemoval>,
    content: Arc<dyn ContentStore>,
    profiles: Arc<dyn ProfileDirectory>,
    cache: CacheHandle,
    locks: TitleLocks,
}

impl Publisher {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        removal: Arc<dyn TitleRemoval>,
        content: Arc<dyn ContentStore>,
        profiles: Arc<dyn ProfileDirectory>,
        cache: CacheHandle,
        locks: TitleLocks,
    ) -> Self {
        Self {
            versions,
            removal,
            content,
            profiles,
            cache,
            locks,
        }
    }

    /// Every version of a title with the derived latest and active versions.
    pub async fn fetch_versions(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<PostVersions, PostError> {
        let records = ctx
            .run("versions.fetch", self.versions.fetch_versions(owner, title))
            .await??;
        PostVersions::from_records(records)?.ok_or_else(|| PostError::not_found("post"))
    }

    /// Makes `version` the single active version of the title and evicts the
    /// cached endpoint so the next read renders the new version.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        title: &PostTitle,
        version: &str,
    ) -> Result<(), PostError> {
        ensure_owner(requester, owner)?;
        let version =
            VersionNumber::parse(version).map_err(|_| PostError::not_found("post version"))?;

        {
            let _guard = self.locks.acquire(owner, title).await;
            ctx.run(
                "versions.activate",
                self.versions.activate_version(owner, title, version),
            )
            .await?
            .map_err(|err| match PostError::from(err) {
                PostError::NotFound { .. } => PostError::not_found("post version"),
                other => other,
            })?;
        }

        let endpoint = Endpoint::for_post(owner, title);
        self.cache
            .invalidate(ctx, &CacheKey::Endpoint(endpoint.clone()))
            .await;

        info!(%endpoint, %version, "Published post version");
        Ok(())
    }

    /// Removes every version of a title with its analytics and content objects.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn delete_post(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<usize, PostError> {
        ensure_owner(requester, owner)?;
        let _guard = self.locks.acquire(owner, title).await;

        let existing = ctx
            .run("versions.fetch", self.versions.fetch_versions(owner, title))
            .await??;
        if existing.is_empty() {
            return Err(PostError::not_found("post"));
        }

        let removed = ctx
            .run("titles.remove", self.removal.remove_title(owner, title))
            .await??;

        let mut keys = BTreeSet::new();
        for record in &removed {
            if let Ok(version) = VersionNumber::parse(&record.version) {
                keys.insert(ContentKey::html(owner, title, version).to_string());
                keys.insert(ContentKey::markdown(owner, title, version).to_string());
            }
            if !record.content_ref.is_empty() {
                keys.insert(record.content_ref.clone());
            }
        }

        let mut first_failure = None;
        for key in &keys {
            match ctx.run("content.delete", self.content.delete(key)).await {
                Ok(Ok(())) => {}
                // External locators that the store does not manage.
                Ok(Err(ContentError::InvalidKey { .. })) => {}
                Ok(Err(err)) => {
                    warn!(key = %key, error = %err, "Failed to delete content object");
                    first_failure.get_or_insert(PostError::from(err));
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Content delete timed out");
                    first_failure.get_or_insert(PostError::from(err));
                }
            }
        }

        let endpoint = Endpoint::for_post(owner, title);
        self.cache
            .invalidate(ctx, &CacheKey::Endpoint(endpoint.clone()))
            .await;

        if let Some(err) = first_failure {
            return Err(err);
        }

        info!(%endpoint, versions = removed.len(), "Deleted post");
        Ok(removed.len())
    }

    /// All titles of an owner, each with its versions.
    pub async fn list_owner_posts(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
    ) -> Result<Vec<PostVersions>, PostError> {
        let records = ctx
            .run(
                "versions.list_owner",
                self.versions.list_owner_versions(owner),
            )
            .await??;

        let mut grouped: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.title.clone()).or_default().push(record);
        }

        let mut posts = Vec::with_capacity(grouped.len());
        for (_, records) in grouped {
            if let Some(versions) = PostVersions::from_records(records)? {
                posts.push(versions);
            }
        }
        Ok(posts)
    }

    /// Stores the owner's presentation style and evicts every cached endpoint
    /// of that owner.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn update_style(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        style: &str,
    ) -> Result<usize, PostError> {
        ensure_owner(requester, owner)?;
        let style = style.trim();
        if style.is_empty() {
            return Err(PostError::InvalidInput {
                message: "style must not be empty".to_string(),
            });
        }

        ctx.run("profiles.set_style", self.profiles.set_style(owner, style))
            .await??;
        let evicted = self
            .cache
            .invalidate_prefix(ctx, &Endpoint::owner_prefix(owner))
            .await;

        info!(%owner, style, evicted, "Updated owner style");
        Ok(evicted)
    }

    /// The version a reader would currently be served, if any.
    pub async fn active_version(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Option<PostVersion>, PostError> {
        let record = ctx
            .run("versions.active", self.versions.active_version(owner, title))
            .await??;
        record
            .map(PostVersion::from_record)
            .transpose()
            .map_err(PostError::from)
    }
}
