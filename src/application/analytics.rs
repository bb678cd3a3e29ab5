//! Engagement reads and writes on top of [`AnalyticsStore`].

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::context::RequestContext;
use super::ensure_owner;
use super::error::PostError;
use super::repos::{AnalyticsStore, RepoError, VersionStore};
use crate::domain::analytics::EngagementSummary;
use crate::domain::entities::{AnalyticsRecord, ViewedPostRecord};
use crate::domain::posts::{Owner, PostTitle, PostVersion, VersionNumber};

#[derive(Clone)]
pub struct AnalyticsService {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
}

impl AnalyticsService {
    pub fn new(versions: Arc<dyn VersionStore>, analytics: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            versions,
            analytics,
        }
    }

    /// Toggles `liker`'s like on the active version; `true` means liked.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn like_active(
        &self,
        ctx: &RequestContext,
        liker: &str,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<bool, PostError> {
        let active = self.active(ctx, owner, title).await?;
        self.toggle(ctx, liker, owner, title, active.version).await
    }

    /// Toggles `liker`'s like on a specific version; `true` means liked.
    pub async fn toggle_like(
        &self,
        ctx: &RequestContext,
        liker: &str,
        owner: &Owner,
        title: &PostTitle,
        version: &str,
    ) -> Result<bool, PostError> {
        let version =
            VersionNumber::parse(version).map_err(|_| PostError::not_found("post version"))?;
        self.toggle(ctx, liker, owner, title, version).await
    }

    /// View and like counts of the active version.
    pub async fn public_summary(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<EngagementSummary, PostError> {
        let record = self.active_record(ctx, owner, title).await?;
        Ok(EngagementSummary::from(&record))
    }

    /// Whether `viewer` currently likes the active version.
    pub async fn liked_by(
        &self,
        ctx: &RequestContext,
        viewer: &str,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<bool, PostError> {
        let record = self.active_record(ctx, owner, title).await?;
        Ok(record.is_liked_by(viewer))
    }

    /// Full analytics record of the active version, for its owner.
    pub async fn owner_analytics(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<AnalyticsRecord, PostError> {
        ensure_owner(requester, owner)?;
        self.active_record(ctx, owner, title).await
    }

    /// View timestamps across every active post of the requester, oldest first.
    pub async fn activity_timeline(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
    ) -> Result<Vec<OffsetDateTime>, PostError> {
        ensure_owner(requester, owner)?;
        let active = ctx
            .run(
                "versions.list_active",
                self.versions.list_active_versions(owner),
            )
            .await??;

        let mut timeline = Vec::new();
        for record in active {
            let version = PostVersion::from_record(record)?;
            let analytics = ctx
                .run(
                    "analytics.get",
                    self.analytics
                        .get_post_analytics(owner, &version.title, version.version),
                )
                .await??;
            if let Some(analytics) = analytics {
                timeline.extend(analytics.views);
            }
        }
        timeline.sort();
        Ok(timeline)
    }

    /// Most-viewed versions that are currently active, at most `limit`.
    ///
    /// An inactive version never appears even when it out-ranks the active
    /// version of its title. The candidate window widens until enough
    /// active versions are found or the store runs out.
    pub async fn most_viewed(
        &self,
        ctx: &RequestContext,
        limit: usize,
    ) -> Result<Vec<ViewedPostRecord>, PostError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut window = limit.saturating_mul(4);
        loop {
            let candidates = ctx
                .run("analytics.most_viewed", self.analytics.most_viewed(window))
                .await??;
            let exhausted = candidates.len() < window;

            let mut active = Vec::with_capacity(limit);
            for candidate in candidates {
                if self.is_active(ctx, &candidate).await? {
                    active.push(candidate);
                    if active.len() == limit {
                        break;
                    }
                }
            }

            if active.len() == limit || exhausted || window == usize::MAX {
                return Ok(active);
            }
            debug!(window, found = active.len(), "Widening most-viewed window");
            window = window.saturating_mul(2);
        }
    }

    async fn is_active(
        &self,
        ctx: &RequestContext,
        candidate: &ViewedPostRecord,
    ) -> Result<bool, PostError> {
        let owner = Owner::from_stored(candidate.owner.clone());
        let title = PostTitle::from_stored(candidate.title.clone());
        let Ok(version) = VersionNumber::parse(&candidate.version) else {
            return Ok(false);
        };
        Ok(ctx
            .run(
                "versions.is_active",
                self.versions.is_active(&owner, &title, version),
            )
            .await??)
    }

    async fn toggle(
        &self,
        ctx: &RequestContext,
        liker: &str,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<bool, PostError> {
        let liked = ctx
            .run(
                "analytics.toggle_like",
                self.analytics.toggle_like(owner, title, version, liker),
            )
            .await?
            .map_err(|err| match err {
                RepoError::NotFound => PostError::not_found("post analytics"),
                other => PostError::from(other),
            })?;
        debug!(%owner, %title, %version, liker, liked, "Toggled like");
        Ok(liked)
    }

    async fn active(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<PostVersion, PostError> {
        let record = ctx
            .run("versions.active", self.versions.active_version(owner, title))
            .await??
            .ok_or_else(|| PostError::not_found("post"))?;
        Ok(PostVersion::from_record(record)?)
    }

    async fn active_record(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<AnalyticsRecord, PostError> {
        let active = self.active(ctx, owner, title).await?;
        ctx.run(
            "analytics.get",
            self.analytics
                .get_post_analytics(owner, title, active.version),
        )
        .await??
        .ok_or_else(|| PostError::not_found("post analytics"))
    }
}
