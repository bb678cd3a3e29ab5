//! Public, cache-through serving of post endpoints.
//!
//! A cached endpoint is served as-is. Views are always attributed to the
//! version that is active when the view is recorded, which may differ from
//! the version the cached page was rendered from for up to one cache TTL
//! after a publish.

use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::content::{ContentStore, TemplateContext, TemplateEngine};
use super::context::RequestContext;
use super::ensure_owner;
use super::error::PostError;
use super::repos::{AnalyticsStore, ProfileDirectory, VersionStore};
use crate::cache::{CacheHandle, CacheKey};
use crate::domain::entities::ProfileRecord;
use crate::domain::posts::{ContentKey, Endpoint, Owner, PostTitle, PostVersion, VersionNumber};

const METRIC_VIEW_RECORD_FAILED: &str = "inkpost_view_record_failed_total";
const FALLBACK_STYLE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    Cache,
    Store,
}

#[derive(Debug, Clone)]
pub struct ServedPost {
    pub html: String,
    pub source: ServeSource,
}

/// An active version with its recorded views, as listed on a profile page.
#[derive(Debug, Clone)]
pub struct ActivePost {
    pub version: PostVersion,
    pub views: Vec<OffsetDateTime>,
}

#[derive(Clone)]
pub struct Reader {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
    content: Arc<dyn ContentStore>,
    profiles: Arc<dyn ProfileDirectory>,
    templates: Arc<dyn TemplateEngine>,
    cache: CacheHandle,
    record_views_on_hit: bool,
}

impl Reader {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        analytics: Arc<dyn AnalyticsStore>,
        content: Arc<dyn ContentStore>,
        profiles: Arc<dyn ProfileDirectory>,
        templates: Arc<dyn TemplateEngine>,
        cache: CacheHandle,
    ) -> Self {
        Self {
            versions,
            analytics,
            content,
            profiles,
            templates,
            cache,
            record_views_on_hit: true,
        }
    }

    pub fn with_record_views_on_hit(mut self, enabled: bool) -> Self {
        self.record_views_on_hit = enabled;
        self
    }

    /// Serves `/{owner}/{title}` and records one view against the version
    /// active at the time of the view.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn serve(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<ServedPost, PostError> {
        let key = CacheKey::Endpoint(Endpoint::for_post(owner, title));

        if let Some(html) = self.cache.lookup(ctx, &key).await {
            debug!(cache_key = %key, "Serving endpoint from cache");
            if self.record_views_on_hit {
                self.record_current_view(ctx, owner, title).await;
            }
            return Ok(ServedPost {
                html,
                source: ServeSource::Cache,
            });
        }

        let version = self
            .current_version(ctx, owner, title)
            .await?
            .ok_or_else(|| PostError::not_found("post"))?;
        let html = self.render(ctx, &version).await?;
        self.cache.store(ctx, &key, &html).await;

        self.record_view(ctx, &version).await;
        Ok(ServedPost {
            html,
            source: ServeSource::Store,
        })
    }

    /// Every active post of an owner with its view timestamps, newest first.
    pub async fn owner_active_posts(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
    ) -> Result<Vec<ActivePost>, PostError> {
        let records = ctx
            .run(
                "versions.list_active",
                self.versions.list_active_versions(owner),
            )
            .await??;

        let mut posts = Vec::with_capacity(records.len());
        for record in records {
            let version = PostVersion::from_record(record)?;
            let views = ctx
                .run(
                    "analytics.get",
                    self.analytics
                        .get_post_analytics(owner, &version.title, version.version),
                )
                .await??
                .map(|analytics| analytics.views)
                .unwrap_or_default();
            posts.push(ActivePost { version, views });
        }
        Ok(posts)
    }

    /// Markdown source of one version, readable by its owner only.
    pub async fn markdown_source(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        title: &PostTitle,
        version: &str,
    ) -> Result<String, PostError> {
        ensure_owner(requester, owner)?;
        let version =
            VersionNumber::parse(version).map_err(|_| PostError::not_found("post version"))?;

        let records = ctx
            .run("versions.fetch", self.versions.fetch_versions(owner, title))
            .await??;
        if !records
            .iter()
            .any(|record| VersionNumber::parse(&record.version).is_ok_and(|v| v == version))
        {
            return Err(PostError::not_found("post version"));
        }

        let key = ContentKey::markdown(owner, title, version);
        let bytes = ctx
            .run("content.get", self.content.get(key.as_str()))
            .await??;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn current_version(
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

    async fn render(&self, ctx: &RequestContext, version: &PostVersion) -> Result<String, PostError> {
        let body = ctx
            .run("content.get", self.content.get(&version.content_ref))
            .await??;
        let body = String::from_utf8_lossy(&body);

        let profile = self.profile_or_default(ctx, &version.owner).await;
        let style = profile.style.as_deref().unwrap_or(FALLBACK_STYLE);
        let display_name = profile
            .display_name
            .as_deref()
            .unwrap_or(version.owner.as_str());

        Ok(self.templates.apply(
            &body,
            &TemplateContext {
                style,
                owner: version.owner.as_str(),
                display_name,
                date: version.created_at,
            },
        ))
    }

    /// Profile data only decorates the page; a directory failure falls back
    /// to defaults.
    async fn profile_or_default(&self, ctx: &RequestContext, owner: &Owner) -> ProfileRecord {
        match ctx.run("profiles.get", self.profiles.profile(owner)).await {
            Ok(Ok(Some(profile))) => profile,
            Ok(Ok(None)) => ProfileRecord::default(),
            Ok(Err(err)) => {
                warn!(%owner, error = %err, "Profile lookup failed; using defaults");
                ProfileRecord::default()
            }
            Err(err) => {
                warn!(%owner, error = %err, "Profile lookup timed out; using defaults");
                ProfileRecord::default()
            }
        }
    }

    async fn record_current_view(&self, ctx: &RequestContext, owner: &Owner, title: &PostTitle) {
        match self.current_version(ctx, owner, title).await {
            Ok(Some(version)) => self.record_view(ctx, &version).await,
            Ok(None) => debug!(%owner, %title, "Cached endpoint has no active version"),
            Err(err) => {
                warn!(%owner, %title, error = %err, "Could not resolve version for view");
                counter!(METRIC_VIEW_RECORD_FAILED).increment(1);
            }
        }
    }

    async fn record_view(&self, ctx: &RequestContext, version: &PostVersion) {
        let outcome = ctx
            .run(
                "analytics.record_view",
                self.analytics.record_view(
                    &version.owner,
                    &version.title,
                    version.version,
                    OffsetDateTime::now_utc(),
                ),
            )
            .await;
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        warn!(
            owner = %version.owner,
            title = %version.title,
            version = %version.version,
            error = failure,
            "Failed to record view"
        );
        counter!(METRIC_VIEW_RECORD_FAILED).increment(1);
    }
}
