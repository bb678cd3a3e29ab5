//! Creation of new post versions.
//!
//! A new version is numbered, committed as the active version of its title,
//! given an empty analytics record and finally evicted from the endpoint
//! cache. The title lock spans numbering through analytics creation so two
//! ingests of one title never race for the same number.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::content::{ContentStore, Renderer};
use super::context::RequestContext;
use super::ensure_owner;
use super::error::PostError;
use super::locks::TitleLocks;
use super::repos::{AnalyticsStore, NewVersion, RepoError, VersionStore};
use crate::cache::{CacheHandle, CacheKey};
use crate::domain::posts::{
    ContentKey, Endpoint, Owner, PostTitle, PostVersion, VersionNumber, next_version,
};

const METRIC_ANALYTICS_RETRY: &str = "inkpost_analytics_create_retry_total";

pub const DEFAULT_ANALYTICS_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Clone)]
pub struct Ingestor {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
    content: Arc<dyn ContentStore>,
    renderer: Arc<dyn Renderer>,
    cache: CacheHandle,
    locks: TitleLocks,
    analytics_retry_attempts: u32,
}

impl Ingestor {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        analytics: Arc<dyn AnalyticsStore>,
        content: Arc<dyn ContentStore>,
        renderer: Arc<dyn Renderer>,
        cache: CacheHandle,
        locks: TitleLocks,
    ) -> Self {
        Self {
            versions,
            analytics,
            content,
            renderer,
            cache,
            locks,
            analytics_retry_attempts: DEFAULT_ANALYTICS_RETRY_ATTEMPTS,
        }
    }

    /// Total attempts at creating the analytics record; at least one.
    pub fn with_analytics_retry_attempts(mut self, attempts: u32) -> Self {
        self.analytics_retry_attempts = attempts.max(1);
        self
    }

    /// Registers `content_ref` as the next version of the title and makes it
    /// the active one.
    #[instrument(skip(self, ctx, content_ref), fields(request_id = %ctx.request_id()))]
    pub async fn create_version(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        raw_title: &str,
        content_ref: String,
    ) -> Result<PostVersion, PostError> {
        ensure_owner(requester, owner)?;
        let title = PostTitle::parse(raw_title)?;

        let _guard = self.locks.acquire(owner, &title).await;
        let version = self.next_number(ctx, owner, &title).await?;
        self.commit(ctx, owner, &title, version, content_ref).await
    }

    /// Renders `markdown`, stores the HTML and the source as content objects
    /// and commits them as the next active version.
    #[instrument(skip(self, ctx, markdown), fields(request_id = %ctx.request_id()))]
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        requester: &str,
        owner: &Owner,
        raw_title: &str,
        markdown: &str,
    ) -> Result<PostVersion, PostError> {
        ensure_owner(requester, owner)?;
        let title = PostTitle::parse(raw_title)?;
        let html = self.renderer.convert(markdown)?;

        let _guard = self.locks.acquire(owner, &title).await;
        let version = self.next_number(ctx, owner, &title).await?;

        let html_key = ContentKey::html(owner, &title, version);
        let markdown_key = ContentKey::markdown(owner, &title, version);
        let mut uploaded = Vec::with_capacity(2);
        for (key, body) in [
            (&html_key, Bytes::from(html)),
            (&markdown_key, Bytes::copy_from_slice(markdown.as_bytes())),
        ] {
            let stored = ctx
                .run(
                    "content.put",
                    self.content.put(key.as_str(), body, key.kind().content_type()),
                )
                .await
                .map_err(PostError::from)
                .and_then(|result| result.map_err(PostError::from));
            match stored {
                Ok(locator) => {
                    debug!(key = %key, locator, "Stored content object");
                    uploaded.push(key.as_str());
                }
                Err(err) => {
                    self.discard_objects(ctx, &uploaded).await;
                    return Err(err);
                }
            }
        }

        let committed = self
            .commit(ctx, owner, &title, version, html_key.to_string())
            .await;
        if let Err(err) = &committed
            && !matches!(err, PostError::PartiallyApplied { .. })
        {
            self.discard_objects(ctx, &uploaded).await;
        }
        committed
    }

    async fn next_number(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<VersionNumber, PostError> {
        let existing = ctx
            .run("versions.fetch", self.versions.fetch_versions(owner, title))
            .await??;
        let version = next_version(existing.iter().map(|record| record.version.as_str()))
            .inspect_err(|err| {
                warn!(%owner, %title, error = %err, "Refusing to number a title with a malformed version");
            })?;
        Ok(version)
    }

    async fn commit(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        content_ref: String,
    ) -> Result<PostVersion, PostError> {
        let created_at = OffsetDateTime::now_utc();
        let record = ctx
            .run(
                "versions.insert_active",
                self.versions.insert_active_version(NewVersion {
                    owner: owner.clone(),
                    title: title.clone(),
                    version,
                    created_at,
                    content_ref,
                }),
            )
            .await??;

        let analytics = self
            .create_analytics(ctx, owner, title, version, created_at)
            .await;

        let endpoint = Endpoint::for_post(owner, title);
        self.cache
            .invalidate(ctx, &CacheKey::Endpoint(endpoint.clone()))
            .await;

        if let Err(source) = analytics {
            warn!(
                %endpoint,
                %version,
                error = %source,
                "Version committed without an analytics record"
            );
            return Err(PostError::PartiallyApplied {
                version: version.to_string(),
                source,
            });
        }

        info!(%endpoint, %version, "Created post version");
        Ok(PostVersion::from_record(record)?)
    }

    async fn create_analytics(
        &self,
        ctx: &RequestContext,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        created_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut attempt = 1;
        loop {
            let outcome = ctx
                .run(
                    "analytics.create",
                    self.analytics
                        .create_post_analytics(owner, title, version, created_at),
                )
                .await;
            let err = match outcome {
                Ok(Ok(())) | Ok(Err(RepoError::Duplicate { .. })) => return Ok(()),
                Ok(Err(err)) => err,
                Err(_) => return Err(RepoError::Timeout),
            };

            if attempt >= self.analytics_retry_attempts {
                return Err(err);
            }
            counter!(METRIC_ANALYTICS_RETRY).increment(1);
            debug!(attempt, error = %err, "Retrying analytics creation");
            if ctx
                .run("analytics.backoff", tokio::time::sleep(RETRY_BACKOFF * attempt))
                .await
                .is_err()
            {
                return Err(err);
            }
            attempt += 1;
        }
    }

    async fn discard_objects(&self, ctx: &RequestContext, keys: &[&str]) {
        for key in keys {
            match ctx.run("content.delete", self.content.delete(key)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(key, error = %err, "Failed to discard content object"),
                Err(err) => warn!(key, error = %err, "Content cleanup timed out"),
            }
        }
    }
}
