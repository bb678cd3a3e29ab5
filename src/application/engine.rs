//! Assembles every service around one set of stores.

use std::sync::Arc;

use super::aggregator::Aggregator;
use super::analytics::AnalyticsService;
use super::content::{ContentStore, Renderer, TemplateEngine};
use super::ingestor::{DEFAULT_ANALYTICS_RETRY_ATTEMPTS, Ingestor};
use super::locks::TitleLocks;
use super::publisher::Publisher;
use super::reader::Reader;
use super::repos::{AnalyticsStore, ProfileDirectory, TitleRemoval, VersionStore};
use crate::cache::CacheHandle;

/// Stores and collaborators shared by every service.
#[derive(Clone)]
pub struct EngineDeps {
    pub versions: Arc<dyn VersionStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
    /// Whole-title deletes; one transaction when both stores share a database.
    pub removal: Arc<dyn TitleRemoval>,
    pub content: Arc<dyn ContentStore>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub renderer: Arc<dyn Renderer>,
    pub templates: Arc<dyn TemplateEngine>,
    pub cache: CacheHandle,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub record_views_on_cache_hit: bool,
    pub analytics_retry_attempts: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            record_views_on_cache_hit: true,
            analytics_retry_attempts: DEFAULT_ANALYTICS_RETRY_ATTEMPTS,
        }
    }
}

/// The services of one deployment. Writers share a single [`TitleLocks`].
#[derive(Clone)]
pub struct PostEngine {
    pub publisher: Publisher,
    pub ingestor: Ingestor,
    pub reader: Reader,
    pub analytics: AnalyticsService,
    pub aggregator: Aggregator,
}

impl PostEngine {
    pub fn new(deps: EngineDeps, options: EngineOptions) -> Self {
        let locks = TitleLocks::new();

        let publisher = Publisher::new(
            deps.versions.clone(),
            deps.removal.clone(),
            deps.content.clone(),
            deps.profiles.clone(),
            deps.cache.clone(),
            locks.clone(),
        );
        let ingestor = Ingestor::new(
            deps.versions.clone(),
            deps.analytics.clone(),
            deps.content.clone(),
            deps.renderer.clone(),
            deps.cache.clone(),
            locks,
        )
        .with_analytics_retry_attempts(options.analytics_retry_attempts);
        let reader = Reader::new(
            deps.versions.clone(),
            deps.analytics.clone(),
            deps.content.clone(),
            deps.profiles.clone(),
            deps.templates.clone(),
            deps.cache.clone(),
        )
        .with_record_views_on_hit(options.record_views_on_cache_hit);
        let analytics = AnalyticsService::new(deps.versions.clone(), deps.analytics.clone());
        let aggregator = Aggregator::new(deps.versions, deps.analytics, deps.profiles, deps.cache);

        Self {
            publisher,
            ingestor,
            reader,
            analytics,
            aggregator,
        }
    }
}
