//! Builds a running [`PostEngine`] from loaded settings.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::application::context::RequestContext;
use crate::application::engine::{EngineDeps, EngineOptions, PostEngine};
use crate::application::repos::{
    AnalyticsStore, ProfileDirectory, SplitTitleRemoval, TitleRemoval, VersionStore,
};
use crate::cache::{CacheConfig, CacheHandle, build_cache};
use crate::config::Settings;

use super::content::FsContentStore;
use super::db::PostgresRepositories;
use super::error::InfraError;
use super::memory::{MemoryAnalyticsStore, MemoryProfiles, MemoryVersionStore};
use super::render::{ComrakRenderer, StyledTemplate};

/// An assembled engine plus the per-request deadline it runs under.
#[derive(Clone)]
pub struct Platform {
    pub engine: PostEngine,
    request_timeout: Duration,
}

impl Platform {
    /// A fresh context carrying the configured request deadline.
    pub fn request(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }
}

struct Stores {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
    removal: Arc<dyn TitleRemoval>,
    profiles: Arc<dyn ProfileDirectory>,
}

/// Connects the configured backends. Without a database URL the in-memory
/// stores are used.
pub async fn build_platform(settings: &Settings) -> Result<Platform, InfraError> {
    let stores = match settings.database.url.as_deref() {
        Some(url) => {
            let pool =
                PostgresRepositories::connect(url, settings.database.max_connections.get()).await?;
            PostgresRepositories::run_migrations(&pool).await?;
            let repositories = Arc::new(PostgresRepositories::new(pool));
            repositories.health_check().await?;
            info!(max_connections = settings.database.max_connections.get(), "Connected to Postgres");
            Stores {
                versions: repositories.clone(),
                analytics: repositories.clone(),
                removal: repositories.clone(),
                profiles: repositories,
            }
        }
        None => {
            info!("No database configured; using in-memory stores");
            let versions: Arc<dyn VersionStore> = Arc::new(MemoryVersionStore::new());
            let analytics: Arc<dyn AnalyticsStore> = Arc::new(MemoryAnalyticsStore::new());
            Stores {
                removal: Arc::new(SplitTitleRemoval::new(versions.clone(), analytics.clone())),
                versions,
                analytics,
                profiles: Arc::new(MemoryProfiles::new()),
            }
        }
    };

    let content = FsContentStore::new(settings.content.root.clone())?;
    info!(root = %content.root().display(), "Content store ready");

    let cache = build_cache(&CacheConfig::from(&settings.cache)).await;

    let engine = PostEngine::new(
        EngineDeps {
            versions: stores.versions,
            analytics: stores.analytics,
            removal: stores.removal,
            content: Arc::new(content),
            profiles: stores.profiles,
            renderer: Arc::new(ComrakRenderer::new()),
            templates: Arc::new(StyledTemplate),
            cache: CacheHandle::new(cache),
        },
        EngineOptions {
            record_views_on_cache_hit: settings.reader.record_views_on_cache_hit,
            analytics_retry_attempts: settings.ingest.analytics_retry_attempts.get(),
        },
    );

    Ok(Platform {
        engine,
        request_timeout: settings.reader.request_timeout,
    })
}
