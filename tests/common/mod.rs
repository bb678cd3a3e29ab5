#![allow(dead_code)]

use std::sync::Arc;

use inkpost::application::engine::{EngineDeps, EngineOptions, PostEngine};
use inkpost::application::repos::SplitTitleRemoval;
use inkpost::cache::{CacheConfig, CacheHandle, MemoryCache};
use inkpost::domain::posts::{Owner, PostTitle};
use inkpost::infra::memory::{
    MemoryAnalyticsStore, MemoryContentStore, MemoryProfiles, MemoryVersionStore,
};
use inkpost::infra::render::{ComrakRenderer, StyledTemplate};

pub struct Harness {
    pub engine: PostEngine,
    pub versions: Arc<MemoryVersionStore>,
    pub analytics: Arc<MemoryAnalyticsStore>,
    pub content: Arc<MemoryContentStore>,
    pub profiles: Arc<MemoryProfiles>,
    pub cache: Option<Arc<MemoryCache>>,
}

pub fn harness() -> Harness {
    build(true)
}

pub fn harness_without_cache() -> Harness {
    build(false)
}

fn build(cache_enabled: bool) -> Harness {
    let versions = Arc::new(MemoryVersionStore::new());
    let analytics = Arc::new(MemoryAnalyticsStore::new());
    let content = Arc::new(MemoryContentStore::new());
    let profiles = Arc::new(MemoryProfiles::new());
    let cache = cache_enabled.then(|| Arc::new(MemoryCache::new(&CacheConfig::default())));
    let handle = match &cache {
        Some(cache) => CacheHandle::new(cache.clone()),
        None => CacheHandle::disabled(),
    };

    let engine = PostEngine::new(
        EngineDeps {
            versions: versions.clone(),
            analytics: analytics.clone(),
            removal: Arc::new(SplitTitleRemoval::new(versions.clone(), analytics.clone())),
            content: content.clone(),
            profiles: profiles.clone(),
            renderer: Arc::new(ComrakRenderer::new()),
            templates: Arc::new(StyledTemplate),
            cache: handle,
        },
        EngineOptions::default(),
    );

    Harness {
        engine,
        versions,
        analytics,
        content,
        profiles,
        cache,
    }
}

pub fn owner(name: &str) -> Owner {
    Owner::new(name).expect("valid owner")
}

pub fn title(raw: &str) -> PostTitle {
    PostTitle::parse(raw).expect("valid title")
}
