use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{AnalyticsStore, RepoError};
use crate::domain::analytics::rank_most_viewed;
use crate::domain::entities::{AnalyticsRecord, ViewedPostRecord};
use crate::domain::posts::{Owner, PostTitle, VersionNumber};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory::analytics";

type VersionKey = (String, String, String);

#[derive(Debug, Default)]
pub struct MemoryAnalyticsStore {
    records: RwLock<BTreeMap<VersionKey, AnalyticsRecord>>,
}

impl MemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all posts.
    pub fn len(&self) -> usize {
        rw_read(&self.records, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(owner: &Owner, title: &PostTitle, version: VersionNumber) -> VersionKey {
        (
            owner.as_str().to_string(),
            title.as_str().to_string(),
            version.to_string(),
        )
    }
}

#[async_trait]
impl AnalyticsStore for MemoryAnalyticsStore {
    async fn create_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        created_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let key = Self::key(owner, title, version);
        let mut records = rw_write(&self.records, SOURCE, "create_post_analytics");
        if records.contains_key(&key) {
            return Err(RepoError::Duplicate {
                constraint: "post_analytics_pkey".to_string(),
            });
        }
        let record = AnalyticsRecord::empty(key.0.clone(), key.1.clone(), key.2.clone(), created_at);
        records.insert(key, record);
        Ok(())
    }

    async fn record_view(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        rw_write(&self.records, SOURCE, "record_view")
            .get_mut(&Self::key(owner, title, version))
            .ok_or(RepoError::NotFound)?
            .views
            .push(at);
        Ok(())
    }

    async fn toggle_like(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        liker: &str,
    ) -> Result<bool, RepoError> {
        let mut records = rw_write(&self.records, SOURCE, "toggle_like");
        let record = records
            .get_mut(&Self::key(owner, title, version))
            .ok_or(RepoError::NotFound)?;
        if record.likers.insert(liker.to_string()) {
            Ok(true)
        } else {
            record.likers.remove(liker);
            Ok(false)
        }
    }

    async fn get_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<Option<AnalyticsRecord>, RepoError> {
        Ok(rw_read(&self.records, SOURCE, "get_post_analytics")
            .get(&Self::key(owner, title, version))
            .cloned())
    }

    async fn view_count(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<u64, RepoError> {
        rw_read(&self.records, SOURCE, "view_count")
            .get(&Self::key(owner, title, version))
            .map(AnalyticsRecord::view_count)
            .ok_or(RepoError::NotFound)
    }

    async fn most_viewed(&self, limit: usize) -> Result<Vec<ViewedPostRecord>, RepoError> {
        let viewed = rw_read(&self.records, SOURCE, "most_viewed")
            .values()
            .map(|record| ViewedPostRecord {
                owner: record.owner.clone(),
                title: record.title.clone(),
                version: record.version.clone(),
                created_at: record.created_at,
                view_count: record.view_count(),
            })
            .collect();
        Ok(rank_most_viewed(viewed, limit))
    }

    async fn delete_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<u64, RepoError> {
        let mut records = rw_write(&self.records, SOURCE, "delete_post_analytics");
        let before = records.len();
        records.retain(|(stored_owner, stored_title, _), _| {
            stored_owner != owner.as_str() || stored_title != title.as_str()
        });
        Ok((before - records.len()) as u64)
    }
}
