use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::{NewVersion, RepoError, VersionStore};
use crate::domain::entities::VersionRecord;
use crate::domain::posts::{Owner, PostTitle, VersionNumber};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory::versions";

type TitleKey = (String, String);

/// Version store held in process memory. Every mutation runs under one
/// write guard, so flag changes are atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    titles: RwLock<BTreeMap<TitleKey, Vec<VersionRecord>>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record verbatim, bypassing numbering and flag maintenance.
    pub fn seed(&self, record: VersionRecord) {
        let key = (record.owner.clone(), record.title.clone());
        rw_write(&self.titles, SOURCE, "seed")
            .entry(key)
            .or_default()
            .push(record);
    }

    fn key(owner: &Owner, title: &PostTitle) -> TitleKey {
        (owner.as_str().to_string(), title.as_str().to_string())
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn fetch_versions(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        Ok(rw_read(&self.titles, SOURCE, "fetch_versions")
            .get(&Self::key(owner, title))
            .cloned()
            .unwrap_or_default())
    }

    async fn active_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Option<VersionRecord>, RepoError> {
        Ok(rw_read(&self.titles, SOURCE, "active_version")
            .get(&Self::key(owner, title))
            .and_then(|versions| versions.iter().find(|record| record.is_active).cloned()))
    }

    async fn insert_active_version(&self, version: NewVersion) -> Result<VersionRecord, RepoError> {
        let mut titles = rw_write(&self.titles, SOURCE, "insert_active_version");
        let versions = titles
            .entry(Self::key(&version.owner, &version.title))
            .or_default();

        let number = version.version.to_string();
        if versions.iter().any(|record| record.version == number) {
            return Err(RepoError::Duplicate {
                constraint: "post_versions_pkey".to_string(),
            });
        }

        for record in versions.iter_mut() {
            record.is_active = false;
        }
        let record = VersionRecord {
            owner: version.owner.as_str().to_string(),
            title: version.title.as_str().to_string(),
            version: number,
            created_at: version.created_at,
            is_active: true,
            content_ref: version.content_ref,
        };
        versions.push(record.clone());
        Ok(record)
    }

    async fn activate_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<(), RepoError> {
        let mut titles = rw_write(&self.titles, SOURCE, "activate_version");
        let versions = titles
            .get_mut(&Self::key(owner, title))
            .ok_or(RepoError::NotFound)?;

        let number = version.to_string();
        if !versions.iter().any(|record| record.version == number) {
            return Err(RepoError::NotFound);
        }
        for record in versions.iter_mut() {
            record.is_active = record.version == number;
        }
        Ok(())
    }

    async fn delete_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        Ok(rw_write(&self.titles, SOURCE, "delete_title")
            .remove(&Self::key(owner, title))
            .unwrap_or_default())
    }

    async fn list_owner_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError> {
        Ok(rw_read(&self.titles, SOURCE, "list_owner_versions")
            .iter()
            .filter(|((stored_owner, _), _)| stored_owner == owner.as_str())
            .flat_map(|(_, versions)| versions.iter().cloned())
            .collect())
    }

    async fn list_active_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError> {
        let mut active: Vec<VersionRecord> = rw_read(&self.titles, SOURCE, "list_active_versions")
            .iter()
            .filter(|((stored_owner, _), _)| stored_owner == owner.as_str())
            .flat_map(|(_, versions)| versions.iter().filter(|r| r.is_active).cloned())
            .collect();
        active.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(active)
    }

    async fn newest_versions(&self, limit: usize) -> Result<Vec<VersionRecord>, RepoError> {
        let mut all: Vec<VersionRecord> = rw_read(&self.titles, SOURCE, "newest_versions")
            .values()
            .flat_map(|versions| versions.iter().cloned())
            .collect();
        all.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn is_active(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<bool, RepoError> {
        let number = version.to_string();
        Ok(rw_read(&self.titles, SOURCE, "is_active")
            .get(&Self::key(owner, title))
            .is_some_and(|versions| {
                versions
                    .iter()
                    .any(|record| record.version == number && record.is_active)
            }))
    }
}
