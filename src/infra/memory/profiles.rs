use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::{ProfileDirectory, RepoError};
use crate::domain::entities::ProfileRecord;
use crate::domain::posts::Owner;
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory::profiles";

#[derive(Debug, Default)]
pub struct MemoryProfiles {
    profiles: RwLock<HashMap<String, ProfileRecord>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: ProfileRecord) {
        rw_write(&self.profiles, SOURCE, "insert").insert(profile.username.clone(), profile);
    }
}

#[async_trait]
impl ProfileDirectory for MemoryProfiles {
    async fn profile(&self, owner: &Owner) -> Result<Option<ProfileRecord>, RepoError> {
        Ok(rw_read(&self.profiles, SOURCE, "profile")
            .get(owner.as_str())
            .cloned())
    }

    async fn set_style(&self, owner: &Owner, style: &str) -> Result<(), RepoError> {
        rw_write(&self.profiles, SOURCE, "set_style")
            .entry(owner.as_str().to_string())
            .or_insert_with(|| ProfileRecord {
                username: owner.as_str().to_string(),
                ..ProfileRecord::default()
            })
            .style = Some(style.to_string());
        Ok(())
    }
}
