use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::application::content::{ContentError, ContentStore};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory::content";

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.objects, SOURCE, "contains").contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        rw_read(&self.objects, SOURCE, "content_type")
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn len(&self) -> usize {
        rw_read(&self.objects, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, ContentError> {
        if key.is_empty() {
            return Err(ContentError::InvalidKey {
                key: key.to_string(),
            });
        }
        rw_write(&self.objects, SOURCE, "put")
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ContentError> {
        rw_read(&self.objects, SOURCE, "get")
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ContentError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), ContentError> {
        rw_write(&self.objects, SOURCE, "delete").remove(key);
        Ok(())
    }
}
