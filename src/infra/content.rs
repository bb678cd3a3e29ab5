//! Filesystem-backed content store for rendered HTML and markdown sources.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::content::{ContentError, ContentStore};

#[derive(Debug)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are flat file names; anything that could escape the root is refused.
    fn resolve(&self, key: &str) -> Result<PathBuf, ContentError> {
        let relative = Path::new(key);
        let mut components = relative.components();
        let valid = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !valid || key.contains(['/', '\\']) {
            return Err(ContentError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

/// Writes `bytes` to `staging` and moves it over `target`.
async fn write_staged(staging: &Path, bytes: &[u8], target: &Path) -> std::io::Result<()> {
    let mut file = fs::File::create(staging).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    fs::rename(staging, target).await
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, ContentError> {
        let absolute = self.resolve(key)?;
        let staging = self.root.join(format!(".{}.tmp", Uuid::new_v4()));

        if let Err(err) = write_staged(&staging, &bytes, &absolute).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }

        debug!(key, content_type, size = bytes.len(), "Stored content object");
        Ok(format!("file://{}", absolute.display()))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ContentError> {
        let absolute = self.resolve(key)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ContentError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(ContentError::Io(err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ContentError> {
        let absolute = self.resolve(key)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ContentError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsContentStore::new(dir.path().to_path_buf()).expect("store");

        let url = store
            .put("alice_Post_1.html", Bytes::from_static(b"<p>x</p>"), "text/html")
            .await
            .expect("put");
        assert!(url.starts_with("file://"));
        assert_eq!(
            store.get("alice_Post_1.html").await.expect("get"),
            Bytes::from_static(b"<p>x</p>")
        );

        store.delete("alice_Post_1.html").await.expect("delete");
        assert!(matches!(
            store.get("alice_Post_1.html").await,
            Err(ContentError::NotFound { .. })
        ));
        store.delete("alice_Post_1.html").await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn failed_put_leaves_no_staging_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsContentStore::new(dir.path().to_path_buf()).expect("store");
        // A non-empty directory at the target path makes the final rename fail.
        let blocked = dir.path().join("alice_Post_1.html");
        std::fs::create_dir(&blocked).expect("dir");
        std::fs::write(blocked.join("keep"), b"x").expect("file");

        let result = store
            .put("alice_Post_1.html", Bytes::from_static(b"<p>x</p>"), "text/html")
            .await;
        assert!(matches!(result, Err(ContentError::Io(_))));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "staging files left: {leftovers:?}");
    }

    #[tokio::test]
    async fn rejects_keys_outside_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsContentStore::new(dir.path().to_path_buf()).expect("store");

        for key in ["../escape.html", "/etc/passwd", "nested/key.md", ""] {
            assert!(
                matches!(store.get(key).await, Err(ContentError::InvalidKey { .. })),
                "accepted `{key}`"
            );
        }
    }
}
