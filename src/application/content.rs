//! Collaborators that produce and hold rendered post bodies.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content object `{key}` not found")]
    NotFound { key: String },
    #[error("invalid content key `{key}`")]
    InvalidKey { key: String },
    #[error("content store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("content store backend error: {0}")]
    Backend(String),
}

/// Blob storage for rendered HTML and markdown sources.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` under `key` and returns a locator for the object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, ContentError>;

    async fn get(&self, key: &str) -> Result<Bytes, ContentError>;

    /// Removes the object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), ContentError>;
}

#[derive(Debug, Error)]
#[error("markdown rendering failed: {message}")]
pub struct RenderError {
    pub message: String,
}

/// Markdown to HTML conversion.
pub trait Renderer: Send + Sync {
    fn convert(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Values a template can place around a post body.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub style: &'a str,
    pub owner: &'a str,
    pub display_name: &'a str,
    pub date: OffsetDateTime,
}

/// Wraps a rendered body in a named presentation style.
pub trait TemplateEngine: Send + Sync {
    fn apply(&self, html: &str, context: &TemplateContext<'_>) -> String;
}
