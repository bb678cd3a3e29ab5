//! Post lifecycle services.

pub mod aggregator;
pub mod analytics;
pub mod content;
pub mod context;
pub mod engine;
pub mod error;
pub mod ingestor;
pub mod locks;
pub mod publisher;
pub mod reader;
pub mod repos;

use crate::domain::posts::Owner;
use error::PostError;

/// Rejects any mutation requested by someone other than the owner.
pub(crate) fn ensure_owner(requester: &str, owner: &Owner) -> Result<(), PostError> {
    if requester != owner.as_str() {
        return Err(PostError::unauthorized(requester, owner.as_str()));
    }
    Ok(())
}
