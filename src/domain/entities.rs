//! Domain entities mirrored from persistent storage.

use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;

/// A version row as persisted. The version number stays a string here so a
/// malformed stored value surfaces where numbering is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub owner: String,
    pub title: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_active: bool,
    pub content_ref: String,
}

/// Per-version engagement: one timestamp per view and the set of likers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsRecord {
    pub owner: String,
    pub title: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub views: Vec<OffsetDateTime>,
    pub likers: BTreeSet<String>,
}

impl AnalyticsRecord {
    pub fn empty(
        owner: impl Into<String>,
        title: impl Into<String>,
        version: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            owner: owner.into(),
            title: title.into(),
            version: version.into(),
            created_at,
            views: Vec::new(),
            likers: BTreeSet::new(),
        }
    }

    pub fn view_count(&self) -> u64 {
        self.views.len() as u64
    }

    pub fn like_count(&self) -> u64 {
        self.likers.len() as u64
    }

    pub fn is_liked_by(&self, username: &str) -> bool {
        self.likers.contains(username)
    }
}

/// A version together with its total view count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewedPostRecord {
    pub owner: String,
    pub title: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub view_count: u64,
}

/// Presentation data about a user, owned by the external user directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    pub username: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub style: Option<String>,
}
