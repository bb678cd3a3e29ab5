//! Engagement aggregates derived from analytics records.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::entities::{AnalyticsRecord, ViewedPostRecord};

/// Public counters shown next to a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub views: u64,
    pub likes: u64,
}

impl From<&AnalyticsRecord> for EngagementSummary {
    fn from(record: &AnalyticsRecord) -> Self {
        Self {
            views: record.view_count(),
            likes: record.like_count(),
        }
    }
}

/// Most-viewed ordering: view count descending, earlier creation first on ties.
pub fn most_viewed_order(left: &ViewedPostRecord, right: &ViewedPostRecord) -> Ordering {
    right
        .view_count
        .cmp(&left.view_count)
        .then_with(|| left.created_at.cmp(&right.created_at))
}

/// Sorts by [`most_viewed_order`] and keeps the first `limit` entries.
pub fn rank_most_viewed(mut records: Vec<ViewedPostRecord>, limit: usize) -> Vec<ViewedPostRecord> {
    records.sort_by(most_viewed_order);
    records.truncate(limit);
    records
}
