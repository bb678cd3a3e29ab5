//! Cache key definitions.

use std::fmt;

use crate::domain::posts::Endpoint;

const DISCOVER_NEW: &str = "discover:new";
const DISCOVER_TOP: &str = "discover:top";

/// Entries held by the shared cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Rendered HTML of a post's active version, keyed by its endpoint path.
    Endpoint(Endpoint),
    /// Serialized newest-posts leaderboard.
    DiscoverNew,
    /// Serialized most-viewed leaderboard.
    DiscoverTop,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Endpoint(endpoint) => endpoint.as_str(),
            Self::DiscoverNew => DISCOVER_NEW,
            Self::DiscoverTop => DISCOVER_TOP,
        }
    }

    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Endpoint(_) => "endpoint",
            Self::DiscoverNew | Self::DiscoverTop => "leaderboard",
        }
    }
}

impl From<Endpoint> for CacheKey {
    fn from(endpoint: Endpoint) -> Self {
        Self::Endpoint(endpoint)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
