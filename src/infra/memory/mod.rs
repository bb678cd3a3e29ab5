//! In-process adapters for every store trait.
//!
//! Used for single-instance deployments and as the backing of the
//! integration tests; semantics match the Postgres adapters.

mod analytics;
mod content;
mod profiles;
mod versions;

pub use analytics::MemoryAnalyticsStore;
pub use content::MemoryContentStore;
pub use profiles::MemoryProfiles;
pub use versions::MemoryVersionStore;
