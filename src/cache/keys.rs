//! Cache key definitions.
//!
//! Keys live in a deployment-wide namespace: `story-<uuid>` and `chapter-<uuid>`.

use std::fmt;

use uuid::Uuid;

/// Identifies one cached aggregate read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Denormalized story view.
    Story(Uuid),
    /// Denormalized chapter view.
    Chapter(Uuid),
}

impl CacheKey {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Story(_) => "story",
            CacheKey::Chapter(_) => "chapter",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Story(id) => write!(f, "story-{id}"),
            CacheKey::Chapter(id) => write!(f, "chapter-{id}"),
        }
    }
}
