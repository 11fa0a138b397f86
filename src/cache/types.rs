use rkyv::{Archive, Deserialize, Serialize};

use super::key::CacheKey;

pub const GROVE_CACHE_HEADER: &str = "X-Grove-Cache";
pub const GROVE_STATUS_READY: &str = "ready";
pub const GROVE_STATUS_NOT_READY: &str = "not_ready";
pub const GROVE_STATUS_CLOSED: &str = "closed";

/// Immutable cached score.
///
/// Stored as `rkyv` bytes inside snapshots.
#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct CacheEntry {
    /// Full cache key (`namespace:extract:digest`).
    pub key: String,
    /// Divergence score.
    pub value: f64,
    /// Unix timestamp (milliseconds) when the score was computed.
    pub created_at: i64,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(key: &CacheKey, value: f64) -> Self {
        Self {
            key: key.as_str().to_string(),
            value,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Milliseconds elapsed since the entry was created (saturating at 0).
    pub fn age_millis(&self, now_millis: i64) -> u64 {
        now_millis.saturating_sub(self.created_at).max(0) as u64
    }
}

/// How a successful lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// Stored entry returned without computing.
    Hit,
    /// This caller led the computation.
    Miss,
    /// This caller joined another caller's in-flight computation.
    Coalesced,
}

impl CacheStatus {
    #[inline]
    pub fn as_header_value(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Coalesced => "COALESCED",
        }
    }

    #[inline]
    pub fn computed_here(&self) -> bool {
        matches!(self, CacheStatus::Miss)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_header_value())
    }
}

/// Score plus how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup {
    pub value: f64,
    pub status: CacheStatus,
}
