//! Cache Entry Types
//!
//! A stored value plus the bookkeeping its owning store needs for LRU and
//! TTL eviction.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Default time-to-live applied when a write carries no TTL (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Resolve a caller-supplied TTL against the store default.
///
/// `None` and zero both mean "use the default".
#[inline]
pub fn effective_ttl(ttl: Option<Duration>, default: Duration) -> Duration {
    match ttl {
        Some(ttl) if !ttl.is_zero() => ttl,
        _ => default,
    }
}

/// Longest lifetime an entry is given; larger TTLs are clamped to it (100 years)
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Expiry instant for a write made at `now`.
///
/// TTLs past [`MAX_TTL`] are clamped so the addition cannot overflow.
#[inline]
pub fn expiry_from(now: Instant, ttl: Option<Duration>, default: Duration) -> Instant {
    let ttl = effective_ttl(ttl, default).min(MAX_TTL);
    now.checked_add(ttl).unwrap_or(now)
}

/// A single cached value.
///
/// Owned by exactly one store (a shard or the hot tier). `heap_index` is the
/// entry's slot in that store's eviction heap and means nothing elsewhere.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) key: String,
    pub(crate) value: Bytes,
    pub(crate) expires_at: Instant,
    pub(crate) last_accessed: Instant,
    /// Store-local access sequence, breaks ties between equal instants
    pub(crate) access_seq: u64,
    pub(crate) heap_index: usize,
}

impl CacheEntry {
    pub(crate) fn new(
        key: String,
        value: Bytes,
        expires_at: Instant,
        now: Instant,
        access_seq: u64,
        heap_index: usize,
    ) -> Self {
        Self {
            key,
            value,
            expires_at,
            last_accessed: now,
            access_seq,
            heap_index,
        }
    }

    /// Entry key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored value
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Instant after which the entry reads as absent
    #[inline]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Instant of the last read or write
    #[inline]
    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// Position in the owning eviction heap
    #[inline]
    pub fn heap_index(&self) -> usize {
        self.heap_index
    }

    /// Check if expired at `now`
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// Approximate payload size in bytes
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }

    /// Heap ordering key: older access first, then lower sequence
    #[inline]
    pub(crate) fn recency(&self) -> (Instant, u64) {
        (self.last_accessed, self.access_seq)
    }
}
