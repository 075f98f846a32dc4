//! Mark store abstraction.
//!
//! A [`MarkStore`] persists [`MarkDocument`]s and supports exactly the three
//! operations the accounting tiers need: point reads, atomic
//! increment-and-set of one or more marks under a single `(endpoint, tag)`,
//! and whole-document loads.
//!
//! Implementations must make [`MarkStore::apply_updates`] all-or-nothing: a
//! failed or interrupted call leaves every addressed mark at its prior value.

use crate::endpoint::EndpointId;
use crate::error::Result;
use crate::mark::{Direction, DocumentKey, MarkDocument, MarkUpdate, Tag, TagMark};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

/// Largest total any backend accepts. Redis keeps totals as signed 64-bit
/// integers.
pub const MAX_TOTAL: u64 = i64::MAX as u64;

/// Persistence backend for accounting documents.
#[async_trait]
pub trait MarkStore: Send + Sync {
    /// Returns a short backend name for logging.
    fn backend(&self) -> &'static str;

    /// Reads one mark. Absent documents, endpoints and tags read as zero.
    async fn read_mark(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark>;

    /// Atomically adds each update's delta to its total and replaces its
    /// last raw mark. Creates missing levels on first write.
    async fn apply_updates(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        updates: &[MarkUpdate],
    ) -> Result<()>;

    /// Loads a whole document. Returns `None` if it has never been written.
    async fn load_document(&self, document: &DocumentKey) -> Result<Option<MarkDocument>>;
}
