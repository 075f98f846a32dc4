//! In-memory mark store.
//!
//! Backs unit and scenario tests and embedders that do not need persistence.
//! Supports failure and latency injection so callers can exercise their
//! store-unavailable paths.

use super::{MarkStore, MAX_TOTAL};
use crate::endpoint::EndpointId;
use crate::error::{AccountingError, Result};
use crate::mark::{Direction, DocumentKey, FieldPath, MarkDocument, MarkUpdate, Tag, TagMark};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Mark store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryMarkStore {
    documents: Mutex<HashMap<DocumentKey, MarkDocument>>,
    /// Number of upcoming operations that will fail.
    pending_failures: AtomicUsize,
    /// Artificial delay applied before every operation.
    latency: Mutex<Option<Duration>>,
    /// Successful `apply_updates` calls.
    writes: AtomicU64,
}

impl MemoryMarkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with `StoreUnavailable`.
    pub fn inject_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Returns the number of committed `apply_updates` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns a copy of a stored document.
    pub fn snapshot(&self, document: &DocumentKey) -> Option<MarkDocument> {
        self.documents.lock().get(document).cloned()
    }

    /// Overwrites a stored mark without any checks.
    pub fn seed(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
        mark: TagMark,
    ) {
        let mut documents = self.documents.lock();
        let doc = documents
            .entry(document.clone())
            .or_insert_with(|| MarkDocument::new(document.clone()));
        *doc.endpoints
            .entry(endpoint.clone())
            .or_default()
            .tags
            .entry(tag.clone())
            .or_default()
            .mark_mut(direction) = mark;
    }

    async fn before_operation(&self, operation: &str) -> Result<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AccountingError::store_unavailable(
                operation,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MarkStore for MemoryMarkStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn read_mark(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        direction: Direction,
    ) -> Result<TagMark> {
        self.before_operation("read_mark").await?;
        let documents = self.documents.lock();
        Ok(documents
            .get(document)
            .map(|doc| doc.mark(endpoint, tag, direction))
            .unwrap_or_default())
    }

    async fn apply_updates(
        &self,
        document: &DocumentKey,
        endpoint: &EndpointId,
        tag: &Tag,
        updates: &[MarkUpdate],
    ) -> Result<()> {
        self.before_operation("apply_updates").await?;
        let mut documents = self.documents.lock();

        // Validate every update before touching anything
        let current = documents
            .get(document)
            .and_then(|doc| doc.endpoints.get(endpoint))
            .and_then(|e| e.tags.get(tag))
            .copied()
            .unwrap_or_default();
        let mut next = current;
        for update in updates {
            let mark = next.mark_mut(update.direction);
            mark.total = mark
                .total
                .checked_add(update.delta)
                .filter(|total| *total <= MAX_TOTAL)
                .ok_or_else(|| {
                    AccountingError::overflow(
                    document.to_string(),
                        FieldPath::total(endpoint, tag, update.direction),
                    )
                })?;
            mark.last_raw_mark = update.new_raw_mark;
        }

        let doc = documents
            .entry(document.clone())
            .or_insert_with(|| MarkDocument::new(document.clone()));
        doc.endpoints
            .entry(endpoint.clone())
            .or_default()
            .tags
            .insert(tag.clone(), next);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_document(&self, document: &DocumentKey) -> Result<Option<MarkDocument>> {
        self.before_operation("load_document").await?;
        Ok(self.documents.lock().get(document).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> (MemoryMarkStore, DocumentKey, EndpointId, Tag) {
        (
            MemoryMarkStore::new(),
            DocumentKey::account("ns/pod"),
            EndpointId::from_stored("abc").unwrap(),
            Tag::new("80").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_absent_mark_reads_zero() {
        let (store, doc, ep, tag) = fixture();
        let mark = store.read_mark(&doc, &ep, &tag, Direction::Sent).await.unwrap();
        assert_eq!(mark, TagMark::default());
        assert!(store.load_document(&doc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_creates_and_accumulates() {
        let (store, doc, ep, tag) = fixture();

        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 1000, 1000)])
            .await
            .unwrap();
        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 500, 1500)])
            .await
            .unwrap();

        let mark = store.read_mark(&doc, &ep, &tag, Direction::Sent).await.unwrap();
        assert_eq!(mark, TagMark { total: 1500, last_raw_mark: 1500 });
        let recv = store.read_mark(&doc, &ep, &tag, Direction::Recv).await.unwrap();
        assert_eq!(recv, TagMark::default());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_replaying_zero_delta_is_idempotent() {
        let (store, doc, ep, tag) = fixture();
        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Recv, 700, 700)])
            .await
            .unwrap();

        for _ in 0..3 {
            store
                .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Recv, 0, 700)])
                .await
                .unwrap();
        }

        let mark = store.read_mark(&doc, &ep, &tag, Direction::Recv).await.unwrap();
        assert_eq!(mark, TagMark { total: 700, last_raw_mark: 700 });
    }

    #[tokio::test]
    async fn test_overflow_leaves_all_marks_untouched() {
        let (store, doc, ep, tag) = fixture();
        store.seed(&doc, &ep, &tag, Direction::Recv, TagMark { total: MAX_TOTAL - 1, last_raw_mark: 9 });

        let err = store
            .apply_updates(
                &doc,
                &ep,
                &tag,
                &[
                    MarkUpdate::new(Direction::Sent, 10, 10),
                    MarkUpdate::new(Direction::Recv, 5, 14),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Overflow { .. }));

        let sent = store.read_mark(&doc, &ep, &tag, Direction::Sent).await.unwrap();
        assert_eq!(sent, TagMark::default());
        let recv = store.read_mark(&doc, &ep, &tag, Direction::Recv).await.unwrap();
        assert_eq!(recv, TagMark { total: MAX_TOTAL - 1, last_raw_mark: 9 });
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_totals_bounded_like_redis() {
        let (store, doc, ep, tag) = fixture();

        // A delta that does not fit HINCRBY is rejected outright
        let err = store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, MAX_TOTAL + 1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Overflow { .. }));
        assert_eq!(store.write_count(), 0);

        // Reaching the bound exactly is fine, one more byte is not
        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, MAX_TOTAL, 5)])
            .await
            .unwrap();
        let err = store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 1, 6)])
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Overflow { .. }));

        let mark = store.read_mark(&doc, &ep, &tag, Direction::Sent).await.unwrap();
        assert_eq!(mark, TagMark { total: MAX_TOTAL, last_raw_mark: 5 });
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (store, doc, ep, tag) = fixture();
        store.inject_failures(2);

        let err = store.read_mark(&doc, &ep, &tag, Direction::Sent).await.unwrap_err();
        assert!(err.is_retryable());
        let err = store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 1, 1)])
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Third call goes through
        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 1, 1)])
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_load_document_groups_by_endpoint_and_tag() {
        let (store, doc, ep, tag) = fixture();
        let other = EndpointId::from_stored("xyz").unwrap();
        let tag443 = Tag::new("443").unwrap();

        store
            .apply_updates(&doc, &ep, &tag, &[MarkUpdate::new(Direction::Sent, 10, 10)])
            .await
            .unwrap();
        store
            .apply_updates(&doc, &other, &tag443, &[MarkUpdate::new(Direction::Recv, 20, 20)])
            .await
            .unwrap();

        let loaded = store.load_document(&doc).await.unwrap().unwrap();
        assert_eq!(loaded.endpoints.len(), 2);
        assert_eq!(loaded.mark(&ep, &tag, Direction::Sent).total, 10);
        assert_eq!(loaded.mark(&other, &tag443, Direction::Recv).total, 20);
        assert_eq!(loaded.endpoints_with_tag(&tag).count(), 1);
    }
}
