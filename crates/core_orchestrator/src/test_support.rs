use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use core_types::{Card, CardField, CardId, CardPatch, CardStore, Clock, StoreError};
use parking_lot::Mutex;

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Wraps a store, counting calls and optionally failing every one of them.
pub struct CountingStore {
    inner: Arc<dyn CardStore>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn CardStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_calls(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CardStore for CountingStore {
    async fn insert(&self, card: &Card) -> Result<CardId, StoreError> {
        self.enter()?;
        self.inner.insert(card).await
    }

    async fn update(&self, id: CardId, patch: &CardPatch) -> Result<(), StoreError> {
        self.enter()?;
        self.inner.update(id, patch).await
    }

    async fn get(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        self.enter()?;
        self.inner.get(id).await
    }

    async fn find_first(
        &self,
        field: CardField,
        value: &str,
    ) -> Result<Option<Card>, StoreError> {
        self.enter()?;
        self.inner.find_first(field, value).await
    }

    async fn list_all(&self) -> Result<Vec<Card>, StoreError> {
        self.enter()?;
        self.inner.list_all().await
    }

    async fn delete(&self, id: CardId) -> Result<(), StoreError> {
        self.enter()?;
        self.inner.delete(id).await
    }
}

/// Store that never leaves the calling task, so it behaves under a paused
/// tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Card>>,
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn insert(&self, card: &Card) -> Result<CardId, StoreError> {
        let mut rows = self.rows.lock();
        let id = rows.iter().filter_map(|c| c.id).max().unwrap_or(0) + 1;
        let mut stored = card.clone();
        stored.id = Some(id);
        rows.push(stored);
        Ok(id)
    }

    async fn update(&self, id: CardId, patch: &CardPatch) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let card = rows
            .iter_mut()
            .find(|c| c.id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        patch.apply(card);
        Ok(())
    }

    async fn get(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        Ok(self.rows.lock().iter().find(|c| c.id == Some(id)).cloned())
    }

    async fn find_first(
        &self,
        field: CardField,
        value: &str,
    ) -> Result<Option<Card>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|c| match field {
                CardField::Title => c.title == value,
                CardField::Content => c.content == value,
            })
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Card>, StoreError> {
        let mut rows = self.rows.lock().clone();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete(&self, id: CardId) -> Result<(), StoreError> {
        self.rows.lock().retain(|c| c.id != Some(id));
        Ok(())
    }
}

/// Delays every write by a fixed amount on the tokio clock.
pub struct SlowStore {
    inner: Arc<dyn CardStore>,
    delay: StdDuration,
}

impl SlowStore {
    pub fn new(inner: Arc<dyn CardStore>, delay: StdDuration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl CardStore for SlowStore {
    async fn insert(&self, card: &Card) -> Result<CardId, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(card).await
    }

    async fn update(&self, id: CardId, patch: &CardPatch) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(id, patch).await
    }

    async fn get(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        self.inner.get(id).await
    }

    async fn find_first(
        &self,
        field: CardField,
        value: &str,
    ) -> Result<Option<Card>, StoreError> {
        self.inner.find_first(field, value).await
    }

    async fn list_all(&self) -> Result<Vec<Card>, StoreError> {
        self.inner.list_all().await
    }

    async fn delete(&self, id: CardId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}
