//! Decides what a debounced auto-save does with the store: nothing, redirect
//! the editing session onto an existing card, insert, update, or reject.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use core_types::{
    Card, CardField, CardId, CardPatch, CardStore, Clock, DEFAULT_GRADIENTS, StoreError,
    derive_title,
};
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// A stored card already has exactly this content. The session adopts its title.
    MatchingContent,
    /// A stored card already has the resolved title. The session adopts its title and content.
    MatchingTitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content was blank; no store call was made.
    Skipped,
    Redirected { card: Card, reason: RedirectReason },
    Created(Card),
    Updated(Card),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("a card titled `{title}` already exists (id {existing})")]
    DuplicateTitle { title: String, existing: CardId },
}

/// Title the save will persist: the trimmed title field, or one derived from
/// the content when the field is blank.
pub fn resolve_title(title: &str, content: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        derive_title(content)
    } else {
        trimmed.to_string()
    }
}

pub struct Reconciler {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    gradients: Vec<String>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>, gradients: Vec<String>) -> Self {
        Self {
            store,
            clock,
            gradients,
        }
    }

    /// `current` is the card the session is bound to, if it has been persisted.
    pub async fn reconcile(
        &self,
        title: &str,
        content: &str,
        current: Option<&Card>,
    ) -> Result<SaveOutcome, SaveError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(SaveOutcome::Skipped);
        }
        let final_title = resolve_title(title, content);

        match current.and_then(|card| card.id.map(|id| (id, card))) {
            Some((id, card)) => self.update_existing(id, card, final_title, content).await,
            None => self.insert_new(final_title, content).await,
        }
    }

    async fn insert_new(&self, title: String, content: &str) -> Result<SaveOutcome, SaveError> {
        if let Some(card) = self.store.find_first(CardField::Content, content).await? {
            info!(card_id = ?card.id, "content matches stored card, redirecting session");
            return Ok(SaveOutcome::Redirected {
                card,
                reason: RedirectReason::MatchingContent,
            });
        }

        if let Some(card) = self.store.find_first(CardField::Title, &title).await? {
            info!(card_id = ?card.id, title = %title, "title matches stored card, redirecting session");
            return Ok(SaveOutcome::Redirected {
                card,
                reason: RedirectReason::MatchingTitle,
            });
        }

        let mut card = Card::new(title, content, self.pick_gradient(), self.clock.now());
        let id = self.store.insert(&card).await?;
        card.id = Some(id);
        info!(card_id = id, title = %card.title, "card created");
        Ok(SaveOutcome::Created(card))
    }

    async fn update_existing(
        &self,
        id: CardId,
        current: &Card,
        title: String,
        content: &str,
    ) -> Result<SaveOutcome, SaveError> {
        if let Some(existing) = self.store.find_first(CardField::Title, &title).await? {
            if let Some(existing_id) = existing.id.filter(|other| *other != id) {
                warn!(card_id = id, existing = existing_id, title = %title, "duplicate title rejected");
                return Err(SaveError::DuplicateTitle {
                    title,
                    existing: existing_id,
                });
            }
        }

        let patch = CardPatch {
            title: Some(title),
            content: Some(content.to_string()),
            updated_at: Some(self.next_updated_at(current.updated_at)),
        };
        self.store.update(id, &patch).await?;

        let mut card = current.clone();
        patch.apply(&mut card);
        debug!(card_id = id, "card updated");
        Ok(SaveOutcome::Updated(card))
    }

    /// Strictly later than `previous`, even when the clock is not.
    fn next_updated_at(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.clock.now();
        if now > previous {
            now
        } else {
            previous + TimeDelta::microseconds(1)
        }
    }

    fn pick_gradient(&self) -> String {
        let mut rng = rand::thread_rng();
        match self.gradients.choose(&mut rng) {
            Some(gradient) => gradient.clone(),
            None => DEFAULT_GRADIENTS
                .choose(&mut rng)
                .copied()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use storage_sqlite::SqliteCardStore;

    use super::*;
    use crate::test_support::{CountingStore, ManualClock};

    struct Fixture {
        store: Arc<CountingStore>,
        clock: Arc<ManualClock>,
        reconciler: Reconciler,
    }

    async fn fixture() -> Fixture {
        let sqlite = SqliteCardStore::in_memory().await.expect("storage");
        let store = Arc::new(CountingStore::new(Arc::new(sqlite)));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let reconciler = Reconciler::new(
            store.clone(),
            clock.clone(),
            vec!["g1".to_string(), "g2".to_string()],
        );
        Fixture {
            store,
            clock,
            reconciler,
        }
    }

    fn created(outcome: SaveOutcome) -> Card {
        match outcome {
            SaveOutcome::Created(card) => card,
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn resolves_title_from_field_or_content() {
        assert_eq!(resolve_title("  Notes  ", "body"), "Notes");
        assert_eq!(resolve_title("", "# Hello\n**World**"), "Hello");
        assert_eq!(resolve_title("   ", "**"), "Untitled");
    }

    #[tokio::test]
    async fn blank_content_makes_no_store_calls() {
        let fx = fixture().await;
        for content in ["", "   \n\t "] {
            let outcome = fx
                .reconciler
                .reconcile("A title", content, None)
                .await
                .expect("reconcile");
            assert_eq!(outcome, SaveOutcome::Skipped);
        }
        assert_eq!(fx.store.calls(), 0);
    }

    #[tokio::test]
    async fn new_session_inserts_then_updates_same_card() {
        let fx = fixture().await;
        let t1 = fx.clock.now();

        let card = created(
            fx.reconciler
                .reconcile("", "Buy milk", None)
                .await
                .expect("insert"),
        );
        assert_eq!(card.title, "Buy milk");
        assert_eq!(card.content, "Buy milk");
        assert!(["g1", "g2"].contains(&card.gradient.as_str()));
        assert_eq!(card.created_at, t1);
        assert_eq!(card.updated_at, t1);

        fx.clock.advance(Duration::seconds(3));
        let outcome = fx
            .reconciler
            .reconcile(&card.title, "Buy milk and eggs", Some(&card))
            .await
            .expect("update");
        let SaveOutcome::Updated(updated) = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };

        let stored = fx
            .store
            .get(card.id.expect("id"))
            .await
            .expect("get")
            .expect("card");
        assert_eq!(stored, updated);
        assert_eq!(stored.id, card.id);
        assert_eq!(stored.content, "Buy milk and eggs");
        assert_eq!(stored.gradient, card.gradient);
        assert_eq!(stored.created_at, card.created_at);
        assert!(stored.updated_at > card.updated_at);
        assert_eq!(fx.store.list_all().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn content_is_trimmed_before_persisting() {
        let fx = fixture().await;
        let card = created(
            fx.reconciler
                .reconcile("  Padded ", "\n  body text  \n", None)
                .await
                .expect("insert"),
        );
        assert_eq!(card.title, "Padded");
        assert_eq!(card.content, "body text");
    }

    #[tokio::test]
    async fn retyping_existing_content_redirects_instead_of_inserting() {
        let fx = fixture().await;
        let original = created(
            fx.reconciler
                .reconcile("Shopping", "eggs, flour", None)
                .await
                .expect("insert"),
        );

        let outcome = fx
            .reconciler
            .reconcile("", "  eggs, flour ", None)
            .await
            .expect("reconcile");
        assert_eq!(
            outcome,
            SaveOutcome::Redirected {
                card: original,
                reason: RedirectReason::MatchingContent,
            }
        );
        let cards = fx.store.list_all().await.expect("list");
        assert_eq!(cards.len(), 1);
    }

    #[tokio::test]
    async fn new_session_with_taken_title_redirects_to_that_card() {
        let fx = fixture().await;
        let notes = created(
            fx.reconciler
                .reconcile("Notes", "first body", None)
                .await
                .expect("insert"),
        );

        let outcome = fx
            .reconciler
            .reconcile("", "# Notes\nsecond body", None)
            .await
            .expect("reconcile");
        assert_eq!(
            outcome,
            SaveOutcome::Redirected {
                card: notes,
                reason: RedirectReason::MatchingTitle,
            }
        );
        assert_eq!(fx.store.list_all().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn renaming_onto_another_cards_title_is_rejected() {
        let fx = fixture().await;
        created(
            fx.reconciler
                .reconcile("Notes", "one", None)
                .await
                .expect("insert"),
        );
        let other = created(
            fx.reconciler
                .reconcile("Other", "two", None)
                .await
                .expect("insert"),
        );

        let err = fx
            .reconciler
            .reconcile("Notes", "two, edited", Some(&other))
            .await
            .expect_err("duplicate title");
        assert!(matches!(err, SaveError::DuplicateTitle { ref title, .. } if title == "Notes"));

        let stored = fx
            .store
            .get(other.id.expect("id"))
            .await
            .expect("get")
            .expect("card");
        assert_eq!(stored, other);
        let notes_count = fx
            .store
            .list_all()
            .await
            .expect("list")
            .into_iter()
            .filter(|card| card.title == "Notes")
            .count();
        assert_eq!(notes_count, 1);
    }

    #[tokio::test]
    async fn keeping_own_title_is_not_a_duplicate() {
        let fx = fixture().await;
        let card = created(
            fx.reconciler
                .reconcile("Mine", "v1", None)
                .await
                .expect("insert"),
        );
        let outcome = fx
            .reconciler
            .reconcile("Mine", "v2", Some(&card))
            .await
            .expect("update");
        assert!(matches!(outcome, SaveOutcome::Updated(ref c) if c.content == "v2"));
    }

    #[tokio::test]
    async fn updated_at_never_moves_backwards() {
        let fx = fixture().await;
        let card = created(
            fx.reconciler
                .reconcile("Clock", "v1", None)
                .await
                .expect("insert"),
        );

        fx.clock.advance(Duration::seconds(-60));
        let outcome = fx
            .reconciler
            .reconcile("Clock", "v2", Some(&card))
            .await
            .expect("update");
        let SaveOutcome::Updated(updated) = outcome else {
            panic!("expected Updated");
        };
        assert!(updated.updated_at > card.updated_at);
        assert_eq!(updated.created_at, card.created_at);
    }

    #[tokio::test]
    async fn updated_at_advances_when_clock_stands_still() {
        let fx = fixture().await;
        let card = created(
            fx.reconciler
                .reconcile("Frozen", "v1", None)
                .await
                .expect("insert"),
        );

        let outcome = fx
            .reconciler
            .reconcile("Frozen", "v2", Some(&card))
            .await
            .expect("update");
        let SaveOutcome::Updated(updated) = outcome else {
            panic!("expected Updated");
        };
        assert_eq!(
            updated.updated_at,
            card.updated_at + Duration::microseconds(1)
        );

        let stored = fx
            .store
            .get(card.id.expect("id"))
            .await
            .expect("get")
            .expect("card");
        assert_eq!(stored.updated_at, updated.updated_at);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_storage_unavailable() {
        let fx = fixture().await;
        fx.store.fail_next_calls(true);
        let err = fx
            .reconciler
            .reconcile("", "anything", None)
            .await
            .expect_err("store down");
        assert!(matches!(err, SaveError::StorageUnavailable(_)));

        fx.store.fail_next_calls(false);
        assert!(fx.store.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn empty_palette_uses_builtin_gradients() {
        let sqlite = SqliteCardStore::in_memory().await.expect("storage");
        let reconciler = Reconciler::new(
            Arc::new(sqlite),
            Arc::new(core_types::SystemClock),
            Vec::new(),
        );
        let card = created(
            reconciler
                .reconcile("", "palette", None)
                .await
                .expect("insert"),
        );
        assert!(DEFAULT_GRADIENTS.contains(&card.gradient.as_str()));
    }
}
