//! Browsing/editing state machine behind the card grid. Each editing session
//! owns a debounce timer task; when it fires the reconciler decides what to
//! persist and the outcome is folded back into the session.

use std::sync::Arc;
use std::time::Duration;

use core_types::{Card, CardField, CardId, CardStore, Clock, SessionId};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::notice::{self, Notice};
use crate::reconciler::{RedirectReason, Reconciler, SaveError, SaveOutcome, resolve_title};

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub debounce: Duration,
    pub flush_on_exit: bool,
    pub gradients: Vec<String>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            flush_on_exit: false,
            gradients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    Editing,
}

/// Read-only view of the open editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub title: String,
    pub content: String,
    /// Persisted card the session writes to; `None` until the first save.
    pub card: Option<Card>,
}

impl SessionSnapshot {
    pub fn is_new(&self) -> bool {
        self.card.is_none()
    }

    /// Whether the bound card already holds what a save would write.
    pub fn is_saved(&self) -> bool {
        self.card.as_ref().is_some_and(|card| {
            card.content == self.content.trim()
                && card.title == resolve_title(&self.title, &self.content)
        })
    }

    /// i18n key for the editor header.
    pub fn label_key(&self) -> &'static str {
        if self.is_new() {
            "session.new"
        } else {
            "session.editing"
        }
    }
}

struct EditSession {
    id: SessionId,
    title: String,
    content: String,
    card: Option<Card>,
    pending: Option<JoinHandle<()>>,
}

impl EditSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            card: self.card.clone(),
        }
    }

    /// Aborts the debounce timer. Returns whether it had not fired yet.
    fn cancel_timer(&mut self) -> bool {
        match self.pending.take() {
            Some(timer) => {
                let waiting = !timer.is_finished();
                timer.abort();
                waiting
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct ViewState {
    cards: Vec<Card>,
    session: Option<EditSession>,
}

struct Shared {
    store: Arc<dyn CardStore>,
    reconciler: Reconciler,
    settings: DashboardSettings,
    state: Mutex<ViewState>,
    // Held for the whole of a save so a slow store call cannot interleave
    // with the next debounce firing.
    saves: tokio::sync::Mutex<()>,
    notices: UnboundedSender<Notice>,
}

#[derive(Clone)]
pub struct Dashboard {
    shared: Arc<Shared>,
}

impl Dashboard {
    pub fn new(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        settings: DashboardSettings,
    ) -> (Self, UnboundedReceiver<Notice>) {
        let (notices, receiver) = unbounded_channel();
        let reconciler = Reconciler::new(store.clone(), clock, settings.gradients.clone());
        let shared = Shared {
            store,
            reconciler,
            settings,
            state: Mutex::new(ViewState::default()),
            saves: tokio::sync::Mutex::new(()),
            notices,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    pub fn mode(&self) -> Mode {
        if self.shared.state.lock().session.is_some() {
            Mode::Editing
        } else {
            Mode::Browsing
        }
    }

    /// Last loaded card list, most recently updated first.
    pub fn cards(&self) -> Vec<Card> {
        self.shared.state.lock().cards.clone()
    }

    pub fn session(&self) -> Option<SessionSnapshot> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(EditSession::snapshot)
    }

    /// Reloads the list from the store. On failure the previous list is kept.
    pub async fn load_all(&self) -> Vec<Card> {
        self.shared.refresh().await
    }

    /// Opens the editor on `card`, or on a blank new card. Any session that
    /// was already open is dropped along with its pending save.
    pub fn begin_edit(&self, card: Option<Card>) -> SessionId {
        let card = card.filter(|c| c.id.is_some());
        let session = EditSession {
            id: Uuid::new_v4(),
            title: card.as_ref().map(|c| c.title.clone()).unwrap_or_default(),
            content: card.as_ref().map(|c| c.content.clone()).unwrap_or_default(),
            card,
            pending: None,
        };
        let id = session.id;
        info!(session = %id, card_id = ?session.card.as_ref().and_then(|c| c.id), "editing session started");

        let previous = self.shared.state.lock().session.replace(session);
        if let Some(mut previous) = previous {
            previous.cancel_timer();
            debug!(session = %previous.id, "replaced open editing session");
        }
        id
    }

    /// Records a keystroke and restarts the session's debounce timer.
    pub fn on_field_change(&self, session: SessionId, field: CardField, value: impl Into<String>) {
        let mut state = self.shared.state.lock();
        let Some(edit) = state.session.as_mut().filter(|s| s.id == session) else {
            debug!(session = %session, "change for inactive session ignored");
            return;
        };

        match field {
            CardField::Title => edit.title = value.into(),
            CardField::Content => edit.content = value.into(),
        }
        edit.cancel_timer();

        let shared = Arc::clone(&self.shared);
        let delay = self.shared.settings.debounce;
        edit.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Once fired, the save runs detached so that a later restart of
            // the timer cannot cut it off halfway.
            tokio::spawn(async move { shared.autosave(session).await });
        }));
    }

    /// Leaves edit mode. Keystrokes still waiting on the debounce timer are
    /// dropped unless `flush_on_exit` is set, in which case saves already
    /// queued finish first and whatever they left unsaved is written.
    pub async fn end_edit(&self, session: SessionId) {
        let flush = self.shared.settings.flush_on_exit;
        let waiting = {
            let mut state = self.shared.state.lock();
            match state.session.as_mut().filter(|s| s.id == session) {
                Some(edit) => edit.cancel_timer(),
                None => {
                    debug!(session = %session, "end for inactive session ignored");
                    return;
                }
            }
        };

        // Queued autosaves still need the session to fold their result into.
        let _serial = if flush {
            Some(self.shared.saves.lock().await)
        } else {
            None
        };

        let ended = {
            let mut state = self.shared.state.lock();
            if state.session.as_ref().is_some_and(|s| s.id == session) {
                state.session.take()
            } else {
                None
            }
        };
        let Some(mut edit) = ended else {
            debug!(session = %session, "session replaced before it could end");
            return;
        };
        edit.cancel_timer();

        if flush {
            let snapshot = edit.snapshot();
            if snapshot.is_saved() {
                debug!(session = %session, "nothing left to flush on exit");
            } else {
                self.shared.persist(&snapshot).await;
            }
        } else if waiting {
            debug!(session = %session, "unsaved keystrokes dropped on exit");
        }
        info!(session = %session, "editing session ended");
    }

    pub async fn delete_card(&self, id: CardId) {
        match self.shared.store.delete(id).await {
            Ok(()) => {
                info!(card_id = id, "card deleted");
                self.shared.notify(Notice::success(notice::CARD_DELETED));
                self.shared.refresh().await;
            }
            Err(err) => {
                error!(card_id = id, error = %err, "failed to delete card");
                self.shared.notify(Notice::error(notice::CARD_DELETE_FAILED));
            }
        }
    }
}

impl Shared {
    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    async fn refresh(&self) -> Vec<Card> {
        match self.store.list_all().await {
            Ok(cards) => {
                self.state.lock().cards = cards.clone();
                cards
            }
            Err(err) => {
                error!(error = %err, "failed to load cards");
                self.notify(Notice::error(notice::CARDS_LOAD_FAILED));
                self.state.lock().cards.clone()
            }
        }
    }

    async fn autosave(&self, session: SessionId) {
        let _serial = self.saves.lock().await;
        let snapshot = self
            .state
            .lock()
            .session
            .as_ref()
            .filter(|s| s.id == session)
            .map(EditSession::snapshot);
        let Some(snapshot) = snapshot else {
            debug!(session = %session, "session closed before autosave fired");
            return;
        };

        if let Some(outcome) = self.persist(&snapshot).await {
            self.adopt(session, outcome);
        }
    }

    /// Runs one save attempt and reports it. Returns the outcome only when
    /// something was written or the session should be redirected.
    async fn persist(&self, snapshot: &SessionSnapshot) -> Option<SaveOutcome> {
        let result = self
            .reconciler
            .reconcile(&snapshot.title, &snapshot.content, snapshot.card.as_ref())
            .await;

        match result {
            Ok(SaveOutcome::Skipped) => {
                debug!(session = %snapshot.id, "empty content, save skipped");
                None
            }
            Ok(outcome) => {
                match &outcome {
                    SaveOutcome::Redirected { reason, .. } => {
                        self.notify(Notice::info(match reason {
                            RedirectReason::MatchingContent => notice::CARD_REDIRECT_CONTENT,
                            RedirectReason::MatchingTitle => notice::CARD_REDIRECT_TITLE,
                        }));
                    }
                    SaveOutcome::Created(_) => {
                        self.notify(Notice::success(notice::CARD_CREATED));
                        self.refresh().await;
                    }
                    SaveOutcome::Updated(_) => {
                        self.notify(Notice::success(notice::CARD_UPDATED));
                        self.refresh().await;
                    }
                    SaveOutcome::Skipped => {}
                }
                Some(outcome)
            }
            Err(SaveError::DuplicateTitle { .. }) => {
                self.notify(Notice::error(notice::CARD_DUPLICATE_TITLE));
                None
            }
            Err(err @ SaveError::StorageUnavailable(_)) => {
                error!(session = %snapshot.id, error = %err, "failed to save card");
                self.notify(Notice::error(notice::CARD_SAVE_FAILED));
                None
            }
        }
    }

    fn adopt(&self, session: SessionId, outcome: SaveOutcome) {
        let mut state = self.state.lock();
        let Some(edit) = state.session.as_mut().filter(|s| s.id == session) else {
            debug!(session = %session, "session closed while saving, result not adopted");
            return;
        };

        match outcome {
            SaveOutcome::Redirected { card, reason } => {
                edit.title = card.title.clone();
                if reason == RedirectReason::MatchingTitle {
                    edit.content = card.content.clone();
                }
                edit.card = Some(card);
            }
            SaveOutcome::Created(card) => {
                edit.title = card.title.clone();
                edit.card = Some(card);
            }
            SaveOutcome::Updated(card) => edit.card = Some(card),
            SaveOutcome::Skipped => {}
        }
    }
}
