use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type CardId = i64;
pub type SessionId = Uuid;

/// Title used when neither the title field nor the content yields one.
pub const UNTITLED: &str = "Untitled";

/// Number of content characters shown on a card in the list view.
pub const PREVIEW_CHARS: usize = 200;

pub const DEFAULT_GRADIENTS: &[&str] = &[
    "from-blue-400 via-purple-500 to-transparent to-[70%]",
    "from-green-400 via-blue-500 to-transparent to-[70%]",
    "from-yellow-400 via-red-500 to-transparent to-[70%]",
    "from-purple-400 via-pink-500 to-transparent to-[70%]",
    "from-indigo-400 via-purple-500 to-transparent to-[70%]",
    "from-cyan-400 via-blue-500 to-transparent to-[70%]",
    "from-teal-400 via-green-500 to-transparent to-[70%]",
    "from-orange-400 via-red-500 to-transparent to-[70%]",
    "from-rose-400 via-fuchsia-500 to-transparent to-[70%]",
    "from-emerald-400 via-teal-500 to-transparent to-[70%]",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    ZhCn,
    EnUs,
}

/// A single note card. `id` is `None` until the store has assigned one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CardId>,
    pub title: String,
    pub content: String,
    pub gradient: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Unsaved card stamped with `now` for both timestamps.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        gradient: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            gradient: gradient.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            derive_title(&self.content)
        } else {
            self.title.clone()
        }
    }

    pub fn preview(&self) -> String {
        match self.content.char_indices().nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &self.content[..cut]),
            None => self.content.clone(),
        }
    }
}

/// Title taken from the first line of `content` with heading and emphasis
/// markers removed, or [`UNTITLED`] when nothing is left.
pub fn derive_title(content: &str) -> String {
    let first_line = content.trim().split('\n').next().unwrap_or_default();
    let without_heading = if first_line.starts_with('#') {
        first_line.trim_start_matches('#').trim_start()
    } else {
        first_line
    };
    let stripped = without_heading.replace("**", "").replace('*', "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        UNTITLED.to_string()
    } else {
        stripped.to_string()
    }
}

/// Columns a card can be looked up by with an exact match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardField {
    Title,
    Content,
}

impl CardField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
        }
    }
}

/// Partial update. `gradient` and `created_at` are write-once and have no
/// counterpart here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CardPatch {
    pub fn apply(&self, card: &mut Card) {
        if let Some(title) = &self.title {
            card.title = title.clone();
        }
        if let Some(content) = &self.content {
            card.content = content.clone();
        }
        if let Some(updated_at) = self.updated_at {
            card.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("card store unavailable: {0}")]
    Unavailable(String),

    #[error("card {0} not found")]
    NotFound(CardId),

    #[error("corrupt card record: {0}")]
    Corrupt(String),
}

/// Single-table card persistence.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Persists `card` (its `id` is ignored) and returns the assigned id.
    async fn insert(&self, card: &Card) -> Result<CardId, StoreError>;

    async fn update(&self, id: CardId, patch: &CardPatch) -> Result<(), StoreError>;

    async fn get(&self, id: CardId) -> Result<Option<Card>, StoreError>;

    /// First card (lowest id) whose `field` equals `value` exactly.
    async fn find_first(&self, field: CardField, value: &str)
    -> Result<Option<Card>, StoreError>;

    /// Every card, most recently updated first.
    async fn list_all(&self) -> Result<Vec<Card>, StoreError>;

    /// Removing an unknown id is not an error.
    async fn delete(&self, id: CardId) -> Result<(), StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
