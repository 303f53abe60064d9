use i18n::I18n;

pub const CARD_CREATED: &str = "card.created";
pub const CARD_UPDATED: &str = "card.updated";
pub const CARD_REDIRECT_CONTENT: &str = "card.redirect_content";
pub const CARD_REDIRECT_TITLE: &str = "card.redirect_title";
pub const CARD_DUPLICATE_TITLE: &str = "card.duplicate_title";
pub const CARD_SAVE_FAILED: &str = "card.save_failed";
pub const CARD_DELETED: &str = "card.deleted";
pub const CARD_DELETE_FAILED: &str = "card.delete_failed";
pub const CARDS_LOAD_FAILED: &str = "cards.load_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient user-facing message. `key` is an i18n key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub key: &'static str,
}

impl Notice {
    pub fn info(key: &'static str) -> Self {
        Self {
            level: NoticeLevel::Info,
            key,
        }
    }

    pub fn success(key: &'static str) -> Self {
        Self {
            level: NoticeLevel::Success,
            key,
        }
    }

    pub fn error(key: &'static str) -> Self {
        Self {
            level: NoticeLevel::Error,
            key,
        }
    }

    pub fn text<'a>(&self, i18n: &'a I18n) -> &'a str {
        i18n.t(self.key)
    }
}
