use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    zh_cn: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            zh_cn: zh_cn_map(),
            en_us: en_us_map(),
        }
    }

    pub fn set_language(&mut self, lang: UiLanguage) {
        self.lang = lang;
    }

    pub fn language(&self) -> UiLanguage {
        self.lang
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        match self.lang {
            UiLanguage::ZhCn => self
                .zh_cn
                .get(key)
                .copied()
                .or_else(|| self.en_us.get(key).copied())
                .unwrap_or(key),
            UiLanguage::EnUs => self
                .en_us
                .get(key)
                .copied()
                .or_else(|| self.zh_cn.get(key).copied())
                .unwrap_or(key),
        }
    }
}

fn zh_cn_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "卡片集"),
        ("session.new", "新卡片"),
        ("session.editing", "编辑卡片"),
        ("card.created", "卡片已创建"),
        ("card.updated", "卡片已更新"),
        ("card.redirect_content", "正在更新已有卡片"),
        ("card.redirect_title", "正在更新同名的已有卡片"),
        ("card.duplicate_title", "已存在同名卡片"),
        ("card.save_failed", "保存卡片失败"),
        ("card.deleted", "卡片已删除"),
        ("card.delete_failed", "删除卡片失败"),
        ("cards.load_failed", "加载卡片失败"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "Card Collection"),
        ("session.new", "New Card"),
        ("session.editing", "Editing Card"),
        ("card.created", "Card created"),
        ("card.updated", "Card updated"),
        ("card.redirect_content", "Updating existing card"),
        (
            "card.redirect_title",
            "Updating existing card with same title",
        ),
        ("card.duplicate_title", "A card with this title already exists"),
        ("card.save_failed", "Failed to save card"),
        ("card.deleted", "Card deleted"),
        ("card.delete_failed", "Failed to delete card"),
        ("cards.load_failed", "Failed to load cards"),
    ])
}
