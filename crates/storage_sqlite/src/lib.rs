use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use core_types::{Card, CardField, CardId, CardPatch, CardStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub const CURRENT_DB_SCHEMA_VERSION: u32 = 1;

const CARD_COLUMNS: &str = "id, title, content, gradient, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteCardStore {
    pool: SqlitePool,
}

impl SqliteCardStore {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent dir for {}", path.display()))?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.to_string_lossy()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open card database {}", path.display()))?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Private database that lives as long as the pool's single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                gradient TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        for sql in [
            "CREATE INDEX IF NOT EXISTS idx_cards_title ON cards(title)",
            "CREATE INDEX IF NOT EXISTS idx_cards_content ON cards(content)",
            "CREATE INDEX IF NOT EXISTS idx_cards_updated_at ON cards(updated_at)",
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed migration sql: {sql}"))?;
        }

        sqlx::query(
            r#"
            INSERT INTO metadata(key, value)
            VALUES ('schema_version', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(CURRENT_DB_SCHEMA_VERSION.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_one(&self.pool)
            .await?;
        let version = row.get::<String, _>("value").parse::<u32>()?;
        Ok(version)
    }
}

#[async_trait]
impl CardStore for SqliteCardStore {
    async fn insert(&self, card: &Card) -> Result<CardId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO cards(title, content, gradient, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&card.title)
        .bind(&card.content)
        .bind(&card.gradient)
        .bind(format_timestamp(card.created_at))
        .bind(format_timestamp(card.updated_at))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        let id = result.last_insert_rowid();
        debug!(card_id = id, "inserted card row");
        Ok(id)
    }

    async fn update(&self, id: CardId, patch: &CardPatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cards SET
              title = COALESCE(?2, title),
              content = COALESCE(?3, content),
              updated_at = COALESCE(?4, updated_at)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.content.as_deref())
        .bind(patch.updated_at.map(format_timestamp))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.map(map_card_row).transpose()
    }

    async fn find_first(
        &self,
        field: CardField,
        value: &str,
    ) -> Result<Option<Card>, StoreError> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE {} = ?1 ORDER BY id ASC LIMIT 1",
            field.column()
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.map(map_card_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Card>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM cards ORDER BY updated_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(map_card_row).collect()
    }

    async fn delete(&self, id: CardId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cards WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn map_card_row(row: SqliteRow) -> Result<Card, StoreError> {
    Ok(Card {
        id: Some(row.try_get("id").map_err(corrupt)?),
        title: row.try_get("title").map_err(corrupt)?,
        content: row.try_get("content").map_err(corrupt)?,
        gradient: row.try_get("gradient").map_err(corrupt)?,
        created_at: parse_rfc3339(row.try_get("created_at").map_err(corrupt)?)?,
        updated_at: parse_rfc3339(row.try_get("updated_at").map_err(corrupt)?)?,
    })
}

// Fixed-width so that text ordering on updated_at matches time ordering.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_rfc3339(value: String) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(&value)
        .map_err(corrupt)?
        .with_timezone(&Utc))
}
