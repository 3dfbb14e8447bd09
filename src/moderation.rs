//! Sensitive-word detection.
//!
//! Matching is case-insensitive substring containment against the enabled
//! word list. Hits are advisory: callers record them, they never reject text.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

use crate::error::{is_unique_violation, PcError, PcResult};
use crate::models::SensitiveWord;

#[async_trait]
pub trait SensitiveWordFilter: Send + Sync {
    /// Enabled words that occur in `text`, as stored.
    async fn find_sensitive_words(&self, text: &str) -> PcResult<BTreeSet<String>>;
}

fn matches_in<'a>(text: &str, words: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let haystack = text.to_lowercase();
    words
        .into_iter()
        .filter(|w| !w.trim().is_empty())
        .filter(|w| haystack.contains(&w.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Fixed in-memory word list.
#[derive(Debug, Clone, Default)]
pub struct StaticWordFilter {
    words: Vec<String>,
}

impl StaticWordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SensitiveWordFilter for StaticWordFilter {
    async fn find_sensitive_words(&self, text: &str) -> PcResult<BTreeSet<String>> {
        Ok(matches_in(text, self.words.iter().map(String::as_str)))
    }
}

/// Word list kept in the `sensitive_words` table.
pub struct SqliteWordFilter {
    pool: SqlitePool,
}

impl SqliteWordFilter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_word(
        &self,
        word: &str,
        category: Option<&str>,
        level: Option<&str>,
    ) -> PcResult<SensitiveWord> {
        let word = word.trim();
        if word.is_empty() {
            return Err(PcError::Validation("word must not be blank".to_string()));
        }
        let category = category.unwrap_or("DEFAULT").to_string();
        let level = level.unwrap_or("LOW").to_ascii_uppercase();

        let result = sqlx::query(
            "INSERT INTO sensitive_words (word, category, level, enabled, created_at) \
             VALUES (?, ?, ?, 1, ?)",
        )
        .bind(word)
        .bind(&category)
        .bind(&level)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PcError::Validation(format!("word already exists: {}", word))
            } else {
                PcError::Database(e)
            }
        })?;

        Ok(SensitiveWord {
            id: result.last_insert_rowid(),
            word: word.to_string(),
            category,
            level,
            enabled: true,
        })
    }

    /// Disabled words stay listed but no longer match.
    pub async fn set_enabled(&self, word: &str, enabled: bool) -> PcResult<()> {
        let word = word.trim();
        let result = sqlx::query("UPDATE sensitive_words SET enabled = ? WHERE word = ?")
            .bind(enabled)
            .bind(word)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PcError::not_found("sensitive word", word));
        }
        Ok(())
    }

    pub async fn list_words(&self) -> PcResult<Vec<SensitiveWord>> {
        let rows = sqlx::query(
            "SELECT id, word, category, level, enabled FROM sensitive_words ORDER BY word",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SensitiveWord {
                id: row.get("id"),
                word: row.get("word"),
                category: row.get("category"),
                level: row.get("level"),
                enabled: row.get("enabled"),
            })
            .collect())
    }
}

#[async_trait]
impl SensitiveWordFilter for SqliteWordFilter {
    async fn find_sensitive_words(&self, text: &str) -> PcResult<BTreeSet<String>> {
        let words: Vec<String> =
            sqlx::query_scalar("SELECT word FROM sensitive_words WHERE enabled = 1")
                .fetch_all(&self.pool)
                .await?;
        Ok(matches_in(text, words.iter().map(String::as_str)))
    }
}
