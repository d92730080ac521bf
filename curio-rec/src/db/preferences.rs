//! Preference and popularity store
//!
//! Narrow read/write contract the recommender needs from persistent
//! storage: a user's preference history, and per-title recommendation
//! counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curio_common::{ContentType, Error, PreferenceRecord, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

/// Recommendation counter for one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularTitle {
    pub title: String,
    pub content_type: ContentType,
    pub recommendation_count: i64,
    pub last_recommended: DateTime<Utc>,
}

/// Persistent preference and popularity storage
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// A user's preferences, optionally restricted to one content type
    async fn preferences(
        &self,
        user_id: &str,
        content_type: Option<ContentType>,
    ) -> Result<Vec<PreferenceRecord>>;

    /// Insert or replace one preference
    async fn upsert_preference(&self, pref: &PreferenceRecord) -> Result<()>;

    /// Increment the counter of every title and refresh its timestamp
    async fn record_popularity(&self, titles: &[String], content_type: ContentType) -> Result<()>;

    /// Most recommended titles, highest count first
    async fn top_popular(&self, n: usize) -> Result<Vec<PopularTitle>>;

    /// Drop counters not refreshed since `cutoff`
    ///
    /// # Returns
    /// Number of rows deleted
    async fn delete_popular_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqlitePreferenceStore {
    db: Pool<Sqlite>,
}

impl SqlitePreferenceStore {
    /// Wrap a pool whose tables were created by `init_tables`
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

type PreferenceRow = (String, String, String, Option<String>, bool, Option<f64>, String);

fn parse_content_type(value: &str) -> Result<ContentType> {
    value
        .parse()
        .map_err(|_| Error::Internal(format!("Stored content type is invalid: {}", value)))
}

fn preference_from_row(row: PreferenceRow) -> Result<PreferenceRecord> {
    let (user_id, title, content_type, comment, seen, rating, genres) = row;
    Ok(PreferenceRecord {
        user_id,
        title,
        content_type: parse_content_type(&content_type)?,
        rating: rating.map(|r| r as f32),
        genres: serde_json::from_str(&genres)?,
        comment,
        seen,
    })
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn preferences(
        &self,
        user_id: &str,
        content_type: Option<ContentType>,
    ) -> Result<Vec<PreferenceRecord>> {
        let rows: Vec<PreferenceRow> = sqlx::query_as(
            r#"
            SELECT user_id, title, content_type, comment, seen, rating, genres
            FROM user_preferences
            WHERE user_id = ? AND (? IS NULL OR content_type = ?)
            ORDER BY rowid
            "#,
        )
        .bind(user_id)
        .bind(content_type.map(|c| c.as_str()))
        .bind(content_type.map(|c| c.as_str()))
        .fetch_all(&self.db)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(preference_from_row).collect()
    }

    async fn upsert_preference(&self, pref: &PreferenceRecord) -> Result<()> {
        let genres = serde_json::to_string(&pref.genres)?;

        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, title, content_type, comment, seen, rating, genres)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, title, content_type) DO UPDATE SET
                comment = excluded.comment,
                seen = excluded.seen,
                rating = excluded.rating,
                genres = excluded.genres
            "#,
        )
        .bind(&pref.user_id)
        .bind(&pref.title)
        .bind(pref.content_type.as_str())
        .bind(&pref.comment)
        .bind(pref.seen)
        .bind(pref.rating.map(f64::from))
        .bind(genres)
        .execute(&self.db)
        .await
        .map_err(Error::Database)?;

        tracing::debug!(user_id = %pref.user_id, title = %pref.title, "Stored preference");
        Ok(())
    }

    async fn record_popularity(&self, titles: &[String], content_type: ContentType) -> Result<()> {
        if titles.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(Error::Database)?;

        for title in titles {
            sqlx::query(
                r#"
                INSERT INTO popular_titles (title, content_type, recommendation_count, last_recommended)
                VALUES (?, ?, 1, ?)
                ON CONFLICT(title, content_type) DO UPDATE SET
                    recommendation_count = recommendation_count + 1,
                    last_recommended = excluded.last_recommended
                "#,
            )
            .bind(title)
            .bind(content_type.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(count = titles.len(), content_type = %content_type, "Recorded popularity");
        Ok(())
    }

    async fn top_popular(&self, n: usize) -> Result<Vec<PopularTitle>> {
        let rows: Vec<(String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT title, content_type, recommendation_count, last_recommended
            FROM popular_titles
            ORDER BY recommendation_count DESC, last_recommended DESC
            LIMIT ?
            "#,
        )
        .bind(n as i64)
        .fetch_all(&self.db)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|(title, content_type, recommendation_count, last_recommended)| {
                Ok(PopularTitle {
                    title,
                    content_type: parse_content_type(&content_type)?,
                    recommendation_count,
                    last_recommended,
                })
            })
            .collect()
    }

    async fn delete_popular_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM popular_titles WHERE last_recommended < ?")
            .bind(cutoff)
            .execute(&self.db)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
