use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{FromRow, query, query_as, query_scalar};
use time::OffsetDateTime;

use super::{PostgresRepositories, map_sqlx_error};
use crate::application::repos::{AnalyticsStore, RepoError};
use crate::domain::entities::{AnalyticsRecord, ViewedPostRecord};
use crate::domain::posts::{Owner, PostTitle, VersionNumber};

#[derive(Debug, FromRow)]
struct AnalyticsRow {
    owner: String,
    title: String,
    version: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct ViewedRow {
    owner: String,
    title: String,
    version: String,
    created_at: OffsetDateTime,
    view_count: i64,
}

impl From<ViewedRow> for ViewedPostRecord {
    fn from(row: ViewedRow) -> Self {
        Self {
            owner: row.owner,
            title: row.title,
            version: row.version,
            created_at: row.created_at,
            view_count: u64::try_from(row.view_count).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AnalyticsStore for PostgresRepositories {
    async fn create_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        created_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        query(
            r#"
            INSERT INTO post_analytics (owner, title, version, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(version.to_string())
        .bind(created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_view(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let result = query(
            r#"
            INSERT INTO post_views (owner, title, version, viewed_at)
            SELECT owner, title, version, $4
            FROM post_analytics
            WHERE owner = $1 AND title = $2 AND version = $3
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(version.to_string())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn toggle_like(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
        liker: &str,
    ) -> Result<bool, RepoError> {
        let version = version.to_string();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let exists = query_scalar::<_, i32>(
            r#"
            SELECT 1 FROM post_analytics
            WHERE owner = $1 AND title = $2 AND version = $3
            FOR KEY SHARE
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(&version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .is_some();
        if !exists {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(RepoError::NotFound);
        }

        let inserted = query(
            r#"
            INSERT INTO post_likes (owner, title, version, username)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(&version)
        .bind(liker)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 0 {
            query(
                r#"
                DELETE FROM post_likes
                WHERE owner = $1 AND title = $2 AND version = $3 AND username = $4
                "#,
            )
            .bind(owner.as_str())
            .bind(title.as_str())
            .bind(&version)
            .bind(liker)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(inserted > 0)
    }

    async fn get_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<Option<AnalyticsRecord>, RepoError> {
        let version = version.to_string();
        let Some(row) = query_as::<_, AnalyticsRow>(
            r#"
            SELECT owner, title, version, created_at
            FROM post_analytics
            WHERE owner = $1 AND title = $2 AND version = $3
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(&version)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let views = query_scalar::<_, OffsetDateTime>(
            r#"
            SELECT viewed_at FROM post_views
            WHERE owner = $1 AND title = $2 AND version = $3
            ORDER BY viewed_at
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(&version)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let likers = query_scalar::<_, String>(
            r#"
            SELECT username FROM post_likes
            WHERE owner = $1 AND title = $2 AND version = $3
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(&version)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(AnalyticsRecord {
            owner: row.owner,
            title: row.title,
            version: row.version,
            created_at: row.created_at,
            views,
            likers: likers.into_iter().collect::<BTreeSet<_>>(),
        }))
    }

    async fn view_count(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<u64, RepoError> {
        let count = query_scalar::<_, Option<i64>>(
            r#"
            SELECT (
                SELECT COUNT(*) FROM post_views v
                WHERE v.owner = a.owner AND v.title = a.title AND v.version = a.version
            )
            FROM post_analytics a
            WHERE a.owner = $1 AND a.title = $2 AND a.version = $3
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(version.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(count.and_then(|value| u64::try_from(value).ok()).unwrap_or_default())
    }

    async fn most_viewed(&self, limit: usize) -> Result<Vec<ViewedPostRecord>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query_as::<_, ViewedRow>(
            r#"
            SELECT a.owner, a.title, a.version, a.created_at, COUNT(v.id) AS view_count
            FROM post_analytics a
            LEFT JOIN post_views v
                ON v.owner = a.owner AND v.title = a.title AND v.version = a.version
            GROUP BY a.owner, a.title, a.version, a.created_at
            ORDER BY view_count DESC, a.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ViewedPostRecord::from).collect())
    }

    async fn delete_post_analytics(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<u64, RepoError> {
        let result = query("DELETE FROM post_analytics WHERE owner = $1 AND title = $2")
            .bind(owner.as_str())
            .bind(title.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
