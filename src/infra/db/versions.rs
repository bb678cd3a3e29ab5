use async_trait::async_trait;
use sqlx::{FromRow, query, query_as, query_scalar};
use time::OffsetDateTime;

use super::{PostgresRepositories, map_sqlx_error};
use crate::application::repos::{NewVersion, RepoError, TitleRemoval, VersionStore};
use crate::domain::entities::VersionRecord;
use crate::domain::posts::{Owner, PostTitle, VersionNumber};

#[derive(Debug, FromRow)]
struct VersionRow {
    owner: String,
    title: String,
    version: String,
    created_at: OffsetDateTime,
    is_active: bool,
    content_ref: String,
}

impl From<VersionRow> for VersionRecord {
    fn from(row: VersionRow) -> Self {
        Self {
            owner: row.owner,
            title: row.title,
            version: row.version,
            created_at: row.created_at,
            is_active: row.is_active,
            content_ref: row.content_ref,
        }
    }
}

fn into_records(rows: Vec<VersionRow>) -> Vec<VersionRecord> {
    rows.into_iter().map(VersionRecord::from).collect()
}

#[async_trait]
impl VersionStore for PostgresRepositories {
    async fn fetch_versions(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        let rows = query_as::<_, VersionRow>(
            r#"
            SELECT owner, title, version, created_at, is_active, content_ref
            FROM post_versions
            WHERE owner = $1 AND title = $2
            ORDER BY created_at
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_records(rows))
    }

    async fn active_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Option<VersionRecord>, RepoError> {
        let row = query_as::<_, VersionRow>(
            r#"
            SELECT owner, title, version, created_at, is_active, content_ref
            FROM post_versions
            WHERE owner = $1 AND title = $2 AND is_active
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(VersionRecord::from))
    }

    async fn insert_active_version(&self, version: NewVersion) -> Result<VersionRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_title(&mut tx, &version.owner, &version.title).await?;

        query("UPDATE post_versions SET is_active = FALSE WHERE owner = $1 AND title = $2 AND is_active")
            .bind(version.owner.as_str())
            .bind(version.title.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let row = query_as::<_, VersionRow>(
            r#"
            INSERT INTO post_versions (owner, title, version, created_at, is_active, content_ref)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING owner, title, version, created_at, is_active, content_ref
            "#,
        )
        .bind(version.owner.as_str())
        .bind(version.title.as_str())
        .bind(version.version.to_string())
        .bind(version.created_at)
        .bind(&version.content_ref)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn activate_version(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_title(&mut tx, owner, title).await?;

        // One statement flips every flag of the title, and only when the
        // target exists.
        let result = query(
            r#"
            UPDATE post_versions
            SET is_active = (version = $3)
            WHERE owner = $1 AND title = $2
              AND EXISTS (
                  SELECT 1 FROM post_versions
                  WHERE owner = $1 AND title = $2 AND version = $3
              )
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(version.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_title(&mut tx, owner, title).await?;

        let rows = query_as::<_, VersionRow>(
            r#"
            DELETE FROM post_versions
            WHERE owner = $1 AND title = $2
            RETURNING owner, title, version, created_at, is_active, content_ref
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn list_owner_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError> {
        let rows = query_as::<_, VersionRow>(
            r#"
            SELECT owner, title, version, created_at, is_active, content_ref
            FROM post_versions
            WHERE owner = $1
            ORDER BY title, created_at
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_records(rows))
    }

    async fn list_active_versions(&self, owner: &Owner) -> Result<Vec<VersionRecord>, RepoError> {
        let rows = query_as::<_, VersionRow>(
            r#"
            SELECT owner, title, version, created_at, is_active, content_ref
            FROM post_versions
            WHERE owner = $1 AND is_active
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_records(rows))
    }

    async fn newest_versions(&self, limit: usize) -> Result<Vec<VersionRecord>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query_as::<_, VersionRow>(
            r#"
            SELECT owner, title, version, created_at, is_active, content_ref
            FROM post_versions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_records(rows))
    }

    async fn is_active(
        &self,
        owner: &Owner,
        title: &PostTitle,
        version: VersionNumber,
    ) -> Result<bool, RepoError> {
        query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM post_versions
                WHERE owner = $1 AND title = $2 AND version = $3 AND is_active
            )
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .bind(version.to_string())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TitleRemoval for PostgresRepositories {
    async fn remove_title(
        &self,
        owner: &Owner,
        title: &PostTitle,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_title(&mut tx, owner, title).await?;

        // Views and likes cascade from post_analytics.
        query("DELETE FROM post_analytics WHERE owner = $1 AND title = $2")
            .bind(owner.as_str())
            .bind(title.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let rows = query_as::<_, VersionRow>(
            r#"
            DELETE FROM post_versions
            WHERE owner = $1 AND title = $2
            RETURNING owner, title, version, created_at, is_active, content_ref
            "#,
        )
        .bind(owner.as_str())
        .bind(title.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }
}
