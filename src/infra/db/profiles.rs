use async_trait::async_trait;
use sqlx::{FromRow, query, query_as};

use super::{PostgresRepositories, map_sqlx_error};
use crate::application::repos::{ProfileDirectory, RepoError};
use crate::domain::entities::ProfileRecord;
use crate::domain::posts::Owner;

#[derive(Debug, FromRow)]
struct ProfileRow {
    username: String,
    display_name: Option<String>,
    picture_url: Option<String>,
    style: Option<String>,
}

#[async_trait]
impl ProfileDirectory for PostgresRepositories {
    async fn profile(&self, owner: &Owner) -> Result<Option<ProfileRecord>, RepoError> {
        let row = query_as::<_, ProfileRow>(
            "SELECT username, display_name, picture_url, style FROM profiles WHERE username = $1",
        )
        .bind(owner.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| ProfileRecord {
            username: row.username,
            display_name: row.display_name,
            picture_url: row.picture_url,
            style: row.style,
        }))
    }

    async fn set_style(&self, owner: &Owner, style: &str) -> Result<(), RepoError> {
        query(
            r#"
            INSERT INTO profiles (username, style) VALUES ($1, $2)
            ON CONFLICT (username) DO UPDATE SET style = EXCLUDED.style
            "#,
        )
        .bind(owner.as_str())
        .bind(style)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
