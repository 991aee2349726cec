//! Download token repository
//!
//! `consume` runs as a single transaction with a row lock so that two
//! concurrent download attempts on the same single-use token resolve to
//! exactly one success.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use deckhand_core::models::{DownloadToken, TokenResource};
use deckhand_core::{AppError, TokenStore};

use super::transaction::TransactionGuard;

const TOKEN_COLUMNS: &str =
    "token, user_id, resource_type, resource_id, file_path, expires_at, used, used_at, created_at";

#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn insert(&self, token: &DownloadToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO download_tokens (
                token, user_id, resource_type, resource_id, file_path,
                expires_at, used, used_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.resource_type)
        .bind(token.resource_id)
        .bind(&token.file_path)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert download token")?;
        Ok(())
    }

    async fn consume(
        &self,
        token: &str,
        allow_multi_use: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let row = sqlx::query_as::<Postgres, DownloadToken>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM download_tokens
            WHERE token = $1
            FOR UPDATE
            "#
        ))
        .bind(token)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to look up download token")?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        if row.is_expired(now) {
            sqlx::query(r#"DELETE FROM download_tokens WHERE token = $1"#)
                .bind(token)
                .execute(&mut **tx)
                .await
                .context("Failed to delete expired token")?;
            tx.commit().await?;
            tracing::debug!(
                resource_type = %row.resource_type,
                resource_id = %row.resource_id,
                "Deleted expired download token on access"
            );
            return Ok(None);
        }

        let multi_use = allow_multi_use || row.resource_type.allows_multi_use();
        if multi_use {
            // Reusable until expiry; `used` is never set.
            tx.commit().await?;
            return Ok(Some(row));
        }

        if row.used {
            tx.rollback().await?;
            return Ok(None);
        }

        let consumed = sqlx::query_as::<Postgres, DownloadToken>(&format!(
            r#"
            UPDATE download_tokens
            SET used = TRUE, used_at = $2
            WHERE token = $1
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to consume download token")?;

        tx.commit().await?;
        Ok(Some(consumed))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(r#"DELETE FROM download_tokens WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to revoke tokens for user")?;
        Ok(result.rows_affected())
    }

    async fn delete_for_resource(
        &self,
        resource_type: TokenResource,
        resource_id: Uuid,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"DELETE FROM download_tokens WHERE resource_type = $1 AND resource_id = $2"#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .execute(&self.pool)
        .await
        .context("Failed to revoke tokens for resource")?;
        Ok(result.rows_affected())
    }

    async fn delete_stale(
        &self,
        now: DateTime<Utc>,
        used_before: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM download_tokens
            WHERE expires_at < $1 OR (used = TRUE AND used_at < $2)
            "#,
        )
        .bind(now)
        .bind(used_before)
        .execute(&self.pool)
        .await
        .context("Failed to sweep stale tokens")?;
        Ok(result.rows_affected())
    }
}
