//! Backup record repository
//!
//! All status transitions go through conditional updates so that two
//! concurrent workers can never both claim the same record.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use deckhand_core::models::{BackupRecord, BackupStatus, NewBackupRecord};
use deckhand_core::{AppError, BackupStore};

const BACKUP_COLUMNS: &str = "id, user_id, filename, original_name, filepath, size, mime_type, \
     status, project_id, notes, expires_at, processed_at, error_message, drive_file_id, \
     created_at, updated_at";

#[derive(Clone)]
pub struct BackupRepository {
    pool: PgPool,
}

impl BackupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BackupRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, BackupRecord>(&format!(
            r#"
            SELECT {BACKUP_COLUMNS}
            FROM backups
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list backups")?;
        Ok(rows)
    }
}

#[async_trait]
impl BackupStore for BackupRepository {
    async fn create(&self, record: NewBackupRecord) -> Result<BackupRecord, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<Postgres, BackupRecord>(&format!(
            r#"
            INSERT INTO backups (
                id, user_id, filename, original_name, filepath, size, mime_type,
                status, project_id, notes, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {BACKUP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(&record.filename)
        .bind(&record.original_name)
        .bind(&record.filepath)
        .bind(record.size)
        .bind(&record.mime_type)
        .bind(record.status)
        .bind(record.project_id)
        .bind(&record.notes)
        .bind(record.expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create backup record")?;
        Ok(row)
    }

    async fn get_for_user(
        &self,
        user_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<BackupRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, BackupRecord>(&format!(
            r#"
            SELECT {BACKUP_COLUMNS}
            FROM backups
            WHERE user_id = $1 AND id = $2
            "#
        ))
        .bind(user_id)
        .bind(backup_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get backup record")?;
        Ok(row)
    }

    async fn update_status_guarded(
        &self,
        backup_id: Uuid,
        expected: BackupStatus,
        next: BackupStatus,
    ) -> Result<Option<BackupRecord>, AppError> {
        let now = Utc::now();
        let processed_at = next.is_terminal().then_some(now);
        let row = sqlx::query_as::<Postgres, BackupRecord>(&format!(
            r#"
            UPDATE backups
            SET status = $3,
                processed_at = COALESCE($4, processed_at),
                updated_at = $5
            WHERE id = $1 AND status = $2
            RETURNING {BACKUP_COLUMNS}
            "#
        ))
        .bind(backup_id)
        .bind(expected)
        .bind(next)
        .bind(processed_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update backup status")?;
        Ok(row)
    }

    async fn mark_failed(&self, backup_id: Uuid, error_message: &str) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE backups
            SET status = $2, error_message = $3, processed_at = $4, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(backup_id)
        .bind(BackupStatus::Failed)
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to mark backup as failed")?;
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<BackupRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, BackupRecord>(&format!(
            r#"
            SELECT {BACKUP_COLUMNS}
            FROM backups
            WHERE (status = $1 OR status = $2) AND expires_at < $3
            ORDER BY expires_at ASC
            "#
        ))
        .bind(BackupStatus::Uploaded)
        .bind(BackupStatus::Failed)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expired backups")?;
        Ok(rows)
    }

    async fn delete(&self, user_id: Uuid, backup_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(r#"DELETE FROM backups WHERE user_id = $1 AND id = $2"#)
            .bind(user_id)
            .bind(backup_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete backup record")?;
        Ok(result.rows_affected() > 0)
    }
}
