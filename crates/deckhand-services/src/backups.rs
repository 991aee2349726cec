//! User-facing backup record maintenance.
//!
//! Deletion is an explicit action, not a lifecycle transition: it removes
//! the record, the physical archive, and every outstanding download
//! token pointing at it.

use std::sync::Arc;

use uuid::Uuid;

use deckhand_core::models::{Requester, TokenResource};
use deckhand_core::stores::BackupStore;
use deckhand_core::AppError;

use crate::token::DownloadTokenBroker;

pub struct BackupService {
    backups: Arc<dyn BackupStore>,
    broker: Arc<DownloadTokenBroker>,
}

impl BackupService {
    pub fn new(backups: Arc<dyn BackupStore>, broker: Arc<DownloadTokenBroker>) -> Self {
        Self { backups, broker }
    }

    /// Delete one backup: file first (best effort), then record, then
    /// token revocation so no dangling capability survives the record.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn delete_backup(
        &self,
        requester: &Requester,
        backup_id: Uuid,
    ) -> Result<(), AppError> {
        let record = self
            .backups
            .get_for_user(requester.user_id, backup_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Backup {} not found", backup_id)))?;

        if let Err(e) = tokio::fs::remove_file(&record.filepath).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    backup_id = %backup_id,
                    error = %e,
                    "Failed to delete backup file, removing record anyway"
                );
            }
        }

        self.backups.delete(requester.user_id, backup_id).await?;
        self.broker
            .revoke_for_resource(TokenResource::Backup, backup_id)
            .await?;

        tracing::info!(backup_id = %backup_id, "Backup deleted");
        Ok(())
    }
}
