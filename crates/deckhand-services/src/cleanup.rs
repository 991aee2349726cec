//! Periodic expiry sweep for backup records and download tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;

use deckhand_core::stores::BackupStore;
use deckhand_core::AppError;

use crate::token::DownloadTokenBroker;

#[derive(Clone)]
pub struct CleanupServiceConfig {
    pub interval: Duration,
    /// Retention window for used tokens before the sweep deletes them.
    pub token_used_retention: Duration,
}

impl Default for CleanupServiceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            token_used_retention: Duration::from_secs(6 * 3600),
        }
    }
}

pub struct CleanupService {
    backups: Arc<dyn BackupStore>,
    broker: Arc<DownloadTokenBroker>,
    config: CleanupServiceConfig,
}

impl CleanupService {
    pub fn new(
        backups: Arc<dyn BackupStore>,
        broker: Arc<DownloadTokenBroker>,
        config: CleanupServiceConfig,
    ) -> Self {
        Self {
            backups,
            broker,
            config,
        }
    }

    /// Start the background sweep. Returns a JoinHandle for shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.config.interval);

            loop {
                sweep_interval.tick().await;

                tracing::info!("Starting scheduled cleanup of expired backups and tokens");

                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Cleanup sweep failed");
                }
            }
        })
    }

    /// One full sweep: expire stale backup records, then prune tokens.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<(), AppError> {
        let backups = match self.expire_backups().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to expire stale backups");
                0
            }
        };

        let tokens = match self.broker.sweep(self.config.token_used_retention).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to sweep download tokens");
                0
            }
        };

        tracing::info!(backups, tokens, "Cleanup sweep completed");
        Ok(())
    }

    /// Flip expired UPLOADED/FAILED records to EXPIRED, deleting the
    /// physical file first. A file that will not delete is logged and the
    /// status still flips; the record stops claiming the file exists.
    async fn expire_backups(&self) -> Result<usize, AppError> {
        let expired = self.backups.list_expired(Utc::now()).await?;
        let mut flipped = 0usize;

        for record in expired {
            tracing::info!(
                backup_id = %record.id,
                filepath = %record.filepath,
                expires_at = %record.expires_at,
                "Expiring backup"
            );

            if let Err(e) = tokio::fs::remove_file(&record.filepath).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        backup_id = %record.id,
                        error = %e,
                        "Failed to delete expired backup file, expiring record anyway"
                    );
                }
            }

            match self
                .backups
                .update_status_guarded(
                    record.id,
                    record.status,
                    deckhand_core::models::BackupStatus::Expired,
                )
                .await
            {
                Ok(Some(_)) => flipped += 1,
                Ok(None) => {
                    tracing::debug!(backup_id = %record.id, "Backup changed status mid-sweep, skipped");
                }
                Err(e) => {
                    tracing::error!(backup_id = %record.id, error = %e, "Failed to expire backup record");
                }
            }
        }

        Ok(flipped)
    }
}
