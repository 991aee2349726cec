//! Collaborator contracts consumed by the orchestrators.
//!
//! These traits are the seams to the persistent record store, the token
//! store, the container orchestrator, and the notifier. deckhand-db
//! provides the Postgres implementations; tests substitute in-memory
//! ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    BackupRecord, BackupStatus, DownloadToken, NewBackupRecord, NewProject, Project,
    ProjectDetails, TokenResource,
};

/// CRUD plus status-guarded transitions over backup records.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn create(&self, record: NewBackupRecord) -> Result<BackupRecord, AppError>;

    async fn get_for_user(
        &self,
        user_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<BackupRecord>, AppError>;

    /// Conditional transition: updates the record only while its current
    /// status equals `expected`, returning the updated record, or `None`
    /// when the precondition failed (lost race or repeat call). Entering a
    /// terminal status stamps `processed_at`.
    async fn update_status_guarded(
        &self,
        backup_id: Uuid,
        expected: BackupStatus,
        next: BackupStatus,
    ) -> Result<Option<BackupRecord>, AppError>;

    /// Terminal failure: sets status FAILED, records the error message and
    /// `processed_at`.
    async fn mark_failed(&self, backup_id: Uuid, error_message: &str) -> Result<(), AppError>;

    /// Records eligible for the expiry sweep: expirable status and
    /// `expires_at` in the past.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<BackupRecord>, AppError>;

    /// Explicit user deletion of the record. The physical file and token
    /// revocation are the caller's responsibility.
    async fn delete(&self, user_id: Uuid, backup_id: Uuid) -> Result<bool, AppError>;
}

/// Persistence for download tokens. `consume` is the atomic unit backing
/// the broker's validate-and-consume; implementations must serialize it
/// against concurrent callers (row lock, transaction, or in-memory mutex).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &DownloadToken) -> Result<(), AppError>;

    /// Atomically validate and consume one token:
    /// - unknown token -> Ok(None)
    /// - expired token -> deleted, Ok(None)
    /// - already used (single-use) -> Ok(None)
    /// - valid single-use -> marked used, row returned
    /// - valid multi-use (resource policy or `allow_multi_use`) -> row
    ///   returned with `used` untouched
    async fn consume(
        &self,
        token: &str,
        allow_multi_use: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, AppError>;

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn delete_for_resource(
        &self,
        resource_type: TokenResource,
        resource_id: Uuid,
    ) -> Result<u64, AppError>;

    /// Sweep: tokens past expiry, and used tokens older than `used_before`.
    async fn delete_stale(
        &self,
        now: DateTime<Utc>,
        used_before: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}

/// Project records and their backup-relevant associations.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_details(&self, project_id: Uuid) -> Result<Option<ProjectDetails>, AppError>;

    async fn create_imported(&self, project: NewProject) -> Result<Project, AppError>;

    /// Mark a partially imported project as errored. Never deletes.
    async fn mark_error(&self, project_id: Uuid, message: &str) -> Result<(), AppError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError>;
}

/// Container orchestrator, treated as opaque pass/fail.
#[async_trait]
pub trait DeployOrchestrator: Send + Sync {
    async fn compose_up(&self, project_path: &Path) -> Result<(), AppError>;
}

/// Fire-and-forget events emitted at orchestrator completion.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifyEvent {
    ExportCompleted {
        user_id: Uuid,
        project_id: Uuid,
        backup_id: Uuid,
        filename: String,
    },
    ExportFailed {
        user_id: Uuid,
        project_id: Uuid,
        error: String,
    },
    ImportCompleted {
        user_id: Uuid,
        backup_id: Uuid,
        project_id: Uuid,
        slug: String,
    },
    ImportFailed {
        user_id: Uuid,
        backup_id: Uuid,
        error: String,
    },
}

/// Notification sink. Delivery failure must never fail the primary
/// operation, so the contract is infallible; implementations log and
/// swallow their own errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

/// Default no-op notifier.
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self, event: NotifyEvent) {
        tracing::debug!(?event, "Notification suppressed (no-op notifier)");
    }
}
