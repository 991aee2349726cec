use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a backup record.
///
/// Uploaded archives travel `Uploaded -> Processing -> Imported | Failed`;
/// export archives are created directly as `Exported`. The expiry sweep
/// moves stale `Uploaded`/`Failed` records to `Expired`. Deletion is an
/// explicit user action on the record, not a status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Uploaded,
    Processing,
    Imported,
    Failed,
    Exported,
    Expired,
}

impl Display for BackupStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackupStatus::Uploaded => write!(f, "uploaded"),
            BackupStatus::Processing => write!(f, "processing"),
            BackupStatus::Imported => write!(f, "imported"),
            BackupStatus::Failed => write!(f, "failed"),
            BackupStatus::Exported => write!(f, "exported"),
            BackupStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for BackupStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(BackupStatus::Uploaded),
            "processing" => Ok(BackupStatus::Processing),
            "imported" => Ok(BackupStatus::Imported),
            "failed" => Ok(BackupStatus::Failed),
            "exported" => Ok(BackupStatus::Exported),
            "expired" => Ok(BackupStatus::Expired),
            _ => Err(anyhow::anyhow!("Invalid backup status: {}", s)),
        }
    }
}

impl BackupStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupStatus::Imported | BackupStatus::Exported | BackupStatus::Expired
        )
    }

    /// Transition predicate. Repositories enforce this with conditional
    /// updates; orchestrators consult it before attempting a claim.
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        matches!(
            (self, next),
            (BackupStatus::Uploaded, BackupStatus::Processing)
                | (BackupStatus::Processing, BackupStatus::Imported)
                | (BackupStatus::Processing, BackupStatus::Failed)
                | (BackupStatus::Uploaded, BackupStatus::Expired)
                | (BackupStatus::Failed, BackupStatus::Expired)
        )
    }

    /// Statuses eligible for the expiry sweep.
    pub fn is_expirable(&self) -> bool {
        matches!(self, BackupStatus::Uploaded | BackupStatus::Failed)
    }
}

/// One backup artifact: an uploaded archive awaiting import, or the
/// output of a project export. The record is the single source of truth
/// for whether the physical file at `filepath` is still expected to exist.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Storage name on the uploads volume.
    pub filename: String,
    /// User-facing name, used for Content-Disposition on download.
    pub original_name: String,
    /// Absolute path on the storage volume.
    pub filepath: String,
    pub size: i64,
    pub mime_type: String,
    pub status: BackupStatus,
    /// Project this backup was exported from or imported into.
    pub project_id: Option<Uuid>,
    pub notes: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// External-storage reference (e.g. a drive file id) when mirrored.
    pub drive_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to persist a new backup record.
#[derive(Debug, Clone)]
pub struct NewBackupRecord {
    pub user_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub filepath: String,
    pub size: i64,
    pub mime_type: String,
    pub status: BackupStatus,
    pub project_id: Option<Uuid>,
    pub notes: Option<String>,
    pub expires_at: DateTime<Utc>,
}
