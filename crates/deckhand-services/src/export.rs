//! Project export orchestration.
//!
//! Stages an isolated workspace, copies the project tree (minus build
//! artifacts), fans out database dumps with bounded concurrency, writes
//! the manifest, packs everything into a tar.gz with a checksum, persists
//! the backup record and mints a download token. Any failure after
//! staging tears down the workspace and the partial archive before the
//! error reaches the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use deckhand_core::models::{
    BackupManifest, BackupRecord, BackupStatus, IssuedToken, NewBackupRecord, ProjectDetails,
    Requester, TokenResource,
};
use deckhand_core::stores::{BackupStore, Notifier, NotifyEvent, ProjectStore};
use deckhand_core::AppError;

use crate::archive::{ArchiveAnalyzer, PackOutput, Packer};
use crate::dump::DumpDriverRegistry;
use crate::token::DownloadTokenBroker;

#[derive(Clone)]
pub struct ExportConfig {
    /// Root for per-export staging workspaces.
    pub temp_root: PathBuf,
    /// Directory receiving packed archives. Must exist; the panel's
    /// bootstrap creates it alongside the uploads volume.
    pub output_root: PathBuf,
    /// Lifetime of the resulting backup record.
    pub backup_expiry: Duration,
    /// Lifetime of the minted download token.
    pub token_ttl: Duration,
    /// How many dump drivers run at once. Tunable per deployment; disk
    /// bound hosts want it low.
    pub dump_concurrency: usize,
}

/// Returned to the caller on success.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub record: BackupRecord,
    pub token: IssuedToken,
    /// SHA-256 of the packed archive, hex encoded.
    pub checksum: String,
}

pub struct ExportOrchestrator {
    backups: Arc<dyn BackupStore>,
    projects: Arc<dyn ProjectStore>,
    registry: Arc<DumpDriverRegistry>,
    broker: Arc<DownloadTokenBroker>,
    notifier: Arc<dyn Notifier>,
    config: ExportConfig,
}

impl ExportOrchestrator {
    pub fn new(
        backups: Arc<dyn BackupStore>,
        projects: Arc<dyn ProjectStore>,
        registry: Arc<DumpDriverRegistry>,
        broker: Arc<DownloadTokenBroker>,
        notifier: Arc<dyn Notifier>,
        config: ExportConfig,
    ) -> Self {
        Self {
            backups,
            projects,
            registry,
            broker,
            notifier,
            config,
        }
    }

    /// Export one project into a downloadable archive.
    #[tracing::instrument(skip(self, requester, notes), fields(user_id = %requester.user_id))]
    pub async fn export_project(
        &self,
        project_id: Uuid,
        requester: &Requester,
        notes: Option<String>,
    ) -> Result<ExportOutcome, AppError> {
        let details = self
            .projects
            .get_details(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", project_id)))?;

        if !details.authorizes(requester) {
            return Err(AppError::Forbidden(
                "Not authorized to export this project".to_string(),
            ));
        }

        let project_dir = PathBuf::from(&details.project.path);
        if !project_dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "Working directory for project {} does not exist",
                details.project.slug
            )));
        }

        let now = Utc::now();
        let stamp = now.format("%Y%m%d-%H%M%S").to_string();
        let workspace = self
            .config
            .temp_root
            .join(format!("{}-{}", details.project.slug, now.timestamp_millis()));
        let filename = format!("{}-backup-{}.tar.gz", details.project.slug, stamp);
        let out_path = self.config.output_root.join(&filename);

        tracing::info!(
            project = %details.project.slug,
            workspace = %workspace.display(),
            "Starting project export"
        );

        let staged = self
            .run_staged(&details, &project_dir, &workspace, &out_path)
            .await;

        // The workspace is transient either way; only the packed archive
        // survives a successful run.
        remove_dir_best_effort(&workspace).await;

        let pack = match staged {
            Ok(pack) => pack,
            Err(e) => {
                remove_file_best_effort(&out_path).await;
                self.notifier
                    .notify(NotifyEvent::ExportFailed {
                        user_id: requester.user_id,
                        project_id,
                        error: e.client_message(),
                    })
                    .await;
                return Err(e);
            }
        };

        let record = self
            .backups
            .create(NewBackupRecord {
                user_id: requester.user_id,
                filename: filename.clone(),
                original_name: filename.clone(),
                filepath: out_path.to_string_lossy().into_owned(),
                size: pack.size as i64,
                mime_type: "application/gzip".to_string(),
                status: BackupStatus::Exported,
                project_id: Some(project_id),
                notes,
                expires_at: Utc::now()
                    + chrono::Duration::from_std(self.config.backup_expiry)
                        .map_err(|e| AppError::Internal(format!("Invalid expiry: {}", e)))?,
            })
            .await?;

        let token = self
            .broker
            .issue(
                requester.user_id,
                TokenResource::Backup,
                record.id,
                &record.filepath,
                Some(self.config.token_ttl),
            )
            .await?;

        self.notifier
            .notify(NotifyEvent::ExportCompleted {
                user_id: requester.user_id,
                project_id,
                backup_id: record.id,
                filename: record.filename.clone(),
            })
            .await;

        tracing::info!(
            project = %details.project.slug,
            backup_id = %record.id,
            size = pack.size,
            "Project export completed"
        );

        Ok(ExportOutcome {
            record,
            token,
            checksum: pack.sha256,
        })
    }

    /// Steps 3-7: everything that must be undone on failure.
    async fn run_staged(
        &self,
        details: &ProjectDetails,
        project_dir: &Path,
        workspace: &Path,
        out_path: &Path,
    ) -> Result<PackOutput, AppError> {
        let project_copy = workspace.join("project");
        let databases_dir = workspace.join("databases");
        tokio::fs::create_dir_all(&project_copy).await?;
        tokio::fs::create_dir_all(&databases_dir).await?;

        copy_tree(project_dir, &project_copy).await?;
        prune_copied_tree(&project_copy).await?;

        self.dump_databases(details, &databases_dir).await;

        let manifest = BackupManifest::for_project(details, Utc::now());
        tokio::fs::write(
            workspace.join("manifest.json"),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        Packer::pack_tar_gz(workspace, out_path).await
    }

    /// Fan out dump drivers with bounded concurrency. A failing driver
    /// leaves its file missing; it never aborts siblings or the export.
    async fn dump_databases(&self, details: &ProjectDetails, databases_dir: &Path) {
        let width = self.config.dump_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(width));
        let mut handles = Vec::with_capacity(details.databases.len());

        for db in &details.databases {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed; cannot happen here
            };
            let registry = self.registry.clone();
            let db = db.clone();
            let dest = databases_dir.to_path_buf();
            let slug = details.project.slug.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                registry.dump_database(&db, &dest, &slug).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dump task panicked; its database is omitted");
            }
        }
    }
}

/// Recursive copy that never follows symlinks and never mutates `src`.
async fn copy_tree(src: &Path, dst: &Path) -> Result<(), AppError> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if file_type.is_dir() {
                stack.push((entry.path(), target));
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

/// Drop denylisted directories and `*.log` files from the copied tree.
async fn prune_copied_tree(root: &Path) -> Result<(), AppError> {
    let analysis = ArchiveAnalyzer::analyze(root).await?;
    ArchiveAnalyzer::cleanup_extracted_dir(root, &analysis.files_to_cleanup).await?;

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("log") {
                tokio::fs::remove_file(&path).await.ok();
            }
        }
    }
    Ok(())
}

async fn remove_dir_best_effort(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp workspace");
        }
    }
}

async fn remove_file_best_effort(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial archive");
        }
    }
}
