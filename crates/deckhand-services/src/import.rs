//! Backup import orchestration.
//!
//! Claims an uploaded backup record with a status-guarded transition,
//! extracts it safely, prunes build artifacts, creates the project
//! record, and optionally deploys it. Every failure path lands the
//! record in FAILED with an error message; a project created before the
//! failure is marked errored, never deleted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use deckhand_core::models::{BackupRecord, BackupStatus, NewProject, Project, Requester};
use deckhand_core::stores::{BackupStore, DeployOrchestrator, Notifier, NotifyEvent, ProjectStore};
use deckhand_core::validation::{derive_slug, generate_secret};
use deckhand_core::AppError;

use crate::archive::analyze::COMPOSE_FILE_NAMES;
use crate::archive::{ArchiveAnalyzer, SecureArchiveExtractor};

#[derive(Clone)]
pub struct ImportConfig {
    /// Root under which imported projects are extracted.
    pub projects_root: PathBuf,
}

pub struct ImportOrchestrator {
    backups: Arc<dyn BackupStore>,
    projects: Arc<dyn ProjectStore>,
    deploy: Arc<dyn DeployOrchestrator>,
    notifier: Arc<dyn Notifier>,
    config: ImportConfig,
}

impl ImportOrchestrator {
    pub fn new(
        backups: Arc<dyn BackupStore>,
        projects: Arc<dyn ProjectStore>,
        deploy: Arc<dyn DeployOrchestrator>,
        notifier: Arc<dyn Notifier>,
        config: ImportConfig,
    ) -> Self {
        Self {
            backups,
            projects,
            deploy,
            notifier,
            config,
        }
    }

    /// Import one uploaded backup into a new project.
    #[tracing::instrument(skip(self, requester, project_name), fields(user_id = %requester.user_id))]
    pub async fn import_backup(
        &self,
        backup_id: Uuid,
        requester: &Requester,
        project_name: Option<String>,
    ) -> Result<Project, AppError> {
        let record = self
            .backups
            .get_for_user(requester.user_id, backup_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Backup {} not found", backup_id)))?;

        if record.status != BackupStatus::Uploaded {
            return Err(AppError::Validation(
                "Backup already processed".to_string(),
            ));
        }

        // Claim the record; a concurrent import loses this race cleanly.
        let record = self
            .backups
            .update_status_guarded(backup_id, BackupStatus::Uploaded, BackupStatus::Processing)
            .await?
            .ok_or_else(|| AppError::Validation("Backup already processed".to_string()))?;

        tracing::info!(backup_id = %backup_id, "Starting backup import");

        let mut created_project: Option<Project> = None;
        let result = self
            .run_pipeline(&record, requester, project_name, &mut created_project)
            .await;

        match result {
            Ok(project) => {
                self.backups
                    .update_status_guarded(
                        backup_id,
                        BackupStatus::Processing,
                        BackupStatus::Imported,
                    )
                    .await?;
                self.notifier
                    .notify(NotifyEvent::ImportCompleted {
                        user_id: requester.user_id,
                        backup_id,
                        project_id: project.id,
                        slug: project.slug.clone(),
                    })
                    .await;
                tracing::info!(backup_id = %backup_id, slug = %project.slug, "Backup import completed");
                Ok(project)
            }
            Err(e) => {
                if let Some(project) = &created_project {
                    // The project already exists on disk and in the store;
                    // leave it inspectable instead of deleting it.
                    if let Err(mark_err) =
                        self.projects.mark_error(project.id, &e.to_string()).await
                    {
                        tracing::error!(
                            project_id = %project.id,
                            error = %mark_err,
                            "Failed to mark partially imported project as errored"
                        );
                    }
                }
                if let Err(fail_err) = self.backups.mark_failed(backup_id, &e.to_string()).await {
                    tracing::error!(
                        backup_id = %backup_id,
                        error = %fail_err,
                        "Failed to record import failure"
                    );
                }
                self.notifier
                    .notify(NotifyEvent::ImportFailed {
                        user_id: requester.user_id,
                        backup_id,
                        error: e.client_message(),
                    })
                    .await;
                tracing::warn!(backup_id = %backup_id, error = %e, "Backup import failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        record: &BackupRecord,
        requester: &Requester,
        project_name: Option<String>,
        created_project: &mut Option<Project>,
    ) -> Result<Project, AppError> {
        let display_name = project_name.unwrap_or_else(|| {
            Path::new(&record.original_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| record.original_name.clone())
        });
        let slug = self.unique_slug(&display_name).await?;
        let extract_dir = self.config.projects_root.join(&slug);

        SecureArchiveExtractor::extract(Path::new(&record.filepath), &extract_dir).await?;

        let analysis = ArchiveAnalyzer::analyze(&extract_dir).await?;
        ArchiveAnalyzer::cleanup_extracted_dir(&extract_dir, &analysis.files_to_cleanup).await?;

        let project = self
            .projects
            .create_imported(NewProject {
                owner_id: requester.user_id,
                name: display_name,
                slug: slug.clone(),
                path: extract_dir.to_string_lossy().into_owned(),
                template: analysis.framework.clone(),
            })
            .await?;
        *created_project = Some(project.clone());

        // Deploy only when the tree ships a deployment descriptor.
        if has_compose_file(&extract_dir) {
            synthesize_env_file(&extract_dir).await?;
            self.deploy.compose_up(&extract_dir).await?;
        }

        Ok(project)
    }

    /// Slug from the requested name, disambiguated with a random suffix
    /// and re-checked against the project store.
    async fn unique_slug(&self, display_name: &str) -> Result<String, AppError> {
        for _ in 0..5 {
            let candidate = derive_slug(display_name);
            if !self.projects.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AppError::Internal(
            "Could not derive a unique project slug".to_string(),
        ))
    }
}

fn has_compose_file(dir: &Path) -> bool {
    COMPOSE_FILE_NAMES.iter().any(|name| dir.join(name).is_file())
}

/// Secret-looking keys in synthesized environments get fresh high-entropy
/// values; everything else is carried over from the example file.
fn key_looks_secret(key: &str) -> bool {
    let upper = key.to_uppercase();
    ["SECRET", "PASSWORD", "TOKEN", "_KEY", "PASS"]
        .iter()
        .any(|marker| upper.contains(marker))
}

/// Ensure a `.env` exists before deployment: reuse the shipped one, or
/// synthesize from `.env.example` with placeholder secrets replaced, or
/// fall back to a minimal default.
async fn synthesize_env_file(dir: &Path) -> Result<(), AppError> {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        return Ok(());
    }

    let example_path = dir.join(".env.example");
    let contents = if example_path.is_file() {
        let example = tokio::fs::read_to_string(&example_path).await?;
        let mut lines = Vec::new();
        for line in example.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(line.to_string());
                continue;
            }
            match line.split_once('=') {
                Some((key, _)) if key_looks_secret(key.trim()) => {
                    lines.push(format!("{}={}", key.trim_end(), generate_secret()));
                }
                _ => lines.push(line.to_string()),
            }
        }
        lines.join("\n") + "\n"
    } else {
        "NODE_ENV=production\n".to_string()
    };

    tokio::fs::write(&env_path, contents).await?;
    tracing::info!(path = %env_path.display(), "Synthesized environment file for deployment");
    Ok(())
}
