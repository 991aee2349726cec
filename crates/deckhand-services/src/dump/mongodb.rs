//! MongoDB dump driver.
//!
//! Runs `mongodump` inside the project's container against a temp archive
//! path, then copies the snapshot out of the container filesystem.

use std::path::Path;

use async_trait::async_trait;

use deckhand_core::models::{DatabaseDescriptor, DatabaseEngine};

use super::{
    container_name, discard_partial, dump_file_name, identifiers_are_safe, run_command,
    DumpDriver, DumpDriverConfig,
};

pub struct MongoDumpDriver {
    config: DumpDriverConfig,
}

impl MongoDumpDriver {
    pub fn new(config: DumpDriverConfig) -> Self {
        Self { config }
    }

    async fn snapshot(
        &self,
        db: &DatabaseDescriptor,
        out_path: &Path,
        project_slug: &str,
    ) -> Result<(), String> {
        let container = container_name(project_slug, DatabaseEngine::Mongodb);
        let container_tmp = format!("/tmp/{}", dump_file_name(db));
        let archive_arg = format!("--archive={}", container_tmp);

        let output = run_command(
            &self.config.docker_bin,
            &[
                "exec",
                &container,
                "mongodump",
                "--db",
                &db.database_name,
                &archive_arg,
            ],
            &[],
            self.config.dump_timeout,
        )
        .await?;
        if !output.success {
            return Err(format!("mongodump in container failed: {}", output.stderr));
        }

        let copy_src = format!("{}:{}", container, container_tmp);
        let out = out_path.to_string_lossy();
        let copy = run_command(
            &self.config.docker_bin,
            &["cp", &copy_src, &out],
            &[],
            self.config.snapshot_copy_timeout,
        )
        .await?;
        if !copy.success {
            return Err(format!("docker cp of mongo archive failed: {}", copy.stderr));
        }

        // Best-effort cleanup of the in-container temp file
        let _ = run_command(
            &self.config.docker_bin,
            &["exec", &container, "rm", "-f", &container_tmp],
            &[],
            self.config.snapshot_copy_timeout,
        )
        .await;

        Ok(())
    }
}

#[async_trait]
impl DumpDriver for MongoDumpDriver {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Mongodb
    }

    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, project_slug: &str) {
        if !identifiers_are_safe(db) {
            return;
        }
        let out_path = dest_dir.join(dump_file_name(db));

        match self.snapshot(db, &out_path, project_slug).await {
            Ok(()) => {
                tracing::info!(database = %db.name, "MongoDB snapshot copied from container");
            }
            Err(reason) => {
                let err = deckhand_core::AppError::Dump {
                    database: db.name.clone(),
                    message: reason,
                };
                tracing::warn!(error = %err, "MongoDB dump failed, database omitted from export");
                discard_partial(&out_path).await;
            }
        }
    }
}
