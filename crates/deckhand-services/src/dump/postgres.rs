//! PostgreSQL dump driver.
//!
//! Prefers `pg_dump` inside the project's own database container, where
//! local peer auth needs no password. Falls back to a direct network
//! dump with the stored credential passed via PGPASSWORD.

use std::path::Path;

use async_trait::async_trait;

use deckhand_core::models::{DatabaseDescriptor, DatabaseEngine};
use deckhand_core::EncryptionService;

use super::{
    container_name, discard_partial, dump_file_name, identifiers_are_safe, run_command,
    DumpDriver, DumpDriverConfig,
};

pub struct PostgresDumpDriver {
    config: DumpDriverConfig,
    secrets: EncryptionService,
}

impl PostgresDumpDriver {
    pub fn new(config: DumpDriverConfig, secrets: EncryptionService) -> Self {
        Self { config, secrets }
    }

    async fn dump_in_container(
        &self,
        db: &DatabaseDescriptor,
        out_path: &Path,
        project_slug: &str,
    ) -> Result<(), String> {
        let container = container_name(project_slug, DatabaseEngine::Postgres);
        let output = run_command(
            &self.config.docker_bin,
            &[
                "exec",
                &container,
                "pg_dump",
                "-U",
                &db.username,
                "-d",
                &db.database_name,
                "--no-owner",
                "--no-privileges",
            ],
            &[],
            self.config.dump_timeout,
        )
        .await?;

        if !output.success {
            return Err(format!("pg_dump in container failed: {}", output.stderr));
        }
        if output.stdout.is_empty() {
            return Err("pg_dump in container produced no output".to_string());
        }

        tokio::fs::write(out_path, &output.stdout)
            .await
            .map_err(|e| format!("failed to write dump file: {}", e))
    }

    async fn dump_over_network(
        &self,
        db: &DatabaseDescriptor,
        out_path: &Path,
    ) -> Result<(), String> {
        let password = match &db.password {
            Some(stored) => self
                .secrets
                .resolve(stored)
                .map_err(|e| format!("cannot resolve stored credential: {}", e))?,
            None => String::new(),
        };
        let port = db.port.to_string();

        let output = run_command(
            "pg_dump",
            &[
                "-h",
                &db.host,
                "-p",
                &port,
                "-U",
                &db.username,
                "-d",
                &db.database_name,
                "--no-owner",
                "--no-privileges",
            ],
            &[("PGPASSWORD", password.as_str())],
            self.config.dump_timeout,
        )
        .await?;

        if !output.success {
            return Err(format!("pg_dump over network failed: {}", output.stderr));
        }

        tokio::fs::write(out_path, &output.stdout)
            .await
            .map_err(|e| format!("failed to write dump file: {}", e))
    }
}

#[async_trait]
impl DumpDriver for PostgresDumpDriver {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Postgres
    }

    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, project_slug: &str) {
        if !identifiers_are_safe(db) {
            return;
        }
        let out_path = dest_dir.join(dump_file_name(db));

        match self.dump_in_container(db, &out_path, project_slug).await {
            Ok(()) => {
                tracing::info!(database = %db.name, "PostgreSQL dump completed in container");
                return;
            }
            Err(reason) => {
                tracing::debug!(
                    database = %db.name,
                    reason = %reason,
                    "In-container dump unavailable, trying direct connection"
                );
            }
        }

        match self.dump_over_network(db, &out_path).await {
            Ok(()) => {
                tracing::info!(database = %db.name, "PostgreSQL dump completed over network");
            }
            Err(reason) => {
                let err = deckhand_core::AppError::Dump {
                    database: db.name.clone(),
                    message: reason,
                };
                tracing::warn!(error = %err, "PostgreSQL dump failed, database omitted from export");
                discard_partial(&out_path).await;
            }
        }
    }
}
