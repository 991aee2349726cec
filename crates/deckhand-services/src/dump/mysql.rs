//! MySQL/MariaDB dump driver.
//!
//! In-container `mysqldump` first, then a direct network dump. The
//! credential always travels through MYSQL_PWD, never through the
//! argument vector.

use std::path::Path;

use async_trait::async_trait;

use deckhand_core::models::{DatabaseDescriptor, DatabaseEngine};
use deckhand_core::EncryptionService;

use super::{
    container_name, discard_partial, dump_file_name, identifiers_are_safe, run_command,
    DumpDriver, DumpDriverConfig,
};

pub struct MysqlDumpDriver {
    config: DumpDriverConfig,
    secrets: EncryptionService,
}

impl MysqlDumpDriver {
    pub fn new(config: DumpDriverConfig, secrets: EncryptionService) -> Self {
        Self { config, secrets }
    }

    fn resolve_password(&self, db: &DatabaseDescriptor) -> Result<String, String> {
        match &db.password {
            Some(stored) => self
                .secrets
                .resolve(stored)
                .map_err(|e| format!("cannot resolve stored credential: {}", e)),
            None => Ok(String::new()),
        }
    }

    async fn dump_in_container(
        &self,
        db: &DatabaseDescriptor,
        out_path: &Path,
        project_slug: &str,
    ) -> Result<(), String> {
        let container = container_name(project_slug, DatabaseEngine::Mysql);
        let password = self.resolve_password(db)?;
        let password_env = format!("MYSQL_PWD={}", password);

        let output = run_command(
            &self.config.docker_bin,
            &[
                "exec",
                "--env",
                &password_env,
                &container,
                "mysqldump",
                "--single-transaction",
                "-u",
                &db.username,
                &db.database_name,
            ],
            &[],
            self.config.dump_timeout,
        )
        .await?;

        if !output.success {
            return Err(format!("mysqldump in container failed: {}", output.stderr));
        }
        if output.stdout.is_empty() {
            return Err("mysqldump in container produced no output".to_string());
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
        let password = self.resolve_password(db)?;
        let port = db.port.to_string();

        let output = run_command(
            "mysqldump",
            &[
                "--single-transaction",
                "-h",
                &db.host,
                "-P",
                &port,
                "-u",
                &db.username,
                &db.database_name,
            ],
            &[("MYSQL_PWD", password.as_str())],
            self.config.dump_timeout,
        )
        .await?;

        if !output.success {
            return Err(format!("mysqldump over network failed: {}", output.stderr));
        }

        tokio::fs::write(out_path, &output.stdout)
            .await
            .map_err(|e| format!("failed to write dump file: {}", e))
    }
}

#[async_trait]
impl DumpDriver for MysqlDumpDriver {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Mysql
    }

    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, project_slug: &str) {
        if !identifiers_are_safe(db) {
            return;
        }
        let out_path = dest_dir.join(dump_file_name(db));

        match self.dump_in_container(db, &out_path, project_slug).await {
            Ok(()) => {
                tracing::info!(database = %db.name, "MySQL dump completed in container");
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
                tracing::info!(database = %db.name, "MySQL dump completed over network");
            }
            Err(reason) => {
                let err = deckhand_core::AppError::Dump {
                    database: db.name.clone(),
                    message: reason,
                };
                tracing::warn!(error = %err, "MySQL dump failed, database omitted from export");
                discard_partial(&out_path).await;
            }
        }
    }
}
