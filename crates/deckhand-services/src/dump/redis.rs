//! Redis dump driver.
//!
//! Triggers a synchronous SAVE inside the container, then copies the
//! resulting RDB snapshot out of the container filesystem.

use std::path::Path;

use async_trait::async_trait;

use deckhand_core::models::{DatabaseDescriptor, DatabaseEngine};

use super::{
    container_name, discard_partial, dump_file_name, identifiers_are_safe, run_command,
    DumpDriver, DumpDriverConfig,
};

/// Default on-disk snapshot location inside the official Redis image.
const CONTAINER_RDB_PATH: &str = "/data/dump.rdb";

pub struct RedisDumpDriver {
    config: DumpDriverConfig,
}

impl RedisDumpDriver {
    pub fn new(config: DumpDriverConfig) -> Self {
        Self { config }
    }

    async fn snapshot(&self, out_path: &Path, project_slug: &str) -> Result<(), String> {
        let container = container_name(project_slug, DatabaseEngine::Redis);

        let save = run_command(
            &self.config.docker_bin,
            &["exec", &container, "redis-cli", "SAVE"],
            &[],
            self.config.dump_timeout,
        )
        .await?;
        if !save.success || !String::from_utf8_lossy(&save.stdout).contains("OK") {
            return Err(format!("redis SAVE failed: {}", save.stderr));
        }

        let copy_src = format!("{}:{}", container, CONTAINER_RDB_PATH);
        let out = out_path.to_string_lossy();
        let copy = run_command(
            &self.config.docker_bin,
            &["cp", &copy_src, &out],
            &[],
            self.config.snapshot_copy_timeout,
        )
        .await?;
        if !copy.success {
            return Err(format!("docker cp of RDB snapshot failed: {}", copy.stderr));
        }

        Ok(())
    }
}

#[async_trait]
impl DumpDriver for RedisDumpDriver {
    fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::Redis
    }

    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, project_slug: &str) {
        if !identifiers_are_safe(db) {
            return;
        }
        let out_path = dest_dir.join(dump_file_name(db));

        match self.snapshot(&out_path, project_slug).await {
            Ok(()) => {
                tracing::info!(database = %db.name, "Redis snapshot copied from container");
            }
            Err(reason) => {
                let err = deckhand_core::AppError::Dump {
                    database: db.name.clone(),
                    message: reason,
                };
                tracing::warn!(error = %err, "Redis dump failed, database omitted from export");
                discard_partial(&out_path).await;
            }
        }
    }
}
