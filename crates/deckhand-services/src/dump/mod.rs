//! Per-engine database dump drivers.
//!
//! Each driver produces a point-in-time export of one database into the
//! export workspace. Drivers never raise to the orchestrator: an internal
//! failure is logged and the driver returns without output, leaving a
//! missing dump file as the only trace. The export continues with the
//! remaining databases.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use deckhand_core::models::{DatabaseDescriptor, DatabaseEngine};
use deckhand_core::EncryptionService;

pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod redis;

pub use mongodb::MongoDumpDriver;
pub use mysql::MysqlDumpDriver;
pub use postgres::PostgresDumpDriver;
pub use redis::RedisDumpDriver;

/// Shared driver settings.
#[derive(Clone)]
pub struct DumpDriverConfig {
    pub docker_bin: String,
    /// Timeout for dump tool invocations.
    pub dump_timeout: Duration,
    /// Timeout for snapshot copy operations (docker cp).
    pub snapshot_copy_timeout: Duration,
}

impl Default for DumpDriverConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            dump_timeout: Duration::from_secs(300),
            snapshot_copy_timeout: Duration::from_secs(30),
        }
    }
}

/// A component that knows how to export one database engine.
#[async_trait]
pub trait DumpDriver: Send + Sync {
    fn engine(&self) -> DatabaseEngine;

    /// Produce a dump of `db` into `dest_dir`. Never raises: failures are
    /// logged and the output file is simply absent afterwards.
    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, project_slug: &str);
}

/// Registry of dump drivers keyed by engine.
pub struct DumpDriverRegistry {
    drivers: HashMap<DatabaseEngine, Arc<dyn DumpDriver>>,
}

impl DumpDriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with all built-in drivers.
    pub fn with_defaults(config: DumpDriverConfig, secrets: EncryptionService) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresDumpDriver::new(
            config.clone(),
            secrets.clone(),
        )));
        registry.register(Arc::new(MysqlDumpDriver::new(
            config.clone(),
            secrets.clone(),
        )));
        registry.register(Arc::new(MongoDumpDriver::new(config.clone())));
        registry.register(Arc::new(RedisDumpDriver::new(config)));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn DumpDriver>) {
        self.drivers.insert(driver.engine(), driver);
    }

    /// Dispatch one database to its driver. Unsupported engines are
    /// logged and skipped, matching the drivers' soft-failure contract.
    pub async fn dump_database(
        &self,
        db: &DatabaseDescriptor,
        dest_dir: &Path,
        project_slug: &str,
    ) {
        match self.drivers.get(&db.engine) {
            Some(driver) => driver.dump(db, dest_dir, project_slug).await,
            None => {
                tracing::warn!(
                    database = %db.name,
                    engine = %db.engine,
                    "No dump driver registered for engine, skipping database"
                );
            }
        }
    }
}

impl Default for DumpDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the dump artifact inside the export archive:
/// `<dbName>-<engine>.<ext>`.
pub fn dump_file_name(db: &DatabaseDescriptor) -> String {
    format!("{}-{}.{}", db.name, db.engine, db.engine.dump_extension())
}

/// Container name convention for a project's database container.
pub fn container_name(project_slug: &str, engine: DatabaseEngine) -> String {
    format!("{}-{}", project_slug, engine)
}

/// Outcome of one external invocation.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub success: bool,
}

/// Run an argument-vector command with an explicit timeout, capturing
/// output. Timeouts and spawn failures come back as Err; a non-zero exit
/// is a successful run with `success == false`.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<CommandOutput, String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let result = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| format!("timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    Ok(CommandOutput {
        stdout: result.stdout,
        stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        success: result.status.success(),
    })
}

/// Identifier gate shared by all drivers: both the logical database name
/// and the username must pass the allow-list before they are placed into
/// any argument vector.
pub(crate) fn identifiers_are_safe(db: &DatabaseDescriptor) -> bool {
    if !deckhand_core::validation::is_safe_identifier(&db.database_name) {
        tracing::warn!(
            database = %db.name,
            "Rejecting database with unsafe database name, skipping dump"
        );
        return false;
    }
    if !deckhand_core::validation::is_safe_identifier(&db.username) {
        tracing::warn!(
            database = %db.name,
            "Rejecting database with unsafe username, skipping dump"
        );
        return false;
    }
    true
}

/// Remove a partial dump artifact after a failed attempt.
pub(crate) async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial dump file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn descriptor(engine: DatabaseEngine) -> DatabaseDescriptor {
        DatabaseDescriptor {
            id: Uuid::new_v4(),
            name: "main".into(),
            engine,
            database_name: "shop_production".into(),
            username: "shop".into(),
            password: None,
            host: "127.0.0.1".into(),
            port: 5432,
        }
    }

    #[test]
    fn test_dump_file_names() {
        assert_eq!(
            dump_file_name(&descriptor(DatabaseEngine::Postgres)),
            "main-postgres.sql"
        );
        assert_eq!(
            dump_file_name(&descriptor(DatabaseEngine::Mongodb)),
            "main-mongodb.archive"
        );
        assert_eq!(
            dump_file_name(&descriptor(DatabaseEngine::Redis)),
            "main-redis.rdb"
        );
    }

    #[test]
    fn test_container_name_convention() {
        assert_eq!(
            container_name("shop", DatabaseEngine::Postgres),
            "shop-postgres"
        );
        assert_eq!(container_name("blog-2", DatabaseEngine::Redis), "blog-2-redis");
    }

    #[test]
    fn test_identifier_gate() {
        let mut db = descriptor(DatabaseEngine::Postgres);
        assert!(identifiers_are_safe(&db));

        db.database_name = "shop; DROP TABLE users".into();
        assert!(!identifiers_are_safe(&db));

        db.database_name = "shop_production".into();
        db.username = "user `whoami`".into();
        assert!(!identifiers_are_safe(&db));
    }

    #[tokio::test]
    async fn test_unsupported_engine_is_skipped() {
        // Empty registry: dispatch must neither panic nor create output
        let registry = DumpDriverRegistry::new();
        let dir = tempfile::TempDir::new().unwrap();
        registry
            .dump_database(&descriptor(DatabaseEngine::Postgres), dir.path(), "shop")
            .await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let result = run_command("sleep", &["5"], &[], Duration::from_millis(100)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_captures_exit() {
        let ok = run_command("true", &[], &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(ok.success);

        let bad = run_command("false", &[], &[], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!bad.success);
    }
}
