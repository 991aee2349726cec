//! Configuration module
//!
//! Environment-driven configuration for the backup subsystem: storage
//! roots, token/backup lifetimes, dump concurrency and timeouts, and the
//! optional webhook notification endpoint.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

// Defaults
const DEFAULT_UPLOADS_ROOT: &str = "/var/lib/deckhand/uploads";
const DEFAULT_TEMP_ROOT: &str = "/var/lib/deckhand/tmp";
const DEFAULT_PROJECTS_ROOT: &str = "/var/lib/deckhand/projects";
const DOWNLOAD_TOKEN_TTL_SECS: u64 = 900; // 15 minutes
const BACKUP_EXPIRY_SECS: u64 = 1800; // 30 minutes
const TOKEN_USED_RETENTION_SECS: u64 = 6 * 3600;
const EXPORT_DUMP_CONCURRENCY: usize = 3;
const DUMP_TIMEOUT_SECS: u64 = 300;
const SNAPSHOT_COPY_TIMEOUT_SECS: u64 = 30;
const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Application configuration for the backup subsystem.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory where packed export archives and uploaded backups live.
    pub uploads_root: PathBuf,
    /// Root for per-export staging workspaces.
    pub temp_root: PathBuf,
    /// Root under which imported projects are extracted.
    pub projects_root: PathBuf,
    pub database_url: String,
    pub download_token_ttl: Duration,
    /// How long a freshly exported backup stays downloadable.
    pub backup_expiry: Duration,
    /// Used tokens older than this are swept from the store.
    pub token_used_retention: Duration,
    /// Number of dump drivers running concurrently per export.
    pub export_dump_concurrency: usize,
    pub dump_timeout: Duration,
    pub snapshot_copy_timeout: Duration,
    pub docker_bin: String,
    pub cleanup_interval: Duration,
    /// Fire-and-forget notification endpoint. None disables delivery.
    pub webhook_url: Option<String>,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            uploads_root: PathBuf::from(env_or("UPLOADS_ROOT", DEFAULT_UPLOADS_ROOT)),
            temp_root: PathBuf::from(env_or("TEMP_ROOT", DEFAULT_TEMP_ROOT)),
            projects_root: PathBuf::from(env_or("PROJECTS_ROOT", DEFAULT_PROJECTS_ROOT)),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            download_token_ttl: Duration::from_secs(env_parse(
                "DOWNLOAD_TOKEN_TTL_SECS",
                DOWNLOAD_TOKEN_TTL_SECS,
            )?),
            backup_expiry: Duration::from_secs(env_parse(
                "BACKUP_EXPIRY_SECS",
                BACKUP_EXPIRY_SECS,
            )?),
            token_used_retention: Duration::from_secs(env_parse(
                "TOKEN_USED_RETENTION_SECS",
                TOKEN_USED_RETENTION_SECS,
            )?),
            export_dump_concurrency: env_parse(
                "EXPORT_DUMP_CONCURRENCY",
                EXPORT_DUMP_CONCURRENCY,
            )?,
            dump_timeout: Duration::from_secs(env_parse("DUMP_TIMEOUT_SECS", DUMP_TIMEOUT_SECS)?),
            snapshot_copy_timeout: Duration::from_secs(env_parse(
                "SNAPSHOT_COPY_TIMEOUT_SECS",
                SNAPSHOT_COPY_TIMEOUT_SECS,
            )?),
            docker_bin: env_or("DOCKER_BIN", "docker"),
            cleanup_interval: Duration::from_secs(env_parse(
                "CLEANUP_INTERVAL_SECS",
                CLEANUP_INTERVAL_SECS,
            )?),
            webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            environment: env_or("ENVIRONMENT", "development"),
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
