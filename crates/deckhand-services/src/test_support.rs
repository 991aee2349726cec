//! In-memory collaborator implementations for testing the orchestrators
//! and the token broker without a database or a container runtime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use deckhand_core::models::{
    BackupRecord, BackupStatus, DatabaseDescriptor, DatabaseEngine, DownloadToken,
    NewBackupRecord, NewProject, Project, ProjectDetails, ProjectStatus, TokenResource,
};
use deckhand_core::stores::{
    BackupStore, DeployOrchestrator, Notifier, NotifyEvent, ProjectStore, TokenStore,
};
use deckhand_core::AppError;

use crate::dump::DumpDriver;

// ---------------------------------------------------------------------------
// Token store

pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, DownloadToken>>,
    consume_calls: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            consume_calls: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, token: &str) -> Option<DownloadToken> {
        self.tokens.lock().unwrap().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn consume_calls(&self) -> usize {
        self.consume_calls.load(Ordering::SeqCst)
    }

    pub fn force_expire(&self, token: &str) {
        if let Some(row) = self.tokens.lock().unwrap().get_mut(token) {
            row.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub fn age_used(&self, token: &str, by: Duration) {
        if let Some(row) = self.tokens.lock().unwrap().get_mut(token) {
            if let Some(used_at) = row.used_at {
                row.used_at = Some(used_at - by);
            }
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: &DownloadToken) -> Result<(), AppError> {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn consume(
        &self,
        token: &str,
        allow_multi_use: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, AppError> {
        self.consume_calls.fetch_add(1, Ordering::SeqCst);
        // One lock held for the whole check-and-set, mirroring the row
        // lock the Postgres repository takes.
        let mut tokens = self.tokens.lock().unwrap();
        let Some(row) = tokens.get(token).cloned() else {
            return Ok(None);
        };
        if row.is_expired(now) {
            tokens.remove(token);
            return Ok(None);
        }
        if allow_multi_use || row.resource_type.allows_multi_use() {
            return Ok(Some(row));
        }
        if row.used {
            return Ok(None);
        }
        let entry = tokens.get_mut(token).expect("present above");
        entry.used = true;
        entry.used_at = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_for_resource(
        &self,
        resource_type: TokenResource,
        resource_id: Uuid,
    ) -> Result<u64, AppError> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| !(t.resource_type == resource_type && t.resource_id == resource_id));
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_stale(
        &self,
        now: DateTime<Utc>,
        used_before: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| {
            let expired = t.expires_at < now;
            let stale_used = t.used && t.used_at.map(|at| at < used_before).unwrap_or(false);
            !(expired || stale_used)
        });
        Ok((before - tokens.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Backup store

pub struct MemoryBackupStore {
    records: Mutex<HashMap<Uuid, BackupRecord>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, record: BackupRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<BackupRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn uploaded_record(user_id: Uuid, filepath: &str) -> BackupRecord {
        let now = Utc::now();
        BackupRecord {
            id: Uuid::new_v4(),
            user_id,
            filename: "upload.zip".into(),
            original_name: "My Project.zip".into(),
            filepath: filepath.into(),
            size: 1024,
            mime_type: "application/zip".into(),
            status: BackupStatus::Uploaded,
            project_id: None,
            notes: None,
            expires_at: now + Duration::hours(1),
            processed_at: None,
            error_message: None,
            drive_file_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn create(&self, record: NewBackupRecord) -> Result<BackupRecord, AppError> {
        let now = Utc::now();
        let record = BackupRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            filename: record.filename,
            original_name: record.original_name,
            filepath: record.filepath,
            size: record.size,
            mime_type: record.mime_type,
            status: record.status,
            project_id: record.project_id,
            notes: record.notes,
            expires_at: record.expires_at,
            processed_at: None,
            error_message: None,
            drive_file_id: None,
            created_at: now,
            updated_at: now,
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_for_user(
        &self,
        user_id: Uuid,
        backup_id: Uuid,
    ) -> Result<Option<BackupRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&backup_id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn update_status_guarded(
        &self,
        backup_id: Uuid,
        expected: BackupStatus,
        next: BackupStatus,
    ) -> Result<Option<BackupRecord>, AppError> {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(&backup_id) else {
            return Ok(None);
        };
        if record.status != expected {
            return Ok(None);
        }
        record.status = next;
        record.updated_at = Utc::now();
        if next.is_terminal() {
            record.processed_at = Some(record.updated_at);
        }
        Ok(Some(record.clone()))
    }

    async fn mark_failed(&self, backup_id: Uuid, error_message: &str) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&backup_id) {
            record.status = BackupStatus::Failed;
            record.error_message = Some(error_message.to_string());
            record.processed_at = Some(Utc::now());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<BackupRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status.is_expirable() && r.expires_at < now)
            .cloned()
            .collect())
    }

    async fn delete(&self, user_id: Uuid, backup_id: Uuid) -> Result<bool, AppError> {
        let mut records = self.records.lock().unwrap();
        match records.get(&backup_id) {
            Some(r) if r.user_id == user_id => {
                records.remove(&backup_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Project store

pub struct MemoryProjectStore {
    details: Mutex<HashMap<Uuid, ProjectDetails>>,
    created: Mutex<Vec<Project>>,
    errored: Mutex<HashMap<Uuid, String>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self {
            details: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            errored: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_details(&self, details: ProjectDetails) {
        self.details
            .lock()
            .unwrap()
            .insert(details.project.id, details);
    }

    pub fn created_projects(&self) -> Vec<Project> {
        self.created.lock().unwrap().clone()
    }

    pub fn error_for(&self, project_id: Uuid) -> Option<String> {
        self.errored.lock().unwrap().get(&project_id).cloned()
    }

    /// A project with an on-disk working directory and the given databases.
    pub fn project_on_disk(
        owner_id: Uuid,
        slug: &str,
        path: &Path,
        databases: Vec<DatabaseDescriptor>,
    ) -> ProjectDetails {
        let now = Utc::now();
        ProjectDetails {
            project: Project {
                id: Uuid::new_v4(),
                owner_id,
                name: slug.to_string(),
                slug: slug.to_string(),
                path: path.to_string_lossy().into_owned(),
                template: None,
                status: ProjectStatus::Active,
                created_at: now,
                updated_at: now,
            },
            member_ids: vec![],
            databases,
            domains: vec![format!("{slug}.example.com")],
            containers: vec![format!("{slug}-app")],
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get_details(&self, project_id: Uuid) -> Result<Option<ProjectDetails>, AppError> {
        Ok(self.details.lock().unwrap().get(&project_id).cloned())
    }

    async fn create_imported(&self, project: NewProject) -> Result<Project, AppError> {
        let now = Utc::now();
        let created = Project {
            id: Uuid::new_v4(),
            owner_id: project.owner_id,
            name: project.name,
            slug: project.slug,
            path: project.path,
            template: project.template,
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.created.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn mark_error(&self, project_id: Uuid, message: &str) -> Result<(), AppError> {
        self.errored
            .lock()
            .unwrap()
            .insert(project_id, message.to_string());
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.slug == slug))
    }
}

// ---------------------------------------------------------------------------
// Dump driver stub

/// Writes a fixed dump artifact, or fails silently when told to.
pub struct StubDumpDriver {
    engine: DatabaseEngine,
    fail: bool,
}

impl StubDumpDriver {
    pub fn working(engine: DatabaseEngine) -> Self {
        Self {
            engine,
            fail: false,
        }
    }

    pub fn failing(engine: DatabaseEngine) -> Self {
        Self { engine, fail: true }
    }
}

#[async_trait]
impl DumpDriver for StubDumpDriver {
    fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    async fn dump(&self, db: &DatabaseDescriptor, dest_dir: &Path, _project_slug: &str) {
        if self.fail {
            tracing::warn!(database = %db.name, "stub driver failing on purpose");
            return;
        }
        let path = dest_dir.join(crate::dump::dump_file_name(db));
        tokio::fs::write(&path, b"-- stub dump\n").await.ok();
    }
}

pub fn descriptor(name: &str, engine: DatabaseEngine) -> DatabaseDescriptor {
    DatabaseDescriptor {
        id: Uuid::new_v4(),
        name: name.into(),
        engine,
        database_name: format!("{}_db", name.replace('-', "_")),
        username: "app".into(),
        password: None,
        host: "127.0.0.1".into(),
        port: 5432,
    }
}

// ---------------------------------------------------------------------------
// Notifier and deploy stubs

pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct StubDeploy {
    pub fail: bool,
    calls: Mutex<Vec<String>>,
}

impl StubDeploy {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeployOrchestrator for StubDeploy {
    async fn compose_up(&self, project_path: &Path) -> Result<(), AppError> {
        self.calls
            .lock()
            .unwrap()
            .push(project_path.to_string_lossy().into_owned());
        if self.fail {
            Err(AppError::Internal("compose up failed".into()))
        } else {
            Ok(())
        }
    }
}
