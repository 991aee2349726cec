use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{DatabaseDescriptor, DatabaseEngine};
use super::project::ProjectDetails;

/// Non-secret metadata embedded as `manifest.json` at the root of every
/// export archive. Generated once per export, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub project: ManifestProject,
    pub exported_at: DateTime<Utc>,
    pub databases: Vec<ManifestDatabase>,
    pub domains: Vec<String>,
    pub containers: Vec<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestProject {
    pub name: String,
    pub slug: String,
    pub template: Option<String>,
}

/// Database descriptor as written to the manifest. Credentials are
/// deliberately absent from this type, so they cannot leak into archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDatabase {
    pub name: String,
    pub engine: DatabaseEngine,
    pub database_name: String,
}

impl From<&DatabaseDescriptor> for ManifestDatabase {
    fn from(db: &DatabaseDescriptor) -> Self {
        Self {
            name: db.name.clone(),
            engine: db.engine,
            database_name: db.database_name.clone(),
        }
    }
}

impl BackupManifest {
    pub fn for_project(details: &ProjectDetails, exported_at: DateTime<Utc>) -> Self {
        Self {
            project: ManifestProject {
                name: details.project.name.clone(),
                slug: details.project.slug.clone(),
                template: details.project.template.clone(),
            },
            exported_at,
            databases: details.databases.iter().map(ManifestDatabase::from).collect(),
            domains: details.domains.clone(),
            containers: details.containers.clone(),
            members: details.member_ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}
