use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::database::DatabaseDescriptor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Deploying,
    Error,
}

impl Display for ProjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Deploying => write!(f, "deploying"),
            ProjectStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "deploying" => Ok(ProjectStatus::Deploying),
            "error" => Ok(ProjectStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid project status: {}", s)),
        }
    }
}

/// A hosted project, owned by one user and deployed from a working
/// directory on the panel host.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// URL-safe identifier, also the container name prefix.
    pub slug: String,
    /// Absolute path of the project's working directory.
    pub path: String,
    /// Framework template the project was created from, when known.
    pub template: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project with the associations the backup subsystem touches:
/// membership for authorization, databases for dump fan-out, domains and
/// containers for the export manifest.
#[derive(Debug, Clone)]
pub struct ProjectDetails {
    pub project: Project,
    pub member_ids: Vec<Uuid>,
    pub databases: Vec<DatabaseDescriptor>,
    pub domains: Vec<String>,
    pub containers: Vec<String>,
}

impl ProjectDetails {
    /// Owner, member, or elevated privilege.
    pub fn authorizes(&self, requester: &Requester) -> bool {
        requester.is_admin
            || self.project.owner_id == requester.user_id
            || self.member_ids.contains(&requester.user_id)
    }
}

/// Fields required to create a project record from an imported backup.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub path: String,
    pub template: Option<String>,
}

/// The caller on whose behalf an orchestrator runs.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}
