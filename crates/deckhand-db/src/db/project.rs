//! Project repository
//!
//! The backup subsystem reads projects together with the associations it
//! needs (members, databases, domains, container names) and creates
//! project records for imported backups.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use deckhand_core::models::{
    DatabaseDescriptor, NewProject, Project, ProjectDetails, ProjectStatus,
};
use deckhand_core::{AppError, ProjectStore};

const PROJECT_COLUMNS: &str =
    "id, owner_id, name, slug, path, template, status, created_at, updated_at";

#[derive(Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get(&self, project_id: Uuid) -> Result<Option<Project>, AppError> {
        let row = sqlx::query_as::<Postgres, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS}
            FROM projects
            WHERE id = $1
            "#
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get project")?;
        Ok(row)
    }
}

#[async_trait]
impl ProjectStore for ProjectRepository {
    async fn get_details(&self, project_id: Uuid) -> Result<Option<ProjectDetails>, AppError> {
        let Some(project) = self.get(project_id).await? else {
            return Ok(None);
        };

        let member_ids: Vec<Uuid> =
            sqlx::query(r#"SELECT user_id FROM project_members WHERE project_id = $1"#)
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list project members")?
                .into_iter()
                .map(|row| row.get("user_id"))
                .collect();

        let databases = sqlx::query_as::<Postgres, DatabaseDescriptor>(
            r#"
            SELECT id, name, engine, database_name, username, password, host, port
            FROM project_databases
            WHERE project_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list project databases")?;

        let domains: Vec<String> =
            sqlx::query(r#"SELECT domain FROM project_domains WHERE project_id = $1"#)
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list project domains")?
                .into_iter()
                .map(|row| row.get("domain"))
                .collect();

        let containers: Vec<String> =
            sqlx::query(r#"SELECT name FROM project_containers WHERE project_id = $1"#)
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list project containers")?
                .into_iter()
                .map(|row| row.get("name"))
                .collect();

        Ok(Some(ProjectDetails {
            project,
            member_ids,
            databases,
            domains,
            containers,
        }))
    }

    async fn create_imported(&self, project: NewProject) -> Result<Project, AppError> {
        let now = Utc::now();
        let row = sqlx::query_as::<Postgres, Project>(&format!(
            r#"
            INSERT INTO projects (id, owner_id, name, slug, path, template, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(project.owner_id)
        .bind(&project.name)
        .bind(&project.slug)
        .bind(&project.path)
        .bind(&project.template)
        .bind(ProjectStatus::Active)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create imported project")?;
        Ok(row)
    }

    async fn mark_error(&self, project_id: Uuid, message: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE projects
            SET status = $2, error_message = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .bind(ProjectStatus::Error)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to mark project as errored")?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let row = sqlx::query(r#"SELECT 1 AS present FROM projects WHERE slug = $1 LIMIT 1"#)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check slug existence")?;
        Ok(row.is_some())
    }
}
