//! Application repository, including the application-permission link table

use super::placeholders;
use crate::domain::{Application, ApplicationPermission, CreateApplicationInput, StringUuid};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, input: &CreateApplicationInput) -> Result<Application>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Application>>;
    /// Single batch lookup; ids that do not exist are simply absent from the result
    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Application>>;
    async fn list(&self) -> Result<Vec<Application>>;

    // Application-Permission links
    async fn find_permission_links(
        &self,
        permission_id: StringUuid,
    ) -> Result<Vec<ApplicationPermission>>;
    /// Insert and delete links in one transaction
    async fn apply_link_changes(
        &self,
        to_add: &[ApplicationPermission],
        to_remove: &[ApplicationPermission],
    ) -> Result<()>;
}

pub struct ApplicationRepositoryImpl {
    pool: MySqlPool,
}

impl ApplicationRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for ApplicationRepositoryImpl {
    async fn create(&self, input: &CreateApplicationInput) -> Result<Application> {
        let id = StringUuid::new_v4();

        sqlx::query("INSERT INTO applications (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(&input.name)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create application")))
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Application>> {
        let application =
            sqlx::query_as::<_, Application>("SELECT id, name FROM applications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(application)
    }

    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Application>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name FROM applications WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, Application>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn list(&self) -> Result<Vec<Application>> {
        let applications =
            sqlx::query_as::<_, Application>("SELECT id, name FROM applications ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(applications)
    }

    async fn find_permission_links(
        &self,
        permission_id: StringUuid,
    ) -> Result<Vec<ApplicationPermission>> {
        let links = sqlx::query_as::<_, ApplicationPermission>(
            "SELECT application_id, permission_id FROM application_permissions WHERE permission_id = ?",
        )
        .bind(permission_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    async fn apply_link_changes(
        &self,
        to_add: &[ApplicationPermission],
        to_remove: &[ApplicationPermission],
    ) -> Result<()> {
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for link in to_remove {
            sqlx::query(
                "DELETE FROM application_permissions WHERE application_id = ? AND permission_id = ?",
            )
            .bind(link.application_id)
            .bind(link.permission_id)
            .execute(&mut *tx)
            .await?;
        }

        for link in to_add {
            sqlx::query(
                "INSERT IGNORE INTO application_permissions (application_id, permission_id) VALUES (?, ?)",
            )
            .bind(link.application_id)
            .bind(link.permission_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
