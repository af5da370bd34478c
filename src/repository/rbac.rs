//! RBAC repository

use super::{map_conflict_if_duplicate, placeholders};
use crate::domain::{CreatePermissionInput, CreateRoleInput, Permission, Role, StringUuid};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RbacRepository: Send + Sync {
    // Roles
    async fn create_role(&self, input: &CreateRoleInput) -> Result<Role>;
    async fn find_role_by_id(&self, id: StringUuid) -> Result<Option<Role>>;
    /// Case-insensitive name lookup
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
    async fn list_roles(&self) -> Result<Vec<Role>>;
    async fn delete_role(&self, id: StringUuid) -> Result<()>;

    // Permissions
    async fn create_permission(&self, input: &CreatePermissionInput) -> Result<Permission>;
    async fn find_permission_by_id(&self, id: StringUuid) -> Result<Option<Permission>>;
    /// Case-insensitive name lookup
    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>>;
    async fn find_permissions_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Permission>>;
    async fn list_permissions(&self) -> Result<Vec<Permission>>;
    async fn delete_permission(&self, id: StringUuid) -> Result<()>;
}

pub struct RbacRepositoryImpl {
    pool: MySqlPool,
}

impl RbacRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const ROLE_COLUMNS: &str = "id, name, application_id, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, name, display_name, description";

#[async_trait]
impl RbacRepository for RbacRepositoryImpl {
    async fn create_role(&self, input: &CreateRoleInput) -> Result<Role> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, application_id, created_at, updated_at)
            VALUES (?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.application_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_conflict_if_duplicate(e, || format!("Role '{}' already exists", input.name))
        })?;

        self.find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create role")))
    }

    async fn find_role_by_id(&self, id: StringUuid) -> Result<Option<Role>> {
        let sql = format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let sql = format!("SELECT {} FROM roles WHERE UPPER(name) = UPPER(?)", ROLE_COLUMNS);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role)
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let sql = format!("SELECT {} FROM roles ORDER BY name", ROLE_COLUMNS);
        let roles = sqlx::query_as::<_, Role>(&sql).fetch_all(&self.pool).await?;

        Ok(roles)
    }

    async fn delete_role(&self, id: StringUuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Role {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_permission(&self, input: &CreatePermissionInput) -> Result<Permission> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, display_name, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.display_name)
        .bind(&input.description)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_conflict_if_duplicate(e, || format!("Permission '{}' already exists", input.name))
        })?;

        self.find_permission_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create permission")))
    }

    async fn find_permission_by_id(&self, id: StringUuid) -> Result<Option<Permission>> {
        let sql = format!("SELECT {} FROM permissions WHERE id = ?", PERMISSION_COLUMNS);
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let sql = format!(
            "SELECT {} FROM permissions WHERE LOWER(name) = LOWER(?)",
            PERMISSION_COLUMNS
        );
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn find_permissions_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Permission>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM permissions WHERE id IN ({})",
            PERMISSION_COLUMNS,
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, Permission>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let sql = format!("SELECT {} FROM permissions ORDER BY name", PERMISSION_COLUMNS);
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(permissions)
    }

    async fn delete_permission(&self, id: StringUuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Application links go with the permission
        sqlx::query("DELETE FROM application_permissions WHERE permission_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Permission {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }
}
