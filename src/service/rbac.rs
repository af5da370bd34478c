//! RBAC business logic
//!
//! Local role and permission changes that affect access are paired with the
//! matching reconciliation call so the remote policy does not drift from the
//! local records. The local and remote writes are not atomic with each other.

use super::role_resolution::RoleResolutionService;
use super::rule_set::RuleSetReconciler;
use crate::domain::{
    CreatePermissionInput, CreateRoleInput, Permission, Role, RoleView, StringUuid,
};
use crate::error::{AppError, Result};
use crate::repository::{RbacRepository, UserRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct RbacService<R: RbacRepository, U: UserRepository> {
    repo: Arc<R>,
    user_repo: Arc<U>,
    rule_sets: Arc<RuleSetReconciler>,
    resolver: RoleResolutionService,
}

impl<R: RbacRepository, U: UserRepository> RbacService<R, U> {
    pub fn new(repo: Arc<R>, user_repo: Arc<U>, rule_sets: Arc<RuleSetReconciler>) -> Self {
        let resolver = RoleResolutionService::new(rule_sets.clone());
        Self {
            repo,
            user_repo,
            rule_sets,
            resolver,
        }
    }

    // ==================== Permissions ====================

    pub async fn create_permission(&self, input: CreatePermissionInput) -> Result<Permission> {
        input.validate()?;
        if self.repo.find_permission_by_name(&input.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Permission '{}' already exists",
                input.name
            )));
        }
        self.repo.create_permission(&input).await
    }

    pub async fn get_permission(&self, id: StringUuid) -> Result<Permission> {
        self.repo
            .find_permission_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Permission {} not found", id)))
    }

    /// Remove the permission's action from the resource policy, then delete
    /// it locally. A failed remote write leaves the local row in place.
    pub async fn delete_permission(&self, id: StringUuid, resource_kind: &str) -> Result<()> {
        let permission = self.get_permission(id).await?;
        self.rule_sets
            .revoke_action(resource_kind, &permission.action())
            .await?;
        self.repo.delete_permission(id).await
    }

    // ==================== Roles ====================

    /// Create a role; the name is stored upper-cased and must be unique
    pub async fn create_role(&self, mut input: CreateRoleInput) -> Result<Role> {
        input.validate()?;
        input.name = input.name.to_uppercase();
        if self.repo.find_role_by_name(&input.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Role '{}' already exists",
                input.name
            )));
        }
        self.repo.create_role(&input).await
    }

    pub async fn get_role(&self, id: StringUuid) -> Result<Role> {
        self.repo
            .find_role_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))
    }

    /// Grant the role exactly `permission_ids` on `resource_kind`.
    ///
    /// Every id must exist locally before the remote policy is touched. An
    /// empty list strips the role from the policy.
    pub async fn set_role_permissions(
        &self,
        role_id: StringUuid,
        permission_ids: &[StringUuid],
        resource_kind: &str,
    ) -> Result<RoleView> {
        let role = self.get_role(role_id).await?;

        let wanted: BTreeSet<StringUuid> = permission_ids.iter().copied().collect();
        let ids: Vec<StringUuid> = wanted.iter().copied().collect();
        let permissions = self.repo.find_permissions_by_ids(&ids).await?;

        let found: BTreeSet<StringUuid> = permissions.iter().map(|p| p.id).collect();
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(AppError::NotFound(format!(
                "Permission {} not found",
                missing
            )));
        }

        let mut actions: Vec<String> = permissions.iter().map(Permission::action).collect();
        actions.sort();
        actions.dedup();

        self.rule_sets
            .update_role_permissions(resource_kind, &role.name, &actions)
            .await?;

        Ok(RoleView {
            id: role.id,
            name: role.name,
            permissions: actions,
        })
    }

    /// Strip the role from the resource policy, then delete it locally
    pub async fn delete_role(&self, id: StringUuid, resource_kind: &str) -> Result<()> {
        let role = self.get_role(id).await?;
        self.rule_sets.remove_role(resource_kind, &role.name).await?;
        self.repo.delete_role(id).await?;
        info!(role = %role.name, "Role deleted");
        Ok(())
    }

    /// All roles with the permissions the policy grants them
    pub async fn list_roles(&self, resource_kind: &str) -> Result<Vec<RoleView>> {
        let roles = self.repo.list_roles().await?;
        Ok(self.resolver.resolve_roles(&roles, resource_kind).await)
    }

    // ==================== User-Role ====================

    pub async fn assign_role_to_user(&self, user_id: StringUuid, role_id: StringUuid) -> Result<()> {
        let _ = self.get_role(role_id).await?;
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        self.user_repo.assign_role(user_id, role_id).await
    }

    /// Roles of the user named `display_name`, with their permissions
    pub async fn get_user_roles(
        &self,
        display_name: &str,
        resource_kind: &str,
    ) -> Result<Vec<RoleView>> {
        let user = self
            .user_repo
            .find_by_display_name(display_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", display_name)))?;
        let roles = self.user_repo.find_roles(user.id).await?;
        Ok(self.resolver.resolve_roles(&roles, resource_kind).await)
    }
}
