//! Authorization decisions against the remote policy engine

use crate::domain::Principal;
use crate::error::{AppError, Result};
use crate::policy_store::{fail_closed, normalize_resource_kind, CheckInput, Decision, PolicyStore};
use crate::repository::UserRepository;
use std::sync::Arc;

pub struct AuthorizationService<U: UserRepository> {
    user_repo: Arc<U>,
    store: Arc<dyn PolicyStore>,
}

impl<U: UserRepository> AuthorizationService<U> {
    pub fn new(user_repo: Arc<U>, store: Arc<dyn PolicyStore>) -> Self {
        Self { user_repo, store }
    }

    /// Can the user named `display_name` perform `permission_name` on
    /// `resource_kind`?
    ///
    /// Unknown users are `NotFound`. Anything that prevents the engine from
    /// confirming the permission is logged and answered with `false`.
    pub async fn validate_user_permission(
        &self,
        display_name: &str,
        permission_name: &str,
        resource_kind: &str,
    ) -> Result<bool> {
        let input = self
            .build_check(display_name, permission_name, resource_kind)
            .await?;
        let outcome = self
            .store
            .check_resource(&input)
            .await
            .map(|result| result.decision(&input.actions));
        Ok(fail_closed(outcome, &input))
    }

    /// Same question, but a remote failure comes back as
    /// `Err(RemoteUnavailable)` so the caller picks its own failure policy.
    pub async fn evaluate_user_permission(
        &self,
        display_name: &str,
        permission_name: &str,
        resource_kind: &str,
    ) -> Result<Decision> {
        let input = self
            .build_check(display_name, permission_name, resource_kind)
            .await?;
        let result = self.store.check_resource(&input).await?;
        Ok(result.decision(&input.actions))
    }

    async fn build_check(
        &self,
        display_name: &str,
        permission_name: &str,
        resource_kind: &str,
    ) -> Result<CheckInput> {
        let user = self
            .user_repo
            .find_by_display_name(display_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", display_name)))?;

        let roles = self.user_repo.find_roles(user.id).await?;
        let principal = Principal::new(user.id.to_string(), roles.into_iter().map(|r| r.name));

        Ok(CheckInput {
            principal,
            resource_kind: normalize_resource_kind(resource_kind),
            instance_key: display_name.to_string(),
            actions: vec![permission_name.to_lowercase()],
        })
    }
}
