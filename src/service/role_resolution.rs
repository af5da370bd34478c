//! Effective role views: local role records merged with remote rules

use super::rule_set::RuleSetReconciler;
use crate::domain::{Role, RoleView};
use crate::policy_store::normalize_resource_kind;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct RoleResolutionService {
    rule_sets: Arc<RuleSetReconciler>,
}

impl RoleResolutionService {
    pub fn new(rule_sets: Arc<RuleSetReconciler>) -> Self {
        Self { rule_sets }
    }

    /// Attach the actions each role holds on `resource_kind`.
    ///
    /// The remote map is fetched once per call. Roles the engine knows
    /// nothing about get an empty list; if the fetch itself fails every role
    /// resolves to an empty list and the failure is only logged.
    pub async fn resolve_roles(&self, roles: &[Role], resource_kind: &str) -> Vec<RoleView> {
        let kind = normalize_resource_kind(resource_kind);

        let remote = match self.rule_sets.get_role_permissions(&kind).await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    resource_kind = %kind,
                    roles = roles.len(),
                    error = %e,
                    "Failed to load role permissions, resolving roles without permissions"
                );
                Default::default()
            }
        };

        roles
            .iter()
            .map(|role| RoleView {
                id: role.id,
                name: role.name.clone(),
                permissions: remote
                    .get(&role.name.to_lowercase())
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::policy_store::{MockPolicyStore, PolicyDocument, RuleEntry};
    use pretty_assertions::assert_eq;

    fn role(name: &str) -> Role {
        Role {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn service(store: MockPolicyStore) -> RoleResolutionService {
        RoleResolutionService::new(Arc::new(RuleSetReconciler::new(Arc::new(store))))
    }

    #[tokio::test]
    async fn test_resolve_roles_missing_role_gets_empty_list() {
        let mut store = MockPolicyStore::new();
        store.expect_fetch_policy().times(1).returning(|kind| {
            Ok(Some(PolicyDocument::new(
                kind,
                vec![RuleEntry::allow("admin", ["read", "write"])],
            )))
        });

        let roles = vec![role("ADMIN"), role("VIEWER")];
        let views = service(store).resolve_roles(&roles, "reports").await;

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, roles[0].id);
        assert_eq!(views[0].name, "ADMIN");
        assert_eq!(views[0].permissions, vec!["read", "write"]);
        assert_eq!(views[1].name, "VIEWER");
        assert!(views[1].permissions.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_roles_remote_failure_yields_empty_permissions() {
        let mut store = MockPolicyStore::new();
        store
            .expect_fetch_policy()
            .returning(|_| Err(AppError::RemoteUnavailable("connection refused".to_string())));

        let roles = vec![role("ADMIN")];
        let views = service(store).resolve_roles(&roles, "reports").await;

        assert_eq!(views.len(), 1);
        assert!(views[0].permissions.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_roles_no_policy() {
        let mut store = MockPolicyStore::new();
        store.expect_fetch_policy().returning(|_| Ok(None));

        let views = service(store).resolve_roles(&[role("ADMIN")], "").await;
        assert!(views[0].permissions.is_empty());
    }
}
