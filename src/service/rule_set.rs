//! Role rule reconciliation against the remote policy document
//!
//! Every write is a read-modify-write of the whole document for one resource
//! kind: fetch, rewrite the rules of a single role in memory, upsert the full
//! document. There is no concurrency token, so concurrent writers to the same
//! resource kind can overwrite each other; callers that need stronger
//! guarantees must serialize writes per resource kind.

use crate::error::Result;
use crate::policy_store::{normalize_resource_kind, PolicyDocument, PolicyStore, RuleEntry};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Role name (lower-cased) to the actions the policy grants it
pub type RolePermissionMap = HashMap<String, Vec<String>>;

pub struct RuleSetReconciler {
    store: Arc<dyn PolicyStore>,
}

impl RuleSetReconciler {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Replace the rules of `role_name` in the resource's policy with a single
    /// ALLOW rule for `actions`. An empty action list removes the role.
    ///
    /// Rules of other roles are written back untouched. A failed fetch or
    /// upsert is returned as an error; nothing is reported as applied unless
    /// the engine accepted the new document.
    pub async fn update_role_permissions(
        &self,
        resource_kind: &str,
        role_name: &str,
        actions: &[String],
    ) -> Result<()> {
        let kind = normalize_resource_kind(resource_kind);

        let mut document = self
            .store
            .fetch_policy(&kind)
            .await?
            .unwrap_or_else(|| PolicyDocument::new(&kind, Vec::new()));

        let rules = std::mem::take(&mut document.rules);
        document.rules = replace_role_rules(rules, role_name, actions);
        document.resource_kind = kind;
        self.write(document, role_name).await
    }

    /// Drop every rule granting `role_name` anything on the resource kind
    pub async fn remove_role(&self, resource_kind: &str, role_name: &str) -> Result<()> {
        self.update_role_permissions(resource_kind, role_name, &[])
            .await
    }

    /// Strip `action` from every rule of the resource kind.
    ///
    /// Used when a permission is deleted locally. Returns whether the
    /// document changed; an absent document or one that never mentioned the
    /// action is left alone.
    pub async fn revoke_action(&self, resource_kind: &str, action: &str) -> Result<bool> {
        let kind = normalize_resource_kind(resource_kind);

        let Some(mut document) = self.store.fetch_policy(&kind).await? else {
            return Ok(false);
        };

        let before = document.rules.len();
        let mut changed = false;
        let rules: Vec<RuleEntry> = std::mem::take(&mut document.rules)
            .into_iter()
            .filter_map(|mut rule| {
                let count = rule.actions.len();
                rule.actions.retain(|a| !a.eq_ignore_ascii_case(action));
                changed |= rule.actions.len() != count;
                (!rule.actions.is_empty()).then_some(rule)
            })
            .collect();

        if !changed && rules.len() == before {
            return Ok(false);
        }

        document.rules = rules;
        document.resource_kind = kind;
        self.write(document, action).await?;
        Ok(true)
    }

    /// Current role to actions map for a resource kind.
    /// A resource kind with no policy yields an empty map.
    pub async fn get_role_permissions(&self, resource_kind: &str) -> Result<RolePermissionMap> {
        let kind = normalize_resource_kind(resource_kind);

        Ok(self
            .store
            .fetch_policy(&kind)
            .await?
            .map(|document| role_permission_map(&document.rules))
            .unwrap_or_default())
    }

    async fn write(&self, document: PolicyDocument, subject: &str) -> Result<()> {
        match self.store.upsert_policy(&document).await {
            Ok(()) => {
                counter!("roleguard_policy_sync_total", "result" => "success").increment(1);
                info!(
                    resource_kind = %document.resource_kind,
                    subject = %subject,
                    rules = document.rules.len(),
                    "Policy rules reconciled"
                );
                Ok(())
            }
            Err(e) => {
                counter!("roleguard_policy_sync_total", "result" => "failure").increment(1);
                error!(
                    resource_kind = %document.resource_kind,
                    subject = %subject,
                    error = %e,
                    "Policy rules reconciliation failed"
                );
                Err(e)
            }
        }
    }
}

/// Rule list with `role_name`'s rules replaced by one ALLOW rule for `actions`.
///
/// Rules for other roles keep their position and content. A rule shared with
/// other roles keeps those roles and only loses `role_name`. When `actions`
/// is empty (or only blanks) no rule is added back.
pub fn replace_role_rules(
    rules: Vec<RuleEntry>,
    role_name: &str,
    actions: &[String],
) -> Vec<RuleEntry> {
    let mut kept: Vec<RuleEntry> = rules
        .into_iter()
        .filter_map(|mut rule| {
            if !rule.has_role(role_name) {
                return Some(rule);
            }
            rule.roles.retain(|r| !r.eq_ignore_ascii_case(role_name));
            (!rule.roles.is_empty()).then_some(rule)
        })
        .collect();

    let replacement = RuleEntry::allow(role_name, actions);
    if !replacement.actions.is_empty() {
        kept.push(replacement);
    }
    kept
}

/// Build the role to actions map from a rule list.
///
/// Keys are lower-cased role names; every role listed on a rule receives its
/// actions, merged without duplicates in rule order.
pub fn role_permission_map(rules: &[RuleEntry]) -> RolePermissionMap {
    let mut map = RolePermissionMap::new();
    for rule in rules {
        for role in &rule.roles {
            let actions = map.entry(role.to_lowercase()).or_default();
            for action in &rule.actions {
                let action = action.to_lowercase();
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }
    }
    map
}
