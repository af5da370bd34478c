//! Policy engine API client
//!
//! Fetches and replaces resource policy documents through the admin API and
//! runs permission checks through the check API. Every request is bounded by
//! the configured timeout.

use super::resource::{normalize_resource_kind, policy_id};
use super::types::*;
use crate::config::PolicyStoreConfig;
use crate::domain::Principal;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Operations the reconciliation and decision services need from the engine.
///
/// Kept as a trait so services can be tested without HTTP mocking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Current document for a resource kind; `None` when no policy exists yet
    async fn fetch_policy(&self, resource_kind: &str) -> Result<Option<PolicyDocument>>;

    /// Replace the whole document for its resource kind and version
    async fn upsert_policy(&self, document: &PolicyDocument) -> Result<()>;

    /// Evaluate the requested actions against one resource instance
    async fn check_resource(&self, input: &CheckInput) -> Result<CheckResult>;
}

/// HTTP client for the remote policy engine
#[derive(Clone)]
pub struct PolicyStoreClient {
    config: PolicyStoreConfig,
    http_client: Client,
}

impl PolicyStoreClient {
    /// Create a new client; the configured timeout applies to every request
    pub fn new(config: PolicyStoreConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Fail-closed boolean check.
    ///
    /// Returns true only when the engine answers ALLOW for at least one of the
    /// requested actions. Remote failures are logged and reported as denial.
    pub async fn check(
        &self,
        principal: &Principal,
        resource_kind: &str,
        instance_key: &str,
        actions: &[String],
    ) -> bool {
        let input = CheckInput {
            principal: principal.clone(),
            resource_kind: normalize_resource_kind(resource_kind),
            instance_key: instance_key.to_string(),
            actions: actions.iter().map(|a| a.to_lowercase()).collect(),
        };
        let outcome = self
            .check_resource(&input)
            .await
            .map(|result| result.decision(&input.actions));
        super::fail_closed(outcome, &input)
    }

    fn admin_policy_url(&self) -> String {
        format!("{}/admin/policy", self.config.url)
    }

    fn check_url(&self) -> String {
        format!("{}/api/check", self.config.url)
    }
}

#[async_trait]
impl PolicyStore for PolicyStoreClient {
    async fn fetch_policy(&self, resource_kind: &str) -> Result<Option<PolicyDocument>> {
        let kind = normalize_resource_kind(resource_kind);
        let id = policy_id(&kind);

        let response = self
            .http_client
            .get(self.admin_policy_url())
            .basic_auth(&self.config.admin_username, Some(&self.config.admin_password))
            .query(&[("id", id.as_str())])
            .send()
            .await
            .map_err(|e| AppError::RemoteUnavailable(format!("Failed to fetch policy: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(resource_kind = %kind, "No policy stored for resource kind");
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RemoteUnavailable(format!(
                "Failed to fetch policy {}: {} - {}",
                id, status, body
            )));
        }

        let mut list: PolicyList = response
            .json()
            .await
            .map_err(|e| AppError::RemoteUnavailable(format!("Failed to parse policy: {}", e)))?;

        if list.policies.is_empty() {
            debug!(resource_kind = %kind, "Policy list empty for resource kind");
            return Ok(None);
        }

        // Never hand back another resource's rules as this kind's document
        let Some(index) = list
            .policies
            .iter()
            .position(|p| p.resource_policy.resource.eq_ignore_ascii_case(&kind))
        else {
            let returned: Vec<&str> = list
                .policies
                .iter()
                .map(|p| p.resource_policy.resource.as_str())
                .collect();
            warn!(
                resource_kind = %kind,
                returned = ?returned,
                "Policy engine returned policies for other resources"
            );
            return Err(AppError::RemoteUnavailable(format!(
                "Policy {} not present in engine response (got {:?})",
                id, returned
            )));
        };

        Ok(Some(PolicyDocument::from(list.policies.swap_remove(index))))
    }

    async fn upsert_policy(&self, document: &PolicyDocument) -> Result<()> {
        let body = PolicyList {
            policies: vec![PolicyEnvelope::from(document)],
        };

        let response = self
            .http_client
            .post(self.admin_policy_url())
            .basic_auth(&self.config.admin_username, Some(&self.config.admin_password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::RemoteUnavailable(format!("Failed to upsert policy: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                resource_kind = %document.resource_kind,
                status = %status,
                "Policy upsert rejected"
            );
            return Err(AppError::RemoteUnavailable(format!(
                "Failed to upsert policy for {}: {} - {}",
                document.resource_kind, status, body
            )));
        }

        debug!(
            resource_kind = %document.resource_kind,
            rules = document.rules.len(),
            "Policy document replaced"
        );
        Ok(())
    }

    async fn check_resource(&self, input: &CheckInput) -> Result<CheckResult> {
        let request = CheckRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            principal: CheckPrincipal {
                id: input.principal.id.clone(),
                roles: input.principal.roles.clone(),
            },
            resource: CheckResource {
                kind: normalize_resource_kind(&input.resource_kind),
                instances: HashMap::from([(
                    input.instance_key.clone(),
                    InstanceAttributes::default(),
                )]),
            },
            actions: input.actions.clone(),
        };

        let response = self
            .http_client
            .post(self.check_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::RemoteUnavailable(format!("Failed to check permission: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RemoteUnavailable(format!(
                "Failed to check permission: {} - {}",
                status, body
            )));
        }

        let mut parsed: CheckResponse = response.json().await.map_err(|e| {
            AppError::RemoteUnavailable(format!("Failed to parse check response: {}", e))
        })?;

        let actions = parsed
            .resource_instances
            .remove(&input.instance_key)
            .map(|instance| instance.actions)
            .unwrap_or_default();

        Ok(CheckResult { actions })
    }
}
