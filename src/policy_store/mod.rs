//! Remote policy engine gateway
//!
//! The engine holds one allow/deny rule document per resource kind. This
//! module owns the wire contract, resource kind canonicalization and the
//! fail-closed interpretation of check results.

pub mod client;
pub mod resource;
pub mod types;

pub use client::{PolicyStore, PolicyStoreClient};
pub use resource::{normalize_resource_kind, DEFAULT_RESOURCE_KIND};
pub use types::{
    CheckInput, CheckResult, Decision, Effect, PolicyDocument, RuleEntry, POLICY_API_VERSION,
    POLICY_VERSION,
};

#[cfg(test)]
pub use client::MockPolicyStore;

use crate::error::Result;
use metrics::counter;
use tracing::{debug, warn};

/// Collapse a check outcome into allow/deny, treating any failure as denial.
///
/// The failure cause is logged with the resource kind, requested actions and
/// principal id; it is never returned to the caller.
pub fn fail_closed(outcome: Result<Decision>, input: &CheckInput) -> bool {
    match outcome {
        Ok(decision) => {
            let allowed = decision.is_allowed();
            let outcome = if allowed { "allow" } else { "deny" };
            counter!("roleguard_policy_check_total", "outcome" => outcome).increment(1);
            debug!(
                resource_kind = %input.resource_kind,
                actions = ?input.actions,
                principal_id = %input.principal.id,
                allowed,
                "Permission check answered"
            );
            allowed
        }
        Err(e) => {
            counter!("roleguard_policy_check_total", "outcome" => "error").increment(1);
            warn!(
                resource_kind = %input.resource_kind,
                actions = ?input.actions,
                principal_id = %input.principal.id,
                error = %e,
                "Permission check failed, denying"
            );
            false
        }
    }
}
