//! Policy engine type definitions
//!
//! Rule documents, the admin API envelopes they travel in, and the
//! check request/response pair.

use crate::domain::Principal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Wire fields this crate does not interpret, carried through unchanged
pub type ExtraFields = Map<String, Value>;

/// `apiVersion` written on every policy document
pub const POLICY_API_VERSION: &str = "api.cerbos.dev/v1";

/// Resource policy version; one document per resource kind
pub const POLICY_VERSION: &str = "default";

/// Rule or check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    #[serde(rename = "EFFECT_ALLOW")]
    Allow,
    #[serde(rename = "EFFECT_DENY")]
    Deny,
    #[serde(rename = "EFFECT_NO_MATCH")]
    NoMatch,
}

/// One `{roles, actions, effect}` rule inside a resource policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub effect: Effect,
    /// `name`, `condition`, `derivedRoles`, `output` and the like
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl RuleEntry {
    /// Single-role ALLOW rule. Role and actions are lower-cased and the
    /// action list is de-duplicated, preserving first occurrence.
    pub fn allow<I, S>(role: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for action in actions {
            let action = action.as_ref().trim().to_lowercase();
            if !action.is_empty() && !normalized.contains(&action) {
                normalized.push(action);
            }
        }
        Self {
            roles: vec![role.to_lowercase()],
            actions: normalized,
            effect: Effect::Allow,
            extra: ExtraFields::new(),
        }
    }

    /// Case-insensitive role membership
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Resource policy for one resource kind.
///
/// Besides the rules, the document keeps every other field of the fetched
/// policy (scope, imported derived roles, variables, metadata) so an upsert
/// writes them back as they were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    pub resource_kind: String,
    pub version: String,
    pub api_version: String,
    pub rules: Vec<RuleEntry>,
    /// Other keys of `resourcePolicy`
    pub policy_fields: ExtraFields,
    /// Other top-level keys of the policy envelope
    pub envelope_fields: ExtraFields,
}

impl PolicyDocument {
    /// Document with the fixed version constants for an already-normalized kind
    pub fn new(resource_kind: impl Into<String>, rules: Vec<RuleEntry>) -> Self {
        Self {
            resource_kind: resource_kind.into(),
            version: POLICY_VERSION.to_string(),
            api_version: POLICY_API_VERSION.to_string(),
            rules,
            policy_fields: ExtraFields::new(),
            envelope_fields: ExtraFields::new(),
        }
    }
}

// ============================================================================
// Admin API wire format
// ============================================================================

/// `{policies: [...]}` body of both `GET` and `POST /admin/policy`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyList {
    #[serde(default)]
    pub policies: Vec<PolicyEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEnvelope {
    pub api_version: String,
    pub resource_policy: ResourcePolicy,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl From<&PolicyDocument> for PolicyEnvelope {
    fn from(doc: &PolicyDocument) -> Self {
        Self {
            api_version: doc.api_version.clone(),
            resource_policy: ResourcePolicy {
                version: doc.version.clone(),
                resource: doc.resource_kind.clone(),
                rules: doc.rules.clone(),
                extra: doc.policy_fields.clone(),
            },
            extra: doc.envelope_fields.clone(),
        }
    }
}

impl From<PolicyEnvelope> for PolicyDocument {
    fn from(envelope: PolicyEnvelope) -> Self {
        Self {
            resource_kind: envelope.resource_policy.resource,
            version: envelope.resource_policy.version,
            api_version: envelope.api_version,
            rules: envelope.resource_policy.rules,
            policy_fields: envelope.resource_policy.extra,
            envelope_fields: envelope.extra,
        }
    }
}

// ============================================================================
// Check API
// ============================================================================

/// Everything needed for one permission check
#[derive(Debug, Clone)]
pub struct CheckInput {
    pub principal: Principal,
    pub resource_kind: String,
    pub instance_key: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub request_id: String,
    pub principal: CheckPrincipal,
    pub resource: CheckResource,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckPrincipal {
    pub id: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResource {
    pub kind: String,
    pub instances: HashMap<String, InstanceAttributes>,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceAttributes {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(default)]
    pub resource_instances: HashMap<String, InstanceResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceResult {
    #[serde(default)]
    pub actions: HashMap<String, Effect>,
}

/// Per-action effects the engine returned for one resource instance.
/// An empty map means the instance was missing from the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub actions: HashMap<String, Effect>,
}

impl CheckResult {
    /// Effect for an action, matched case-insensitively
    pub fn effect_for(&self, action: &str) -> Option<Effect> {
        self.actions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(action))
            .map(|(_, effect)| *effect)
    }

    /// ALLOW if any requested action maps to ALLOW, DENY otherwise
    pub fn decision<S: AsRef<str>>(&self, requested: &[S]) -> Decision {
        if requested
            .iter()
            .any(|action| self.effect_for(action.as_ref()) == Some(Effect::Allow))
        {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Answer the engine gave, as opposed to a failure to get one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_rule_entry_allow_normalizes() {
        let rule = RuleEntry::allow("ADMIN", ["View_Report", "view_report", " edit "]);
        assert_eq!(rule.roles, vec!["admin"]);
        assert_eq!(rule.actions, vec!["view_report", "edit"]);
        assert_eq!(rule.effect, Effect::Allow);
        assert!(rule.has_role("Admin"));
        assert!(!rule.has_role("viewer"));
    }

    #[test]
    fn test_policy_envelope_wire_shape() {
        let doc = PolicyDocument::new("reports", vec![RuleEntry::allow("admin", ["read"])]);
        let value = serde_json::to_value(PolicyList {
            policies: vec![PolicyEnvelope::from(&doc)],
        })
        .unwrap();

        assert_eq!(
            value,
            json!({
                "policies": [{
                    "apiVersion": "api.cerbos.dev/v1",
                    "resourcePolicy": {
                        "version": "default",
                        "resource": "reports",
                        "rules": [{
                            "roles": ["admin"],
                            "actions": ["read"],
                            "effect": "EFFECT_ALLOW"
                        }]
                    }
                }]
            })
        );
    }

    #[test]
    fn test_unknown_policy_fields_survive_round_trip() {
        let wire = json!({
            "apiVersion": "api.cerbos.dev/v1",
            "metadata": { "annotations": { "owner": "finance" } },
            "resourcePolicy": {
                "version": "default",
                "resource": "reports",
                "importDerivedRoles": ["common_roles"],
                "rules": [{
                    "name": "owner-only",
                    "roles": ["editor"],
                    "actions": ["edit"],
                    "effect": "EFFECT_ALLOW",
                    "condition": { "match": { "expr": "request.resource.attr.owner == request.principal.id" } }
                }]
            }
        });

        let envelope: PolicyEnvelope = serde_json::from_value(wire.clone()).unwrap();
        let doc = PolicyDocument::from(envelope);
        assert_eq!(doc.rules[0].extra["name"], "owner-only");
        assert!(doc.rules[0].extra.contains_key("condition"));
        assert!(doc.policy_fields.contains_key("importDerivedRoles"));
        assert!(doc.envelope_fields.contains_key("metadata"));

        let back = serde_json::to_value(PolicyEnvelope::from(&doc)).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn test_check_response_parses_effects() {
        let response: CheckResponse = serde_json::from_value(json!({
            "resourceInstances": {
                "alice": { "actions": { "read": "EFFECT_ALLOW", "write": "EFFECT_DENY" } }
            }
        }))
        .unwrap();

        let actions = &response.resource_instances["alice"].actions;
        assert_eq!(actions["read"], Effect::Allow);
        assert_eq!(actions["write"], Effect::Deny);
    }

    #[test]
    fn test_check_result_decision() {
        let result = CheckResult {
            actions: HashMap::from([
                ("Read".to_string(), Effect::Allow),
                ("write".to_string(), Effect::Deny),
            ]),
        };
        assert_eq!(result.decision(&["read"]), Decision::Allow);
        assert_eq!(result.decision(&["write", "read"]), Decision::Allow);
        assert_eq!(result.decision(&["write"]), Decision::Deny);
        assert_eq!(result.decision(&["delete"]), Decision::Deny);
        assert_eq!(CheckResult::default().decision(&["read"]), Decision::Deny);
    }

    #[test]
    fn test_check_request_serializes_empty_instance() {
        let request = CheckRequest {
            request_id: "req-1".to_string(),
            principal: CheckPrincipal {
                id: "user-1".to_string(),
                roles: vec!["admin".to_string()],
            },
            resource: CheckResource {
                kind: "reports".to_string(),
                instances: HashMap::from([("alice".to_string(), InstanceAttributes::default())]),
            },
            actions: vec!["read".to_string()],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["resource"]["instances"]["alice"], json!({}));
        assert_eq!(value["principal"]["roles"], json!(["admin"]));
    }
}
