//! Metric definitions
//!
//! Counters are emitted through the `metrics` facade and stay no-ops until
//! the host process installs a recorder.

use metrics::{counter, describe_counter};

/// Register metric descriptions and emit initial zero values so exporters
/// list every metric from startup, not just after first use.
pub fn describe_metrics() {
    describe_counter!(
        "roleguard_policy_check_total",
        "Permission checks against the policy engine by outcome (allow/deny/error)"
    );
    describe_counter!(
        "roleguard_policy_sync_total",
        "Policy document upserts by result (success/failure)"
    );
    describe_counter!(
        "roleguard_association_changes_total",
        "Application-permission links added or removed"
    );

    for outcome in ["allow", "deny", "error"] {
        counter!("roleguard_policy_check_total", "outcome" => outcome).absolute(0);
    }
    for result in ["success", "failure"] {
        counter!("roleguard_policy_sync_total", "result" => result).absolute(0);
    }
}
