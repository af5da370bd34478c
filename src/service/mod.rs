//! Business logic layer

pub mod association;
pub mod authorization;
pub mod rbac;
pub mod role_resolution;
pub mod rule_set;

pub use association::{reconcile, AssociationDiff, Keyed, PermissionApplicationService};
pub use authorization::AuthorizationService;
pub use rbac::RbacService;
pub use role_resolution::RoleResolutionService;
pub use rule_set::{RolePermissionMap, RuleSetReconciler};
