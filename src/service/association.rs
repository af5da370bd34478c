//! Many-to-many association reconciliation
//!
//! [`reconcile`] is the generic set diff; [`PermissionApplicationService`]
//! applies it to the links between a permission and its applications.

use crate::domain::{Application, ApplicationPermission, StringUuid};
use crate::error::{AppError, Result};
use crate::repository::{ApplicationRepository, RbacRepository};
use metrics::counter;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::sync::Arc;
use tracing::info;

/// Identity used when diffing associations.
///
/// For an entity it is the entity id; for an association object it is the id
/// of the entity on the far side of the link.
pub trait Keyed {
    type Key: Ord + Clone + Display;
    fn key(&self) -> Self::Key;
}

impl Keyed for Application {
    type Key = StringUuid;
    fn key(&self) -> StringUuid {
        self.id
    }
}

impl Keyed for ApplicationPermission {
    type Key = StringUuid;
    fn key(&self) -> StringUuid {
        self.application_id
    }
}

/// Associations to create and to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDiff<A> {
    pub to_add: Vec<A>,
    pub to_remove: Vec<A>,
}

impl<A> AssociationDiff<A> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff `current` associations against the `desired` key set.
///
/// `resolved` holds the entities found for `desired`; any desired key
/// without a resolved entity fails the whole call with `NotFound` naming it,
/// before anything is computed. New associations are built from resolved
/// entities with `build`; removals are the existing association objects
/// whose key is no longer desired.
pub fn reconcile<K, E, A, F>(
    entity_label: &str,
    current: Vec<A>,
    desired: &BTreeSet<K>,
    resolved: Vec<E>,
    build: F,
) -> Result<AssociationDiff<A>>
where
    K: Ord + Clone + Display,
    E: Keyed<Key = K>,
    A: Keyed<Key = K>,
    F: Fn(&E) -> A,
{
    let resolved: BTreeMap<K, E> = resolved.into_iter().map(|e| (e.key(), e)).collect();
    if let Some(missing) = desired.iter().find(|key| !resolved.contains_key(*key)) {
        return Err(AppError::NotFound(format!(
            "{} {} not found",
            entity_label, missing
        )));
    }

    let current_keys: BTreeSet<K> = current.iter().map(Keyed::key).collect();

    let to_add = desired
        .iter()
        .filter(|key| !current_keys.contains(*key))
        .filter_map(|key| resolved.get(key))
        .map(&build)
        .collect();

    let to_remove = current
        .into_iter()
        .filter(|association| !desired.contains(&association.key()))
        .collect();

    Ok(AssociationDiff { to_add, to_remove })
}

/// Keeps a permission's application links in line with a desired id list
pub struct PermissionApplicationService<R: RbacRepository, A: ApplicationRepository> {
    rbac_repo: Arc<R>,
    app_repo: Arc<A>,
}

impl<R: RbacRepository, A: ApplicationRepository> PermissionApplicationService<R, A> {
    pub fn new(rbac_repo: Arc<R>, app_repo: Arc<A>) -> Self {
        Self {
            rbac_repo,
            app_repo,
        }
    }

    /// Link the permission to exactly `application_ids`.
    ///
    /// Unknown permission or application ids fail with `NotFound` before any
    /// write. Additions and removals are stored in one transaction; when the
    /// links already match, the store is not touched.
    pub async fn update_permission_applications(
        &self,
        permission_id: StringUuid,
        application_ids: &[StringUuid],
    ) -> Result<AssociationDiff<ApplicationPermission>> {
        let permission = self
            .rbac_repo
            .find_permission_by_id(permission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Permission {} not found", permission_id)))?;

        let desired: BTreeSet<StringUuid> = application_ids.iter().copied().collect();
        let resolved = if desired.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<StringUuid> = desired.iter().copied().collect();
            self.app_repo.find_by_ids(&ids).await?
        };

        let current = self.app_repo.find_permission_links(permission.id).await?;

        let diff = reconcile("Application", current, &desired, resolved, |app| {
            ApplicationPermission {
                application_id: app.id,
                permission_id: permission.id,
            }
        })?;

        if diff.is_empty() {
            return Ok(diff);
        }

        self.app_repo
            .apply_link_changes(&diff.to_add, &diff.to_remove)
            .await?;

        counter!("roleguard_association_changes_total", "kind" => "added")
            .increment(diff.to_add.len() as u64);
        counter!("roleguard_association_changes_total", "kind" => "removed")
            .increment(diff.to_remove.len() as u64);
        info!(
            permission = %permission.name,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            "Permission applications updated"
        );

        Ok(diff)
    }

    /// Applications currently linked to the permission
    pub async fn get_permission_applications(
        &self,
        permission_id: StringUuid,
    ) -> Result<Vec<Application>> {
        let links = self.app_repo.find_permission_links(permission_id).await?;
        let ids: Vec<StringUuid> = links.iter().map(|link| link.application_id).collect();
        self.app_repo.find_by_ids(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Permission;
    use crate::repository::application::MockApplicationRepository;
    use crate::repository::rbac::MockRbacRepository;
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item(u32);

    impl Keyed for Item {
        type Key = u32;
        fn key(&self) -> u32 {
            self.0
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Link(u32);

    impl Keyed for Link {
        type Key = u32;
        fn key(&self) -> u32 {
            self.0
        }
    }

    fn ids(list: &[u32]) -> BTreeSet<u32> {
        list.iter().copied().collect()
    }

    fn items(list: &[u32]) -> Vec<Item> {
        list.iter().copied().map(Item).collect()
    }

    #[test]
    fn test_reconcile_adds_and_removes() {
        let current = vec![Link(1), Link(2)];
        let diff = reconcile("Item", current, &ids(&[2, 3]), items(&[2, 3]), |i| Link(i.0)).unwrap();

        assert_eq!(diff.to_add, vec![Link(3)]);
        assert_eq!(diff.to_remove, vec![Link(1)]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let current = vec![Link(1), Link(2)];
        let diff = reconcile("Item", current, &ids(&[1, 2]), items(&[1, 2]), |i| Link(i.0)).unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn test_reconcile_empty_desired_removes_all() {
        let current = vec![Link(1), Link(2)];
        let diff = reconcile("Item", current, &ids(&[]), Vec::<Item>::new(), |i| Link(i.0)).unwrap();

        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![Link(1), Link(2)]);
    }

    #[test]
    fn test_reconcile_unresolved_id_is_not_found() {
        let current = vec![Link(1)];
        let result = reconcile("Item", current, &ids(&[1, 4]), items(&[1]), |i| Link(i.0));

        match result {
            Err(AppError::NotFound(msg)) => assert_eq!(msg, "Item 4 not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    fn permission() -> Permission {
        Permission {
            name: "view_report".to_string(),
            display_name: "View Report".to_string(),
            ..Default::default()
        }
    }

    fn app(name: &str) -> Application {
        Application {
            id: StringUuid::new_v4(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_permission_applications_swaps_link() {
        let permission = permission();
        let permission_id = permission.id;
        let app1 = app("app1");
        let app2 = app("app2");
        let app1_id = app1.id;
        let app2_id = app2.id;
        let app2_clone = app2.clone();

        let mut rbac = MockRbacRepository::new();
        rbac.expect_find_permission_by_id()
            .with(eq(permission_id))
            .returning(move |_| Ok(Some(permission.clone())));

        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_ids()
            .withf(move |ids| ids == [app2_id])
            .times(1)
            .returning(move |_| Ok(vec![app2_clone.clone()]));
        apps.expect_find_permission_links()
            .with(eq(permission_id))
            .returning(move |pid| {
                Ok(vec![ApplicationPermission {
                    application_id: app1_id,
                    permission_id: pid,
                }])
            });

        let expected_add = vec![ApplicationPermission {
            application_id: app2.id,
            permission_id,
        }];
        let expected_remove = vec![ApplicationPermission {
            application_id: app1_id,
            permission_id,
        }];
        let (add_check, remove_check) = (expected_add.clone(), expected_remove.clone());
        apps.expect_apply_link_changes()
            .withf(move |to_add, to_remove| to_add == add_check && to_remove == remove_check)
            .times(1)
            .returning(|_, _| Ok(()));

        let service = PermissionApplicationService::new(Arc::new(rbac), Arc::new(apps));
        let diff = service
            .update_permission_applications(permission_id, &[app2.id])
            .await
            .unwrap();

        assert_eq!(diff.to_add, expected_add);
        assert_eq!(diff.to_remove, expected_remove);
    }

    #[tokio::test]
    async fn test_update_permission_applications_missing_app_has_no_side_effects() {
        let permission = permission();
        let permission_id = permission.id;
        let missing = StringUuid::new_v4();

        let mut rbac = MockRbacRepository::new();
        rbac.expect_find_permission_by_id()
            .returning(move |_| Ok(Some(permission.clone())));

        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_ids().returning(|_| Ok(vec![]));
        apps.expect_find_permission_links().returning(|_| Ok(vec![]));
        apps.expect_apply_link_changes().times(0);

        let service = PermissionApplicationService::new(Arc::new(rbac), Arc::new(apps));
        let result = service
            .update_permission_applications(permission_id, &[missing])
            .await;

        match result {
            Err(AppError::NotFound(msg)) => assert!(msg.contains(&missing.to_string())),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_permission_applications_unchanged_skips_write() {
        let permission = permission();
        let permission_id = permission.id;
        let app1 = app("app1");
        let app1_id = app1.id;

        let mut rbac = MockRbacRepository::new();
        rbac.expect_find_permission_by_id()
            .returning(move |_| Ok(Some(permission.clone())));

        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_ids()
            .returning(move |_| Ok(vec![app1.clone()]));
        apps.expect_find_permission_links().returning(move |pid| {
            Ok(vec![ApplicationPermission {
                application_id: app1_id,
                permission_id: pid,
            }])
        });
        apps.expect_apply_link_changes().times(0);

        let service = PermissionApplicationService::new(Arc::new(rbac), Arc::new(apps));
        let diff = service
            .update_permission_applications(permission_id, &[app1_id, app1_id])
            .await
            .unwrap();

        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn test_update_permission_applications_empty_skips_lookup() {
        let permission = permission();
        let permission_id = permission.id;
        let linked = StringUuid::new_v4();

        let mut rbac = MockRbacRepository::new();
        rbac.expect_find_permission_by_id()
            .returning(move |_| Ok(Some(permission.clone())));

        let mut apps = MockApplicationRepository::new();
        apps.expect_find_by_ids().times(0);
        apps.expect_find_permission_links().returning(move |pid| {
            Ok(vec![ApplicationPermission {
                application_id: linked,
                permission_id: pid,
            }])
        });
        apps.expect_apply_link_changes()
            .withf(|to_add, to_remove| to_add.is_empty() && to_remove.len() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        let service = PermissionApplicationService::new(Arc::new(rbac), Arc::new(apps));
        let diff = service
            .update_permission_applications(permission_id, &[])
            .await
            .unwrap();

        assert_eq!(diff.to_remove.len(), 1);
    }

    #[tokio::test]
    async fn test_update_permission_applications_unknown_permission() {
        let mut rbac = MockRbacRepository::new();
        rbac.expect_find_permission_by_id().returning(|_| Ok(None));

        let mut apps = MockApplicationRepository::new();
        apps.expect_apply_link_changes().times(0);

        let service = PermissionApplicationService::new(Arc::new(rbac), Arc::new(apps));
        let result = service
            .update_permission_applications(StringUuid::new_v4(), &[])
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
