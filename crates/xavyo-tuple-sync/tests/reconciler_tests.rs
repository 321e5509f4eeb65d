//! Resource reconciler tests against the in-memory legacy source and store.
//!
//! Covers convergence, idempotence, bundled permission merging, orphan
//! cleanup, batching, partial failure, dry-run and isolation between
//! reconcilers that share objects.

mod common;

use common::{config, member, org_role, user_permission, Harness};
use xavyo_tuple_sync::legacy::{FolderRow, LegacyFixture, RolePermissionRow, RoleBindingRow};
use xavyo_tuple_sync::store::WriteCall;
use xavyo_tuple_sync::{Condition, Namespace, SyncError, Tuple};

const ORG: Namespace = Namespace::Org(1);

// =============================================================================
// Team membership
// =============================================================================

#[tokio::test]
async fn test_team_member_is_written_then_converged() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_team_members(1, vec![member("t1", "u1")]),
    );
    let reconciler = harness.reconciler("team_membership");

    let first = reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!(first.writes, 1);
    assert_eq!(first.deletes, 0);
    assert_eq!(first.batches, 1);
    assert!(first.applied);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "member", "team:t1")]
    );

    let second = reconciler.reconcile(&ORG).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.batches, 0);
    assert_eq!(harness.store.write_calls().len(), 1);
}

#[tokio::test]
async fn test_stale_team_tuple_is_deleted() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_team_members(1, vec![member("t1", "u1")]),
    );
    harness
        .store
        .seed(ORG, [Tuple::new("user:u2", "member", "team:t1")])
        .await;
    let reconciler = harness.reconciler("team_membership");

    let summary = reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!(summary.writes, 1);
    assert_eq!(summary.deletes, 1);
    // deletes and writes go out in separate requests
    assert_eq!(
        harness.store.write_calls(),
        vec![
            WriteCall {
                namespace: ORG,
                writes: 0,
                deletes: 1
            },
            WriteCall {
                namespace: ORG,
                writes: 1,
                deletes: 0
            },
        ]
    );
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "member", "team:t1")]
    );

    assert!(reconciler.reconcile(&ORG).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_promotion_to_team_admin_replaces_member() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_team_members(1, vec![member("t1", "u1")]),
    );
    let reconciler = harness.reconciler("team_membership");
    reconciler.reconcile(&ORG).await.unwrap();

    harness
        .source
        .update(|f| {
            if let Some(rows) = f.team_members.get_mut(&1) {
                rows[0].permission = 4;
            }
        })
        .await;

    let summary = reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!((summary.writes, summary.deletes), (1, 1));
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "admin", "team:t1")]
    );
}

#[tokio::test]
async fn test_deleted_team_is_cleaned_up_as_orphan() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_team_members(1, vec![member("t1", "u1")]),
    );
    harness
        .store
        .seed(
            ORG,
            [
                Tuple::new("user:u1", "member", "team:t1"),
                Tuple::new("user:u7", "member", "team:gone"),
                Tuple::new("user:u8", "admin", "team:gone"),
            ],
        )
        .await;

    let summary = harness
        .reconciler("team_membership")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.orphans, 2);
    assert_eq!(summary.deletes, 2);
    assert_eq!(summary.writes, 0);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "member", "team:t1")]
    );
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_org(2, "Ops")
            .with_team_members(1, vec![member("t1", "u1")])
            .with_team_members(2, vec![member("t9", "u9")]),
    );
    let reconciler = harness.reconciler("team_membership");
    reconciler.reconcile(&ORG).await.unwrap();
    reconciler.reconcile(&Namespace::Org(2)).await.unwrap();

    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "member", "team:t1")]
    );
    assert_eq!(
        harness.store.tuples(Namespace::Org(2)).await,
        vec![Tuple::new("user:u9", "member", "team:t9")]
    );
}

// =============================================================================
// Batching and failure
// =============================================================================

fn large_team(size: usize) -> LegacyFixture {
    LegacyFixture::default().with_org(1, "Main Org.").with_team_members(
        1,
        (0..size).map(|i| member("t1", &format!("u{i:03}"))).collect(),
    )
}

#[tokio::test]
async fn test_writes_are_batched() {
    let harness = Harness::new(large_team(250));

    let summary = harness
        .reconciler("team_membership")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.writes, 250);
    assert_eq!(summary.batches, 3);
    let sizes: Vec<usize> = harness
        .store
        .write_calls()
        .iter()
        .map(|call| call.writes)
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[tokio::test]
async fn test_configured_batch_size() {
    let harness = Harness::with_config(large_team(10), config(&[("RECONCILE_BATCH_SIZE", "4")]));

    let summary = harness
        .reconciler("team_membership")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.batches, 3);
    let sizes: Vec<usize> = harness
        .store
        .write_calls()
        .iter()
        .map(|call| call.writes)
        .collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[tokio::test]
async fn test_failed_batch_is_not_rolled_back_and_next_pass_heals() {
    let harness = Harness::new(large_team(250));
    let reconciler = harness.reconciler("team_membership");
    harness.store.fail_writes_from(Some(1));

    let err = reconciler.reconcile(&ORG).await.unwrap_err();
    assert!(matches!(err, SyncError::Store { .. }));
    assert_eq!(harness.store.tuples(ORG).await.len(), 100);

    harness.store.fail_writes_from(None);
    let healed = reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!(healed.writes, 150);
    assert_eq!(healed.deletes, 0);
    assert_eq!(harness.store.tuples(ORG).await.len(), 250);

    assert!(reconciler.reconcile(&ORG).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_legacy_failure_aborts_without_writes() {
    let harness = Harness::new(large_team(3));
    harness.source.set_failing(true);

    let err = harness
        .reconciler("team_membership")
        .reconcile(&ORG)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Database(_)));
    assert!(harness.store.write_calls().is_empty());
}

#[tokio::test]
async fn test_store_read_failure_aborts() {
    let harness = Harness::new(large_team(3));
    harness.store.fail_reads(true);

    let result = harness.reconciler("team_membership").reconcile(&ORG).await;

    assert!(result.is_err());
    assert!(harness.store.write_calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_computes_without_writing() {
    let harness = Harness::with_config(large_team(5), config(&[]).with_dry_run(true));
    harness
        .store
        .seed(ORG, [Tuple::new("user:stale", "member", "team:t1")])
        .await;

    let summary = harness
        .reconciler("team_membership")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.writes, 5);
    assert_eq!(summary.deletes, 1);
    assert_eq!(summary.batches, 0);
    assert!(!summary.applied);
    assert!(harness.store.write_calls().is_empty());
    assert_eq!(harness.store.tuples(ORG).await.len(), 1);
}

// =============================================================================
// Managed permissions
// =============================================================================

#[tokio::test]
async fn test_bundled_folder_actions_merge_into_one_tuple() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_managed_permissions(
                1,
                vec![
                    user_permission("u1", "dashboards:read", "folders", "fold1"),
                    user_permission("u1", "dashboards:write", "folders", "fold1"),
                ],
            ),
    );

    let reconciler = harness.reconciler("managed_permissions");
    let summary = reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!(summary.writes, 1);

    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "resource", "folder:fold1")
            .with_condition(Condition::subresource_filter([
                "dashboards:edit",
                "dashboards:view"
            ]))]
    );
    assert!(reconciler.reconcile(&ORG).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_changed_capabilities_replace_stored_tuple() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_managed_permissions(
                1,
                vec![
                    user_permission("u1", "dashboards:read", "folders", "fold1"),
                    user_permission("u1", "dashboards:write", "folders", "fold1"),
                ],
            ),
    );
    harness
        .store
        .seed(
            ORG,
            [Tuple::new("user:u1", "resource", "folder:fold1")
                .with_condition(Condition::subresource_filter(["dashboards:view"]))],
        )
        .await;

    let summary = harness
        .reconciler("managed_permissions")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!((summary.writes, summary.deletes), (1, 1));
    let stored = harness.store.tuples(ORG).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].condition,
        Some(Condition::subresource_filter([
            "dashboards:view",
            "dashboards:edit"
        ]))
    );
}

#[tokio::test]
async fn test_revoked_dashboard_grant_is_orphaned() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_managed_permissions(
                1,
                vec![user_permission("u1", "folders:read", "folders", "fold1")],
            ),
    );
    harness
        .store
        .seed(
            ORG,
            [
                Tuple::new("user:u1", "view", "folder:fold1"),
                Tuple::new("user:u1", "edit", "dashboard:dash1"),
                // owned by role_permissions
                Tuple::new("role:custom1#assignee", "view", "dashboard:dash1"),
            ],
        )
        .await;

    let summary = harness
        .reconciler("managed_permissions")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.orphans, 1);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![
            Tuple::new("role:custom1#assignee", "view", "dashboard:dash1"),
            Tuple::new("user:u1", "view", "folder:fold1"),
        ]
    );
}

#[tokio::test]
async fn test_untranslatable_permissions_are_skipped() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_managed_permissions(
                1,
                vec![
                    user_permission("u1", "folders:read", "folders", "*"),
                    user_permission("u1", "teams:read", "teams", "t1"),
                    user_permission("u1", "dashboards:read", "dashboards", "dash1"),
                ],
            ),
    );

    let summary = harness
        .reconciler("managed_permissions")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.writes, 1);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "view", "dashboard:dash1")]
    );
}

// =============================================================================
// Roles
// =============================================================================

#[tokio::test]
async fn test_basic_role_change_moves_binding() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_basic_role_bindings(1, vec![org_role("u1", "Viewer")]),
    );
    let reconciler = harness.reconciler("basic_role_bindings");
    reconciler.reconcile(&ORG).await.unwrap();

    harness
        .source
        .update(|f| {
            f.basic_role_bindings.insert(1, vec![org_role("u1", "Editor")]);
        })
        .await;
    let summary = reconciler.reconcile(&ORG).await.unwrap();

    assert_eq!((summary.writes, summary.deletes), (1, 1));
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "assignee", "role:basic_editor")]
    );
}

#[tokio::test]
async fn test_anonymous_and_basic_role_bindings_do_not_interfere() {
    let harness = Harness::with_config(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_basic_role_bindings(1, vec![org_role("u1", "Viewer")]),
        config(&[("ANONYMOUS_ENABLED", "true")]),
    );
    let basic = harness.reconciler("basic_role_bindings");
    let anonymous = harness.reconciler("anonymous_bindings");

    basic.reconcile(&ORG).await.unwrap();
    anonymous.reconcile(&ORG).await.unwrap();
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![
            Tuple::new("anonymous:*", "assignee", "role:basic_viewer"),
            Tuple::new("user:u1", "assignee", "role:basic_viewer"),
        ]
    );

    // each reconciler sees only its own subjects
    assert!(basic.reconcile(&ORG).await.unwrap().is_noop());
    assert!(anonymous.reconcile(&ORG).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_disabling_anonymous_access_removes_grant() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_basic_role_bindings(1, vec![org_role("u1", "Viewer")]),
    );
    harness
        .store
        .seed(
            ORG,
            [
                Tuple::new("anonymous:*", "assignee", "role:basic_editor"),
                Tuple::new("user:u1", "assignee", "role:basic_viewer"),
            ],
        )
        .await;

    let summary = harness
        .reconciler("anonymous_bindings")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.deletes, 1);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("user:u1", "assignee", "role:basic_viewer")]
    );
}

#[tokio::test]
async fn test_custom_role_orphans_skip_basic_roles() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_custom_role_bindings(
                1,
                vec![RoleBindingRow {
                    role_uid: "custom1".to_string(),
                    team_uid: Some("t1".to_string()),
                    ..Default::default()
                }],
            ),
    );
    harness
        .store
        .seed(
            ORG,
            [
                Tuple::new("user:u1", "assignee", "role:deleted"),
                Tuple::new("user:u1", "assignee", "role:basic_viewer"),
            ],
        )
        .await;

    let summary = harness
        .reconciler("custom_role_bindings")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.writes, 1);
    assert_eq!(summary.orphans, 1);
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![
            Tuple::new("team:t1#member", "assignee", "role:custom1"),
            Tuple::new("user:u1", "assignee", "role:basic_viewer"),
        ]
    );
}

#[tokio::test]
async fn test_global_role_permissions_use_cluster_namespace() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_role_permissions(
                0,
                vec![RolePermissionRow::new(
                    "global_reader",
                    "dashboards:read",
                    "dashboards",
                    "dash1",
                )],
            )
            .with_role_permissions(
                1,
                vec![RolePermissionRow::new(
                    "org_reader",
                    "folders:read",
                    "folders",
                    "fold1",
                )],
            ),
    );

    let summary = harness
        .global("global_role_permissions")
        .reconcile()
        .await
        .unwrap();
    assert_eq!(summary.writes, 1);
    assert_eq!(
        harness.store.tuples(Namespace::Cluster).await,
        vec![Tuple::new(
            "role:global_reader#assignee",
            "view",
            "dashboard:dash1"
        )]
    );
    assert!(harness.store.tuples(ORG).await.is_empty());

    harness
        .reconciler("role_permissions")
        .reconcile(&ORG)
        .await
        .unwrap();
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("role:org_reader#assignee", "view", "folder:fold1")]
    );
}

#[tokio::test]
async fn test_revoked_global_grant_is_removed_from_cluster() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_role_permissions(
                0,
                vec![RolePermissionRow::new(
                    "g1",
                    "dashboards:read",
                    "dashboards",
                    "dash1",
                )],
            ),
    );
    let global = harness.global("global_role_permissions");

    global.reconcile().await.unwrap();
    assert_eq!(
        harness.store.tuples(Namespace::Cluster).await,
        vec![Tuple::new("role:g1#assignee", "view", "dashboard:dash1")]
    );

    harness
        .source
        .update(|f| {
            f.role_permissions.remove(&0);
        })
        .await;
    let summary = global.reconcile().await.unwrap();

    assert_eq!(summary.objects, 0);
    assert_eq!(summary.deletes, 1);
    assert_eq!(summary.orphans, 1);
    assert!(harness.store.tuples(Namespace::Cluster).await.is_empty());

    assert!(global.reconcile().await.unwrap().is_noop());
}

// =============================================================================
// Folder tree
// =============================================================================

#[tokio::test]
async fn test_folder_moved_to_root_loses_parent() {
    let harness = Harness::new(LegacyFixture::default().with_org(1, "Main Org.").with_folders(
        1,
        vec![
            FolderRow::new("root", None),
            FolderRow::new("child", Some("root")),
        ],
    ));
    let reconciler = harness.reconciler("folder_tree");
    reconciler.reconcile(&ORG).await.unwrap();
    assert_eq!(
        harness.store.tuples(ORG).await,
        vec![Tuple::new("folder:root", "parent", "folder:child")]
    );

    harness
        .source
        .update(|f| {
            f.folders
                .insert(1, vec![FolderRow::new("root", None), FolderRow::new("child", None)]);
        })
        .await;
    let summary = reconciler.reconcile(&ORG).await.unwrap();

    assert_eq!(summary.deletes, 1);
    assert_eq!(summary.orphans, 0);
    assert!(harness.store.tuples(ORG).await.is_empty());
}

#[tokio::test]
async fn test_deleted_folder_parent_tuple_is_orphaned() {
    let harness = Harness::new(
        LegacyFixture::default()
            .with_org(1, "Main Org.")
            .with_folders(1, vec![FolderRow::new("root", None)]),
    );
    harness
        .store
        .seed(ORG, [Tuple::new("folder:root", "parent", "folder:removed")])
        .await;

    let summary = harness
        .reconciler("folder_tree")
        .reconcile(&ORG)
        .await
        .unwrap();

    assert_eq!(summary.orphans, 1);
    assert!(harness.store.tuples(ORG).await.is_empty());
}
