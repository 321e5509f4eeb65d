//! The fixed set of reconcilers the daemon runs.
//!
//! | name | scope | relations | subjects | orphan scan |
//! |---|---|---|---|---|
//! | `team_membership` | org | member, admin | user, service account | `team:` |
//! | `folder_tree` | org | parent | folder | `folder:` |
//! | `managed_permissions` | org | permission relations | user, service account, team, basic role | `folder:`, `dashboard:` |
//! | `basic_role_bindings` | org | assignee | user, service account | none |
//! | `custom_role_bindings` | org | assignee | user, service account, team, basic role | `role:` except basic roles |
//! | `role_permissions` | org | permission relations | custom role | `folder:`, `dashboard:` |
//! | `anonymous_bindings` | org | assignee | anonymous | none |
//! | `global_role_permissions` | cluster | permission relations | custom role | `folder:`, `dashboard:` |
//!
//! Reconcilers that share objects and relations own disjoint subject kinds.

use std::sync::Arc;

use super::{GlobalReconciler, OrphanSpec, ResourceReconciler};
use crate::config::SyncConfig;
use crate::legacy::{
    AnonymousBindingCollector, BasicRoleBindingCollector, CustomRoleBindingCollector,
    FolderTreeCollector, LegacyCollector, LegacySource, ManagedPermissionCollector,
    RolePermissionCollector, TeamMembershipCollector,
};
use crate::scheduler::ScheduledReconciler;
use crate::store::{StoreCollector, TupleStore};
use crate::tuple::{
    object_type, relation, type_prefix, SubjectKind, SubjectMatcher, BASIC_ROLE_PREFIX,
};

/// Build the standard reconciler list, in execution order.
pub fn standard_reconcilers(
    source: Arc<dyn LegacySource>,
    store: Arc<dyn TupleStore>,
    config: &SyncConfig,
) -> Vec<ScheduledReconciler> {
    let build = |name: &str,
                 legacy: Arc<dyn LegacyCollector>,
                 relations: &[&str],
                 subjects: &[SubjectKind],
                 orphans: Vec<OrphanSpec>| {
        let collector = StoreCollector::new(
            relations.iter().copied(),
            SubjectMatcher::one_of(subjects.iter().copied()),
            config.store_page_size,
        );
        ResourceReconciler::new(name, legacy, collector, store.clone())
            .with_orphans(orphans)
            .with_batch_size(config.batch_size)
            .with_dry_run(config.dry_run)
    };

    let permission_relations = relation::PERMISSION_RELATIONS;
    let resource_orphans = || {
        vec![
            OrphanSpec::new(type_prefix(object_type::FOLDER), permission_relations),
            OrphanSpec::new(type_prefix(object_type::DASHBOARD), permission_relations),
        ]
    };
    let identities = [SubjectKind::User, SubjectKind::ServiceAccount];
    let grantees = [
        SubjectKind::User,
        SubjectKind::ServiceAccount,
        SubjectKind::TeamMember,
        SubjectKind::BasicRole,
    ];
    let membership = [relation::MEMBER, relation::ADMIN];

    vec![
        ScheduledReconciler::PerOrg(build(
            "team_membership",
            Arc::new(TeamMembershipCollector::new(source.clone())),
            &membership,
            &identities,
            vec![OrphanSpec::new(type_prefix(object_type::TEAM), membership)],
        )),
        ScheduledReconciler::PerOrg(build(
            "folder_tree",
            Arc::new(FolderTreeCollector::new(
                source.clone(),
                config.folder_page_size,
            )),
            &[relation::PARENT],
            &[SubjectKind::Folder],
            vec![OrphanSpec::new(
                type_prefix(object_type::FOLDER),
                [relation::PARENT],
            )],
        )),
        ScheduledReconciler::PerOrg(build(
            "managed_permissions",
            Arc::new(ManagedPermissionCollector::new(source.clone())),
            &permission_relations,
            &grantees,
            resource_orphans(),
        )),
        ScheduledReconciler::PerOrg(build(
            "basic_role_bindings",
            Arc::new(BasicRoleBindingCollector::new(source.clone())),
            &[relation::ASSIGNEE],
            &identities,
            Vec::new(),
        )),
        ScheduledReconciler::PerOrg(build(
            "custom_role_bindings",
            Arc::new(CustomRoleBindingCollector::new(source.clone())),
            &[relation::ASSIGNEE],
            &grantees,
            vec![OrphanSpec::new(type_prefix(object_type::ROLE), [relation::ASSIGNEE])
                .excluding(format!("{}:{BASIC_ROLE_PREFIX}", object_type::ROLE))],
        )),
        ScheduledReconciler::PerOrg(build(
            "role_permissions",
            Arc::new(RolePermissionCollector::new(source.clone())),
            &permission_relations,
            &[SubjectKind::Role],
            resource_orphans(),
        )),
        ScheduledReconciler::PerOrg(build(
            "anonymous_bindings",
            Arc::new(AnonymousBindingCollector::new(
                source.clone(),
                config.anonymous.clone(),
            )),
            &[relation::ASSIGNEE],
            &[SubjectKind::Anonymous],
            Vec::new(),
        )),
        ScheduledReconciler::Global(GlobalReconciler::new(build(
            "global_role_permissions",
            Arc::new(RolePermissionCollector::new(source)),
            &permission_relations,
            &[SubjectKind::Role],
            resource_orphans(),
        ))),
    ]
}
