//! Canonical tuple model.
//!
//! A tuple is `(subject, relation, object[, condition])`. Objects are typed
//! identifiers (`team:t1`), and subjects may carry a sub-relation
//! (`team:t1#member`). [`TupleKey`] is the structural identity used for
//! diffing; [`Tuple`] additionally carries the condition, which takes part in
//! full-tuple equality.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Relation vocabulary.
pub mod relation {
    pub const ASSIGNEE: &str = "assignee";
    pub const PARENT: &str = "parent";
    pub const MEMBER: &str = "member";
    pub const ADMIN: &str = "admin";
    pub const VIEW: &str = "view";
    pub const EDIT: &str = "edit";
    pub const CREATE: &str = "create";
    pub const DELETE: &str = "delete";
    pub const GET_PERMISSIONS: &str = "get_permissions";
    pub const SET_PERMISSIONS: &str = "set_permissions";
    /// Folder-resource relation. Tuples with it carry a subresource filter.
    pub const RESOURCE: &str = "resource";

    /// Relations a permission grant on a folder or dashboard can produce.
    pub const PERMISSION_RELATIONS: [&str; 7] = [
        VIEW,
        EDIT,
        CREATE,
        DELETE,
        GET_PERMISSIONS,
        SET_PERMISSIONS,
        RESOURCE,
    ];
}

/// Object types.
pub mod object_type {
    pub const USER: &str = "user";
    pub const SERVICE_ACCOUNT: &str = "service-account";
    pub const TEAM: &str = "team";
    pub const FOLDER: &str = "folder";
    pub const DASHBOARD: &str = "dashboard";
    pub const ROLE: &str = "role";
    pub const ANONYMOUS: &str = "anonymous";
}

/// Name of the only condition the engine produces.
pub const SUBRESOURCE_FILTER: &str = "subresource_filter";

/// Prefix shared by all basic role ids.
pub const BASIC_ROLE_PREFIX: &str = "basic_";

/// Format a typed object id, e.g. `team:t1`.
#[must_use]
pub fn object(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}

/// Format a subject with a sub-relation, e.g. `team:t1#member`.
#[must_use]
pub fn subject_set(kind: &str, id: &str, relation: &str) -> String {
    format!("{kind}:{id}#{relation}")
}

/// Type-only object prefix, e.g. `team:`.
#[must_use]
pub fn type_prefix(kind: &str) -> String {
    format!("{kind}:")
}

/// Role id of a basic org role: `Editor` becomes `basic_editor`.
#[must_use]
pub fn basic_role_uid(role: &str) -> String {
    let normalized = role.trim().to_lowercase().replace(' ', "_");
    format!("{BASIC_ROLE_PREFIX}{normalized}")
}

/// Structural identity of a tuple. Conditions are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleKey {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

impl Display for TupleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

/// Named condition payload attached to a tuple.
///
/// The subresource set is ordered, so equality never depends on the order in
/// which capabilities were collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub subresources: BTreeSet<String>,
}

impl Condition {
    /// Subresource filter bundling the given capabilities.
    pub fn subresource_filter<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: SUBRESOURCE_FILTER.to_string(),
            subresources: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    /// Union `other` into this condition. Returns false when the names differ.
    pub fn merge(&mut self, other: &Condition) -> bool {
        if self.name != other.name {
            return false;
        }
        self.subresources.extend(other.subresources.iter().cloned());
        true
    }
}

/// A tuple: key plus optional condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub subject: String,
    pub relation: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Tuple {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Structural key of this tuple.
    #[must_use]
    pub fn key(&self) -> TupleKey {
        TupleKey::new(&self.subject, &self.relation, &self.object)
    }

    /// Merge another tuple with the same key into this one.
    ///
    /// Matching conditions are unioned. Otherwise the incoming condition
    /// replaces the current one.
    pub fn merge(&mut self, other: Tuple) {
        match (&mut self.condition, other.condition) {
            (Some(current), Some(incoming)) => {
                if !current.merge(&incoming) {
                    *current = incoming;
                }
            }
            (current, incoming) => *current = incoming,
        }
    }
}

impl From<TupleKey> for Tuple {
    fn from(key: TupleKey) -> Self {
        Self::new(key.subject, key.relation, key.object)
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)?;
        if let Some(condition) = &self.condition {
            let caps: Vec<&str> = condition.subresources.iter().map(String::as_str).collect();
            write!(f, " [{}: {}]", condition.name, caps.join(","))?;
        }
        Ok(())
    }
}

/// Kind of subject a tuple grants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    User,
    ServiceAccount,
    /// `team:<id>#member`
    TeamMember,
    /// `role:basic_<name>#assignee`
    BasicRole,
    /// Any other `role:<id>#assignee`
    Role,
    /// `anonymous:*`
    Anonymous,
    Folder,
    Other,
}

impl SubjectKind {
    /// Classify a subject string.
    pub fn parse(subject: &str) -> SyncResult<Self> {
        let (kind, rest) = subject
            .split_once(':')
            .ok_or_else(|| SyncError::invalid_tuple(subject, "missing ':' in subject"))?;
        let (id, sub_relation) = match rest.split_once('#') {
            Some((id, rel)) => (id, Some(rel)),
            None => (rest, None),
        };
        if id.is_empty() {
            return Err(SyncError::invalid_tuple(subject, "empty subject id"));
        }

        Ok(match (kind, sub_relation) {
            (object_type::USER, None) => Self::User,
            (object_type::SERVICE_ACCOUNT, None) => Self::ServiceAccount,
            (object_type::TEAM, Some(relation::MEMBER)) => Self::TeamMember,
            (object_type::ROLE, Some(relation::ASSIGNEE)) if id.starts_with(BASIC_ROLE_PREFIX) => {
                Self::BasicRole
            }
            (object_type::ROLE, Some(relation::ASSIGNEE)) => Self::Role,
            (object_type::ANONYMOUS, None) => Self::Anonymous,
            (object_type::FOLDER, None) => Self::Folder,
            _ => Self::Other,
        })
    }
}

/// Restricts which subjects a store collector considers its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubjectMatcher {
    #[default]
    Any,
    OneOf(Vec<SubjectKind>),
}

impl SubjectMatcher {
    pub fn one_of(kinds: impl IntoIterator<Item = SubjectKind>) -> Self {
        Self::OneOf(kinds.into_iter().collect())
    }

    /// Whether `subject` belongs to this matcher. Unparseable subjects never match.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(kinds) => {
                SubjectKind::parse(subject).is_ok_and(|kind| kinds.contains(&kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_role_uid() {
        assert_eq!(basic_role_uid("Editor"), "basic_editor");
        assert_eq!(basic_role_uid("Viewer"), "basic_viewer");
        assert_eq!(basic_role_uid("Grafana Admin"), "basic_grafana_admin");
    }

    #[test]
    fn test_condition_equality_ignores_order() {
        let a = Condition::subresource_filter(["dashboards:view", "dashboards:edit"]);
        let b = Condition::subresource_filter(["dashboards:edit", "dashboards:view"]);
        assert_eq!(a, b);

        let with_a = Tuple::new("user:u1", relation::RESOURCE, "folder:f1").with_condition(a);
        let with_b = Tuple::new("user:u1", relation::RESOURCE, "folder:f1").with_condition(b);
        assert_eq!(with_a, with_b);
    }

    #[test]
    fn test_tuple_merge_unions_capabilities() {
        let mut tuple = Tuple::new("user:u1", relation::RESOURCE, "folder:f1")
            .with_condition(Condition::subresource_filter(["dashboards:view"]));
        tuple.merge(
            Tuple::new("user:u1", relation::RESOURCE, "folder:f1")
                .with_condition(Condition::subresource_filter(["dashboards:edit"])),
        );

        let condition = tuple.condition.unwrap();
        assert_eq!(condition.name, SUBRESOURCE_FILTER);
        assert_eq!(
            condition.subresources.into_iter().collect::<Vec<_>>(),
            vec!["dashboards:edit".to_string(), "dashboards:view".to_string()]
        );
    }

    #[test]
    fn test_key_ignores_condition() {
        let plain = Tuple::new("user:u1", relation::RESOURCE, "folder:f1");
        let conditioned = plain
            .clone()
            .with_condition(Condition::subresource_filter(["alert.rules:view"]));
        assert_eq!(plain.key(), conditioned.key());
        assert_ne!(plain, conditioned);
    }

    #[test]
    fn test_subject_kind() {
        assert_eq!(SubjectKind::parse("user:u1").unwrap(), SubjectKind::User);
        assert_eq!(
            SubjectKind::parse("service-account:sa1").unwrap(),
            SubjectKind::ServiceAccount
        );
        assert_eq!(
            SubjectKind::parse("team:t1#member").unwrap(),
            SubjectKind::TeamMember
        );
        assert_eq!(
            SubjectKind::parse("role:basic_editor#assignee").unwrap(),
            SubjectKind::BasicRole
        );
        assert_eq!(
            SubjectKind::parse("role:custom1#assignee").unwrap(),
            SubjectKind::Role
        );
        assert_eq!(SubjectKind::parse("anonymous:*").unwrap(), SubjectKind::Anonymous);
        assert_eq!(SubjectKind::parse("folder:f1").unwrap(), SubjectKind::Folder);
        assert_eq!(SubjectKind::parse("team:t1").unwrap(), SubjectKind::Other);
        assert!(SubjectKind::parse("nobody").is_err());
        assert!(SubjectKind::parse("user:").is_err());
    }

    #[test]
    fn test_subject_matcher() {
        let matcher = SubjectMatcher::one_of([SubjectKind::User, SubjectKind::ServiceAccount]);
        assert!(matcher.matches("user:u1"));
        assert!(matcher.matches("service-account:sa1"));
        assert!(!matcher.matches("anonymous:*"));
        assert!(!matcher.matches("garbage"));
        assert!(SubjectMatcher::Any.matches("garbage"));
    }

    #[test]
    fn test_display() {
        let tuple = Tuple::new("team:t1#member", relation::VIEW, "dashboard:d1");
        assert_eq!(tuple.to_string(), "team:t1#member view dashboard:d1");
        assert_eq!(tuple.key().to_string(), "team:t1#member view dashboard:d1");
    }
}
