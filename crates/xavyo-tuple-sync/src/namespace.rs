//! Tenant scoping shared by legacy queries and tuple store requests.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::SyncError;

/// Org id the legacy schema uses for roles that are not owned by any org.
pub const GLOBAL_ORG_ID: i64 = 0;

/// Org id that maps to the `default` namespace.
pub const DEFAULT_ORG_ID: i64 = 1;

const CLUSTER: &str = "cluster";
const DEFAULT: &str = "default";
const ORG_PREFIX: &str = "org-";

/// Scope of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// A single tenant org.
    Org(i64),
    /// The cluster-wide namespace for resources that are not org owned.
    Cluster,
}

impl Namespace {
    /// Org id used for legacy queries in this namespace.
    #[must_use]
    pub fn org_id(&self) -> i64 {
        match self {
            Self::Org(id) => *id,
            Self::Cluster => GLOBAL_ORG_ID,
        }
    }

    #[must_use]
    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster)
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Org(DEFAULT_ORG_ID) => write!(f, "{DEFAULT}"),
            Self::Org(id) => write!(f, "{ORG_PREFIX}{id}"),
            Self::Cluster => write!(f, "{CLUSTER}"),
        }
    }
}

impl FromStr for Namespace {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            DEFAULT => Ok(Self::Org(DEFAULT_ORG_ID)),
            CLUSTER => Ok(Self::Cluster),
            _ => s
                .strip_prefix(ORG_PREFIX)
                .and_then(|id| id.parse::<i64>().ok())
                .filter(|id| *id > GLOBAL_ORG_ID)
                .map(Self::Org)
                .ok_or_else(|| SyncError::invalid_tuple(s, "not a namespace")),
        }
    }
}
