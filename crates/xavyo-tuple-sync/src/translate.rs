//! Translation of legacy `(action, scope)` permissions into tuples.
//!
//! Folder actions scoped to a folder become direct relations on the folder.
//! Actions on other resources scoped to a folder become one folder-resource
//! tuple whose condition lists the granted capabilities, so several actions
//! for the same subject and folder merge into a single tuple. Dashboard
//! actions scoped to a dashboard become direct relations on the dashboard.

use thiserror::Error;

use crate::tuple::{object, object_type, relation, Condition, Tuple};

/// Legacy scope kind for folders.
pub const SCOPE_FOLDERS: &str = "folders";
/// Legacy scope kind for dashboards.
pub const SCOPE_DASHBOARDS: &str = "dashboards";

const RESOURCE_FOLDERS: &str = "folders";
const RESOURCE_DASHBOARDS: &str = "dashboards";
const RESOURCE_ALERT_RULES: &str = "alert.rules";

/// Reasons a legacy permission cannot be expressed as a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("unsupported scope kind '{0}'")]
    UnsupportedScope(String),

    #[error("scope identifier '{0}' does not name a single resource")]
    UnsupportedIdentifier(String),

    #[error("action '{action}' cannot apply to scope kind '{kind}'")]
    ScopeMismatch { action: String, kind: String },
}

/// A legacy action resolved to a resource type and relation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatedAction {
    pub resource: &'static str,
    pub verb: &'static str,
}

impl TranslatedAction {
    /// Capability string used inside subresource filters.
    #[must_use]
    pub fn capability(&self) -> String {
        format!("{}:{}", self.resource, self.verb)
    }
}

/// Resolve a legacy action such as `dashboards:write`.
pub fn translate_action(action: &str) -> Result<TranslatedAction, TranslationError> {
    let unsupported = || TranslationError::UnsupportedAction(action.to_string());
    let (prefix, op) = action.rsplit_once(':').ok_or_else(unsupported)?;

    let (resource, permissions) = match prefix {
        "folders" => (RESOURCE_FOLDERS, false),
        "folders.permissions" => (RESOURCE_FOLDERS, true),
        "dashboards" => (RESOURCE_DASHBOARDS, false),
        "dashboards.permissions" => (RESOURCE_DASHBOARDS, true),
        "alert.rules" => (RESOURCE_ALERT_RULES, false),
        _ => return Err(unsupported()),
    };

    let verb = match (permissions, op) {
        (false, "read") => relation::VIEW,
        (false, "write") => relation::EDIT,
        (false, "create") => relation::CREATE,
        (false, "delete") => relation::DELETE,
        (true, "read") => relation::GET_PERMISSIONS,
        (true, "write") => relation::SET_PERMISSIONS,
        _ => return Err(unsupported()),
    };

    Ok(TranslatedAction { resource, verb })
}

/// Translate one legacy permission granted to `subject`.
pub fn translate_permission(
    subject: &str,
    action: &str,
    kind: &str,
    identifier: &str,
) -> Result<Tuple, TranslationError> {
    let translated = translate_action(action)?;

    let identifier = identifier.trim();
    if identifier.is_empty() || identifier.contains('*') {
        return Err(TranslationError::UnsupportedIdentifier(identifier.to_string()));
    }

    match kind {
        SCOPE_FOLDERS => {
            let folder = object(object_type::FOLDER, identifier);
            if translated.resource == RESOURCE_FOLDERS {
                Ok(Tuple::new(subject, translated.verb, folder))
            } else {
                Ok(Tuple::new(subject, relation::RESOURCE, folder)
                    .with_condition(Condition::subresource_filter([translated.capability()])))
            }
        }
        SCOPE_DASHBOARDS if translated.resource == RESOURCE_DASHBOARDS => Ok(Tuple::new(
            subject,
            translated.verb,
            object(object_type::DASHBOARD, identifier),
        )),
        SCOPE_DASHBOARDS => Err(TranslationError::ScopeMismatch {
            action: action.to_string(),
            kind: kind.to_string(),
        }),
        _ => Err(TranslationError::UnsupportedScope(kind.to_string())),
    }
}
