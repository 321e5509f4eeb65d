use std::time::Duration;

use crate::legacy::BASIC_ROLES;

/// Default interval between reconciliation ticks.
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Default lease on the cluster-wide reconciliation lock.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 36_000;

/// Default number of tuples per write/delete request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default page size for tuple store reads.
pub const DEFAULT_STORE_PAGE_SIZE: u32 = 100;

/// Default page size for the legacy folder scan.
pub const DEFAULT_FOLDER_PAGE_SIZE: i64 = 1000;

/// Default log filter for the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info,xavyo_tuple_sync=debug";

/// Anonymous access settings mirrored into the tuple store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousConfig {
    /// Whether anonymous access is enabled.
    pub enabled: bool,

    /// Name of the org anonymous users land in.
    pub org_name: String,

    /// Basic role granted to anonymous users.
    pub org_role: String,
}

impl Default for AnonymousConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            org_name: "Main Org.".to_string(),
            org_role: "Viewer".to_string(),
        }
    }
}

/// Configuration for the tuple sync daemon and its reconcilers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Legacy database connection URL.
    pub database_url: String,

    /// Base URL of the tuple store HTTP API.
    pub store_url: String,

    /// Bearer token for the tuple store, if it requires one.
    pub store_api_token: Option<String>,

    /// Time between scheduled ticks.
    pub interval: Duration,

    /// Lease on the cluster-wide lock. Must outlive the longest tick.
    pub lock_ttl: Duration,

    /// Run a tick immediately at startup instead of waiting one interval.
    pub run_on_startup: bool,

    /// Tuples per write or delete request.
    pub batch_size: usize,

    /// Tuples per tuple store read page.
    pub store_page_size: u32,

    /// Rows per legacy folder page.
    pub folder_page_size: i64,

    /// Anonymous access settings.
    pub anonymous: AnonymousConfig,

    /// Log filter directive (`RUST_LOG`).
    pub log_filter: String,

    /// Compute diffs without applying them. Set from the command line.
    pub dry_run: bool,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let database_url =
            reader("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL".into()))?;

        let store_url = reader("TUPLE_STORE_URL")
            .map_err(|_| ConfigError::MissingVar("TUPLE_STORE_URL".into()))?
            .trim_end_matches('/')
            .to_string();

        let store_api_token = reader("TUPLE_STORE_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());

        let interval_secs =
            parse_positive::<u64>(&reader, "RECONCILE_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        let lock_ttl_secs =
            parse_positive::<u64>(&reader, "RECONCILE_LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS)?;

        let run_on_startup = parse_bool(&reader, "RECONCILE_ON_STARTUP", true)?;

        let batch_size =
            parse_positive::<usize>(&reader, "RECONCILE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let store_page_size =
            parse_positive::<u32>(&reader, "TUPLE_STORE_PAGE_SIZE", DEFAULT_STORE_PAGE_SIZE)?;
        let folder_page_size =
            parse_positive::<i64>(&reader, "LEGACY_FOLDER_PAGE_SIZE", DEFAULT_FOLDER_PAGE_SIZE)?;

        let defaults = AnonymousConfig::default();
        let anonymous = AnonymousConfig {
            enabled: parse_bool(&reader, "ANONYMOUS_ENABLED", false)?,
            org_name: reader("ANONYMOUS_ORG_NAME").unwrap_or(defaults.org_name),
            org_role: match reader("ANONYMOUS_ORG_ROLE") {
                Ok(raw) => parse_basic_role("ANONYMOUS_ORG_ROLE", &raw)?,
                Err(_) => defaults.org_role,
            },
        };

        let log_filter = reader("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_url,
            store_url,
            store_api_token,
            interval: Duration::from_secs(interval_secs),
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            run_on_startup,
            batch_size,
            store_page_size,
            folder_page_size,
            anonymous,
            log_filter,
            dry_run: false,
        })
    }

    /// Return a copy with dry-run mode set.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

fn parse_positive<T>(
    reader: &impl Fn(&str) -> Result<String, std::env::VarError>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = reader(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string()))?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(
            key.into(),
            "must be greater than zero".into(),
        ));
    }
    Ok(value)
}

/// Canonical spelling of a basic role name, matched case-insensitively.
fn parse_basic_role(key: &str, raw: &str) -> Result<String, ConfigError> {
    BASIC_ROLES
        .iter()
        .find(|role| role.eq_ignore_ascii_case(raw.trim()))
        .map(|role| (*role).to_string())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                key.into(),
                format!("must be one of {}", BASIC_ROLES.join(", ")),
            )
        })
}

fn parse_bool(
    reader: &impl Fn(&str) -> Result<String, std::env::VarError>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<bool>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
