use crate::error::CatalogError;
use crate::kv::suffix_snapshot::{DEFAULT_SNAPSHOT_PREFIX, DEFAULT_SNAPSHOT_SEPARATOR};
use crate::privilege::DEFAULT_TENANT;

pub const DEFAULT_COMPONENT_PREFIX: &str = "root-coord";

/// Runtime configuration for a catalog instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Namespace every catalog key lives under.
    pub component_prefix: String,
    /// Namespace the versioned store keeps timestamped copies under.
    pub snapshot_prefix: String,
    /// Joins an original key and its timestamp in a versioned key.
    pub snapshot_separator: String,
    /// Tenant used by RBAC calls that pass an empty tenant.
    pub default_tenant: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            component_prefix: DEFAULT_COMPONENT_PREFIX.to_string(),
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
            snapshot_separator: DEFAULT_SNAPSHOT_SEPARATOR.to_string(),
            default_tenant: DEFAULT_TENANT.to_string(),
        }
    }
}

impl CatalogConfig {
    /// Isolates all keys under `root`, e.g. one catalog per test or per
    /// cluster sharing a store.
    pub fn rooted(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            component_prefix: format!("{root}/{DEFAULT_COMPONENT_PREFIX}"),
            snapshot_prefix: format!("{root}/{DEFAULT_SNAPSHOT_PREFIX}"),
            ..Self::default()
        }
    }

    pub fn with_default_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.default_tenant = tenant.into();
        self
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        validate_prefix(&self.component_prefix, "component_prefix")?;
        validate_prefix(&self.snapshot_prefix, "snapshot_prefix")?;
        if self.snapshot_separator.is_empty() || self.snapshot_separator.contains('/') {
            return Err(CatalogError::InvalidConfig {
                message: "snapshot_separator must be non-empty and must not contain '/'".into(),
            });
        }
        let snapshot_root = format!("{}/", self.snapshot_prefix);
        if self.component_prefix == self.snapshot_prefix
            || self.component_prefix.starts_with(&snapshot_root)
        {
            return Err(CatalogError::InvalidConfig {
                message: "component_prefix must not live under snapshot_prefix".into(),
            });
        }
        if self.default_tenant.contains('/') {
            return Err(CatalogError::InvalidConfig {
                message: "default_tenant must not contain '/'".into(),
            });
        }
        Ok(())
    }
}

fn validate_prefix(prefix: &str, name: &str) -> Result<(), CatalogError> {
    if prefix.is_empty() {
        return Err(CatalogError::InvalidConfig {
            message: format!("{name} must not be empty"),
        });
    }
    if prefix.starts_with('/') || prefix.ends_with('/') || prefix.contains("//") {
        return Err(CatalogError::InvalidConfig {
            message: format!("{name} must not have leading, trailing or repeated '/'"),
        });
    }
    Ok(())
}
