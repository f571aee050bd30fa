use crate::kv::KvError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Collection,
    Alias,
    Partition,
    Index,
    SegmentIndex,
    Credential,
    Role,
    User,
    Grant,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Collection => write!(f, "collection"),
            ResourceType::Alias => write!(f, "alias"),
            ResourceType::Partition => write!(f, "partition"),
            ResourceType::Index => write!(f, "index"),
            ResourceType::SegmentIndex => write!(f, "segment index"),
            ResourceType::Credential => write!(f, "credential"),
            ResourceType::Role => write!(f, "role"),
            ResourceType::User => write!(f, "user"),
            ResourceType::Grant => write!(f, "grant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorCode {
    NotFound,
    InvalidArgument,
    Persistence,
    Conflict,
    Encode,
    Decode,
    InvalidConfig,
    Cancelled,
    DeadlineExceeded,
}

impl CatalogErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogErrorCode::NotFound => "not_found",
            CatalogErrorCode::InvalidArgument => "invalid_argument",
            CatalogErrorCode::Persistence => "persistence",
            CatalogErrorCode::Conflict => "conflict",
            CatalogErrorCode::Encode => "encode",
            CatalogErrorCode::Decode => "decode",
            CatalogErrorCode::InvalidConfig => "invalid_config",
            CatalogErrorCode::Cancelled => "cancelled",
            CatalogErrorCode::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("persistence error on key '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: KvError,
    },
    #[error("conflict error: {0}")]
    Conflict(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error on key '{key}': {message}")]
    Decode { key: String, message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CatalogError {
    pub fn not_found(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        CatalogError::NotFound {
            resource_type,
            resource_id: resource_id.into(),
        }
    }

    /// Maps a store failure on `key` into the catalog taxonomy. A missing key
    /// becomes `NotFound` for `resource_type`.
    pub fn from_kv(resource_type: ResourceType, key: &str, err: KvError) -> Self {
        match err {
            KvError::KeyNotFound { .. } => CatalogError::not_found(resource_type, key),
            KvError::Cancelled => CatalogError::Cancelled,
            KvError::DeadlineExceeded => CatalogError::DeadlineExceeded,
            other => CatalogError::Persistence {
                key: key.to_string(),
                source: other,
            },
        }
    }

    /// Like [`CatalogError::from_kv`] for writes, where a missing key is
    /// still a persistence failure.
    pub fn persistence(key: &str, err: KvError) -> Self {
        match err {
            KvError::Cancelled => CatalogError::Cancelled,
            KvError::DeadlineExceeded => CatalogError::DeadlineExceeded,
            other => CatalogError::Persistence {
                key: key.to_string(),
                source: other,
            },
        }
    }

    pub fn code(&self) -> CatalogErrorCode {
        match self {
            CatalogError::NotFound { .. } => CatalogErrorCode::NotFound,
            CatalogError::InvalidArgument(_) => CatalogErrorCode::InvalidArgument,
            CatalogError::Persistence { .. } => CatalogErrorCode::Persistence,
            CatalogError::Conflict(_) => CatalogErrorCode::Conflict,
            CatalogError::Encode(_) => CatalogErrorCode::Encode,
            CatalogError::Decode { .. } => CatalogErrorCode::Decode,
            CatalogError::InvalidConfig { .. } => CatalogErrorCode::InvalidConfig,
            CatalogError::Cancelled => CatalogErrorCode::Cancelled,
            CatalogError::DeadlineExceeded => CatalogErrorCode::DeadlineExceeded,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, CatalogErrorCode, ResourceType};
    use crate::kv::KvError;

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(CatalogErrorCode::NotFound.as_str(), "not_found");
        assert_eq!(
            CatalogErrorCode::InvalidArgument.as_str(),
            "invalid_argument"
        );
        assert_eq!(
            CatalogErrorCode::DeadlineExceeded.as_str(),
            "deadline_exceeded"
        );
    }

    #[test]
    fn missing_key_maps_to_not_found() {
        let err = CatalogError::from_kv(
            ResourceType::Credential,
            "root-coord/credential/users/alice",
            KvError::KeyNotFound {
                key: "root-coord/credential/users/alice".into(),
            },
        );
        assert_eq!(err.code(), CatalogErrorCode::NotFound);
        assert_eq!(
            err.to_string(),
            "credential 'root-coord/credential/users/alice' not found"
        );
    }

    #[test]
    fn backend_failure_keeps_key_and_source() {
        let err = CatalogError::from_kv(
            ResourceType::Collection,
            "root-coord/collection/1",
            KvError::Backend("etcd unavailable".into()),
        );
        match &err {
            CatalogError::Persistence { key, source } => {
                assert_eq!(key, "root-coord/collection/1");
                assert!(matches!(source, KvError::Backend(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code_str(), "persistence");
    }

    #[test]
    fn cancellation_is_not_wrapped() {
        let err = CatalogError::persistence("k", KvError::Cancelled);
        assert!(matches!(err, CatalogError::Cancelled));
    }
}
