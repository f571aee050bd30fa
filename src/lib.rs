pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod kv;
pub mod model;
pub mod privilege;
pub mod sync_bridge;

pub use crate::catalog::Catalog;
pub use crate::catalog::keys::KeyLayout;
pub use crate::config::CatalogConfig;
pub use crate::context::Context;
pub use crate::error::{CatalogError, CatalogErrorCode, ResourceType};
pub use crate::kv::{
    KvError, MemoryKv, SnapshotKv, SuffixSnapshot, TOMBSTONE, Timestamp, TxnBatch, TxnKv,
};
pub use crate::privilege::ObjectPrivileges;
pub use crate::sync_bridge::CatalogSync;
