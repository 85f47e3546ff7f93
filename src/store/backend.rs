// file: src/store/backend.rs
// version: 1.1.0
// guid: 0b9a4d64-36c4-4f1e-8f6e-7a4fd1c2b8e3

//! Key-value backend trait shared by etcd and the in-memory store

use crate::{RegistrarError, Result};

/// Largest commit a backend accepts, etcd's default `--max-txn-ops`
pub const MAX_COMMIT_OPS: usize = 128;

/// A single write applied as part of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Set `key` to `value`
    Put { key: String, value: Vec<u8> },
    /// Remove every key starting with `prefix`
    DeletePrefix { prefix: String },
}

impl KvOp {
    /// Build a put operation
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a prefix delete operation
    pub fn delete_prefix(prefix: impl Into<String>) -> Self {
        Self::DeletePrefix {
            prefix: prefix.into(),
        }
    }
}

/// Prefix-keyed storage with atomic multi-key commits
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// All keys under `prefix` with their values, in key order
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply every operation or none of them
    async fn commit(&self, ops: Vec<KvOp>) -> Result<()>;
}

/// Refuse a commit that exceeds [`MAX_COMMIT_OPS`]
pub fn check_commit_size(ops: &[KvOp]) -> Result<()> {
    if ops.len() > MAX_COMMIT_OPS {
        return Err(RegistrarError::store(format!(
            "commit of {} operations exceeds the limit of {}",
            ops.len(),
            MAX_COMMIT_OPS
        )));
    }
    Ok(())
}

/// `cluster/<install-id>/`
pub fn cluster_prefix(install_id: &str) -> String {
    format!("cluster/{}/", install_id)
}

/// `nodes/<install-id>/<node-id>/`
pub fn node_prefix(install_id: &str, node_id: &str) -> String {
    format!("nodes/{}/{}/", install_id, node_id)
}
