// file: src/store/memory.rs
// version: 1.1.0
// guid: 5e3c1c0a-8d0f-4a57-b4f4-3f2d9b0a6e71

//! In-process backend for development and tests

use super::backend::{check_commit_size, KvBackend, KvOp};
use crate::{RegistrarError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Ordered map behind a lock
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    commits: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key outside of a commit
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Current value of a key
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Keys under a prefix
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        self.data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make every call fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistrarError::store("memory backend marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KvBackend for MemoryBackend {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn commit(&self, ops: Vec<KvOp>) -> Result<()> {
        self.check_available()?;
        check_commit_size(&ops)?;
        let mut data = self.data.write();
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    data.insert(key, value);
                }
                KvOp::DeletePrefix { prefix } => {
                    data.retain(|k, _| !k.starts_with(&prefix));
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
