// file: src/config/mod.rs
// version: 2.0.0
// guid: a1b2c3d4-e5f6-4a8b-9c0d-1e2f3a4b5c6d

//! Configuration for the registrar service
//!
//! Every field has a default, so a file only needs the install id.

pub mod loader;

pub use loader::ConfigLoader;

use crate::identity::SigningPolicy;
use crate::lifecycle::LifecycleConfig;
use crate::{RegistrarError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Cluster installation this registrar serves
    pub install_id: String,
    pub listen_addr: String,
    pub etcd: EtcdConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub node: NodeConfig,
    pub shadow: ShadowConfig,
}

/// Cluster store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout_secs: u64,
    /// Deadline of every store call
    pub request_timeout_secs: u64,
}

/// Storage cluster control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ceph_binary: PathBuf,
    pub min_osd_size_bytes: u64,
}

/// Certificates issued by the cluster CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub expiry_days: u32,
    pub key_bits: usize,
}

/// Per-node secrets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub luks_key_bytes: usize,
}

/// Controller account whose password is shipped to nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub file: PathBuf,
    pub root_account: String,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            install_id: String::new(),
            listen_addr: "0.0.0.0:2680".to_string(),
            etcd: EtcdConfig::default(),
            storage: StorageConfig::default(),
            identity: IdentityConfig::default(),
            node: NodeConfig::default(),
            shadow: ShadowConfig::default(),
        }
    }
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["localhost:2379".to_string()],
            dial_timeout_secs: 5,
            request_timeout_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            ceph_binary: PathBuf::from("/usr/bin/ceph"),
            min_osd_size_bytes: lifecycle.min_osd_size_bytes,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let policy = SigningPolicy::default();
        Self {
            expiry_days: policy.expiry_days,
            key_bits: policy.key_bits,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            luks_key_bytes: LifecycleConfig::default().luks_key_bytes,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("/etc/shadow"),
            root_account: "root".to_string(),
        }
    }
}

impl RegistrarConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.install_id.trim().is_empty() {
            return Err(RegistrarError::config("install_id cannot be empty"));
        }
        if self.install_id.contains('/') {
            return Err(RegistrarError::config(format!(
                "install_id '{}' must not contain '/'",
                self.install_id
            )));
        }

        self.listen_socket()?;

        if self.etcd.endpoints.is_empty() {
            return Err(RegistrarError::config("at least one etcd endpoint is required"));
        }
        if self.etcd.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(RegistrarError::config("etcd endpoints cannot be empty"));
        }
        if self.etcd.dial_timeout_secs == 0 || self.etcd.request_timeout_secs == 0 {
            return Err(RegistrarError::config("etcd timeouts must be positive"));
        }

        if self.storage.ceph_binary.as_os_str().is_empty() {
            return Err(RegistrarError::config("storage.ceph_binary cannot be empty"));
        }

        if self.identity.expiry_days == 0 {
            return Err(RegistrarError::config("identity.expiry_days must be positive"));
        }
        if self.identity.key_bits < 2048 {
            return Err(RegistrarError::config(format!(
                "identity.key_bits {} is below 2048",
                self.identity.key_bits
            )));
        }

        if self.node.luks_key_bytes == 0 {
            return Err(RegistrarError::config("node.luks_key_bytes must be positive"));
        }

        if self.shadow.file.as_os_str().is_empty() || self.shadow.root_account.trim().is_empty() {
            return Err(RegistrarError::config("shadow file and account are required"));
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_socket(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            RegistrarError::config(format!("invalid listen_addr '{}': {}", self.listen_addr, e))
        })
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.etcd.dial_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.etcd.request_timeout_secs)
    }

    /// Lifecycle tunables derived from this configuration
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            min_osd_size_bytes: self.storage.min_osd_size_bytes,
            luks_key_bytes: self.node.luks_key_bytes,
            signing: SigningPolicy {
                expiry_days: self.identity.expiry_days,
                key_bits: self.identity.key_bits,
            },
        }
    }
}
