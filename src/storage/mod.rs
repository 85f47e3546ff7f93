// file: src/storage/mod.rs
// version: 1.0.0
// guid: 7b2c5e81-9f4a-4d36-8a1e-c0d3f5b6a728

//! Storage-cluster control plane and OSD reconciliation

pub mod ceph;
pub mod reconcile;

pub use ceph::CephCli;
pub use reconcile::{
    inventory_osds, osd_weight, provision_osds, reconcile_osds, register_osd, ReconcileOutcome,
};

use crate::Result;

/// Commands issued against the storage cluster
#[async_trait::async_trait]
pub trait StorageControl: Send + Sync {
    /// Create an OSD for a disk uuid and return its numeric id
    async fn create_osd(&self, disk_id: &str) -> Result<String>;

    /// Create the authentication key of `osd.N`
    async fn add_osd_key(&self, osd_name: &str) -> Result<()>;

    /// Fetch the authentication key of `osd.N`
    async fn get_osd_key(&self, osd_name: &str) -> Result<String>;

    /// Place `osd.N` with `weight` under the host bucket
    async fn crush_add_osd(&self, osd_name: &str, weight: &str, host: &str) -> Result<()>;

    /// Create a host bucket
    async fn add_host_bucket(&self, host: &str) -> Result<()>;

    /// Move a host bucket under the default root
    async fn move_host_to_default_root(&self, host: &str) -> Result<()>;

    /// Remove `osd.N` from the cluster entirely
    async fn purge_osd(&self, osd_name: &str) -> Result<()>;
}
