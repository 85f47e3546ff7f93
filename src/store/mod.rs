// file: src/store/mod.rs
// version: 1.1.0
// guid: 2d6f8a0c-1b3e-4c5d-8e7f-90a1b2c3d4e5

//! Durable cluster state
//!
//! Cluster-wide settings live under `cluster/<install-id>/` and each node
//! under `nodes/<install-id>/<node-id>/`. Node writes go through a single
//! commit so a crash never leaves a mixed-generation record behind.

pub mod backend;
pub mod cluster_store;
pub mod etcd;
pub mod memory;
pub mod records;

pub use backend::{KvBackend, KvOp};
pub use cluster_store::{ClusterSnapshot, ClusterStore};
pub use etcd::EtcdBackend;
pub use memory::MemoryBackend;
pub use records::{ClusterRecord, NodeRecord, OsdRecord, MAX_NODE_OSDS};
