// file: src/store/cluster_store.rs
// version: 1.0.0
// guid: 9e4b7a13-2c5d-4f80-b6e1-d3a0f8c72e56

//! Loading and persisting cluster state through a [`KvBackend`]

use super::backend::{cluster_prefix, node_prefix, KvBackend, KvOp};
use super::records::{join_node_ids, stored_disk_ids, ClusterRecord, NodeRecord, NODE_IDS, OSD};
use crate::{RegistrarError, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Everything read at startup
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub cluster: ClusterRecord,
    /// Nodes that loaded cleanly, by id
    pub nodes: BTreeMap<String, NodeRecord>,
}

/// Cluster and node records of one install
#[derive(Clone)]
pub struct ClusterStore {
    backend: Arc<dyn KvBackend>,
    install_id: String,
    request_timeout: Duration,
}

impl ClusterStore {
    /// Create a store; every backend call is bounded by `request_timeout`
    pub fn new(backend: Arc<dyn KvBackend>, install_id: &str, request_timeout: Duration) -> Self {
        Self {
            backend,
            install_id: install_id.to_string(),
            request_timeout,
        }
    }

    pub fn install_id(&self) -> &str {
        &self.install_id
    }

    /// Read the cluster record and every listed node.
    ///
    /// Missing CA material is fatal. A node that fails to load is logged and
    /// left out of the snapshot, but stays in the membership list.
    pub async fn load(&self) -> Result<ClusterSnapshot> {
        let cluster = self.load_cluster().await?;
        info!(
            "Loaded cluster {} with {} listed nodes",
            self.install_id,
            cluster.node_ids.len()
        );

        let mut nodes = BTreeMap::new();
        for node_id in &cluster.node_ids {
            match self.load_node(node_id).await {
                Ok(node) => {
                    nodes.insert(node_id.clone(), node);
                }
                Err(e) => {
                    error!(
                        "Unable to load node {} belonging to cluster {}: {}",
                        node_id, self.install_id, e
                    );
                }
            }
        }

        Ok(ClusterSnapshot { cluster, nodes })
    }

    /// Read and decode `cluster/<install-id>/`
    pub async fn load_cluster(&self) -> Result<ClusterRecord> {
        let prefix = cluster_prefix(&self.install_id);
        let pairs = self
            .bounded("cluster read", self.backend.get_prefix(&prefix))
            .await?;
        ClusterRecord::decode(&self.install_id, &pairs)
    }

    /// Read and decode `nodes/<install-id>/<node-id>/`
    pub async fn load_node(&self, node_id: &str) -> Result<NodeRecord> {
        let prefix = node_prefix(&self.install_id, node_id);
        let pairs = self
            .bounded("node read", self.backend.get_prefix(&prefix))
            .await?;
        if pairs.is_empty() {
            return Err(RegistrarError::not_found(format!("node {}", node_id)));
        }
        NodeRecord::decode(&self.install_id, node_id, &pairs)
    }

    /// Write every field of `node` and the membership list in one commit.
    ///
    /// OSD entries stored for disks that are no longer in the record are
    /// removed in the same commit.
    pub async fn persist_node(&self, node: &NodeRecord, node_ids: &[String]) -> Result<()> {
        let osd_prefix = format!("{}{}/", node_prefix(&self.install_id, &node.id), OSD);
        let stored = self
            .bounded("osd read", self.backend.get_prefix(&osd_prefix))
            .await?;
        let stored_disks = stored_disk_ids(&self.install_id, &node.id, &stored);

        let mut ops = node.write_ops(&self.install_id, &stored_disks)?;
        ops.push(KvOp::put(
            format!("{}{}", cluster_prefix(&self.install_id), NODE_IDS),
            join_node_ids(node_ids),
        ));

        debug!("Persisting node {} with {} operations", node.id, ops.len());
        self.bounded("node write", self.backend.commit(ops)).await
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                RegistrarError::timeout(format!(
                    "{} for cluster {} exceeded {:?}",
                    what, self.install_id, self.request_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::HardwareReport;
    use crate::store::records::OsdRecord;
    use crate::store::MemoryBackend;

    const INSTALL: &str = "inst-1";

    fn seeded_backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("cluster/inst-1/secret-ca-key", "KEY");
        backend.insert("cluster/inst-1/secret-ca-cert", "CERT");
        backend.insert("cluster/inst-1/CLUSTER_ORG", "Example");
        backend
    }

    fn store(backend: Arc<MemoryBackend>) -> ClusterStore {
        ClusterStore::new(backend, INSTALL, Duration::from_secs(5))
    }

    fn node_with_disks(disks: &[&str]) -> NodeRecord {
        let report =
            HardwareReport::from_json(include_bytes!("../../tests/fixtures/report_physical.json"))
                .unwrap();
        let fingerprint = report.system.fingerprint().unwrap();
        NodeRecord {
            id: fingerprint.node_id(),
            fingerprint,
            latest_report: report,
            kubelet_key: b"key".to_vec(),
            kubelet_cert: b"cert".to_vec(),
            luks_keyfile: vec![1; 512],
            osds: disks
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    (
                        d.to_string(),
                        OsdRecord {
                            id: i.to_string(),
                            key: format!("key-{}", i),
                            weight: "0.480104".to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_persist_and_reload_node() {
        let backend = seeded_backend();
        let store = store(backend.clone());
        let node = node_with_disks(&["d1", "d2"]);

        store
            .persist_node(&node, &[node.id.clone()])
            .await
            .unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.cluster.node_ids, vec![node.id.clone()]);
        assert_eq!(snapshot.nodes[&node.id], node);
        assert_eq!(backend.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_persist_removes_dropped_disks() {
        let backend = seeded_backend();
        let store = store(backend.clone());
        let node = node_with_disks(&["d1", "d2"]);
        store.persist_node(&node, &[node.id.clone()]).await.unwrap();

        let updated = node_with_disks(&["d1", "d3"]);
        store
            .persist_node(&updated, &[updated.id.clone()])
            .await
            .unwrap();

        let reloaded = store.load_node(&node.id).await.unwrap();
        let disks: Vec<&String> = reloaded.osds.keys().collect();
        assert_eq!(disks, vec!["d1", "d3"]);
        assert!(backend
            .keys(&format!("nodes/inst-1/{}/osd/d2/", node.id))
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_ca_key_is_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("cluster/inst-1/secret-ca-cert", "CERT");

        let err = store(backend).load().await.unwrap_err();
        assert!(matches!(err, RegistrarError::CaMissing("key")));
    }

    #[tokio::test]
    async fn test_broken_node_is_skipped() {
        let backend = seeded_backend();
        let store = store(backend.clone());
        let node = node_with_disks(&["d1"]);
        store
            .persist_node(&node, &[node.id.clone(), "ghost".to_string()])
            .await
            .unwrap();
        backend.insert("nodes/inst-1/broken/fingerprint", "zz");
        backend.insert("cluster/inst-1/nodeids", format!("{},broken,ghost", node.id));

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(snapshot.nodes.contains_key(&node.id));
        assert_eq!(snapshot.cluster.node_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_node_field_fails_that_node() {
        let backend = seeded_backend();
        let store = store(backend.clone());
        let node = node_with_disks(&[]);
        store.persist_node(&node, &[node.id.clone()]).await.unwrap();
        backend.insert(format!("nodes/inst-1/{}/hostname", node.id), "box");

        let err = store.load_node(&node.id).await.unwrap_err();
        assert!(err.to_string().contains("unknown node field"));
    }

    #[tokio::test]
    async fn test_unreachable_store_surfaces_error() {
        let backend = seeded_backend();
        backend.set_unavailable(true);

        let err = store(backend).load().await.unwrap_err();
        assert!(matches!(err, RegistrarError::Store(_)));
    }

    struct StalledBackend;

    #[async_trait::async_trait]
    impl KvBackend for StalledBackend {
        async fn get_prefix(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
            std::future::pending().await
        }

        async fn commit(&self, _ops: Vec<KvOp>) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_calls_are_bounded_by_request_timeout() {
        let store = ClusterStore::new(Arc::new(StalledBackend), INSTALL, Duration::from_millis(20));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, RegistrarError::Timeout(_)));
    }
}
