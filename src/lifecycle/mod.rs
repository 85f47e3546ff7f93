// file: src/lifecycle/mod.rs
// version: 1.1.0
// guid: 8a5d2f7c-4e1b-4c93-9b06-d1e7f3a5c284

//! Node lifecycle
//!
//! A report whose printed fingerprint is unknown provisions a new node: a
//! kubelet identity, fresh disk-encryption key material and one OSD per
//! usable disk. A report for a known node reconciles its OSDs against the
//! disks it now has and replaces the stored report. Nodes are never removed.
//!
//! Each node's read-modify-write runs under its own lock, and every store
//! write is serialised with the membership list it carries. A listed node
//! whose record failed to load is read again on its next report and is
//! never provisioned a second time.

use crate::hardware::{DeviceTree, HardwareReport};
use crate::identity::{IdentityIssuer, IssuedIdentity, SigningPolicy, SubjectAttributes, Usage, VAR_ORG};
use crate::storage::{inventory_osds, provision_osds, reconcile_osds, ReconcileOutcome, StorageControl};
use crate::store::{ClusterRecord, ClusterStore, NodeRecord, OsdRecord, MAX_NODE_OSDS};
use crate::{RegistrarError, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Tunables of the lifecycle, with the defaults used in production
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Disks smaller than this are not turned into OSDs
    pub min_osd_size_bytes: u64,
    /// Length of the disk-encryption key material
    pub luks_key_bytes: usize,
    pub signing: SigningPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            min_osd_size_bytes: 10_000_000_000,
            luks_key_bytes: 512,
            signing: SigningPolicy::default(),
        }
    }
}

/// Which way a report moved its node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First contact, the node was created
    Provisioned,
    /// Known node, OSDs reconciled and report replaced
    Updated,
}

/// Result of a report submission
#[derive(Debug, Clone)]
pub struct Registration {
    pub node: NodeRecord,
    pub transition: Transition,
    pub outcome: ReconcileOutcome,
}

/// Orchestrates fingerprinting, identity, storage and persistence
pub struct NodeLifecycleManager {
    store: ClusterStore,
    storage: Arc<dyn StorageControl>,
    config: LifecycleConfig,
    cluster: ClusterRecord,
    issuer: Arc<IdentityIssuer>,
    nodes: parking_lot::RwLock<BTreeMap<String, NodeRecord>>,
    membership: tokio::sync::Mutex<Vec<String>>,
    node_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NodeLifecycleManager {
    /// Load the cluster and build the signer.
    ///
    /// Fails when the CA is missing or unusable; nothing else can proceed
    /// without it.
    pub async fn instantiate(
        store: ClusterStore,
        storage: Arc<dyn StorageControl>,
        config: LifecycleConfig,
    ) -> Result<Self> {
        let snapshot = store.load().await?;
        let cluster = snapshot.cluster;

        let issuer = IdentityIssuer::from_pem(
            &cluster.ca_cert,
            &cluster.ca_key,
            config.signing,
            SubjectAttributes::from_vars(&cluster.vars),
        )?;

        info!(
            "Cluster {} ready with {} of {} nodes loaded",
            cluster.install_id,
            snapshot.nodes.len(),
            cluster.node_ids.len()
        );

        Ok(Self {
            store,
            storage,
            config,
            membership: tokio::sync::Mutex::new(cluster.node_ids.clone()),
            cluster,
            issuer: Arc::new(issuer),
            nodes: parking_lot::RwLock::new(snapshot.nodes),
            node_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Create or update the node a report belongs to
    pub async fn submit_report(&self, report: HardwareReport) -> Result<Registration> {
        let fingerprint = report.system.fingerprint()?;
        let node_id = fingerprint.node_id();

        let span = info_span!("node", id = %node_id);
        async move {
            let lock = self.node_lock(&node_id);
            let result = {
                let _guard = lock.lock().await;
                self.register(&node_id, fingerprint, report).await
            };
            if result.is_err() {
                self.release_node_lock(&node_id, &lock);
            }

            let registration = result?;
            let outcome = &registration.outcome;
            info!(
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                failed = outcome.failed.len(),
                "Node {:?}",
                registration.transition
            );
            Ok::<_, RegistrarError>(registration)
        }
        .instrument(span)
        .await
    }

    async fn register(
        &self,
        node_id: &str,
        fingerprint: crate::hardware::Fingerprint,
        report: HardwareReport,
    ) -> Result<Registration> {
        let cached = self.nodes.read().get(node_id).cloned();
        let existing = match cached {
            Some(node) => Some(node),
            None => self.reload_listed_node(node_id).await?,
        };

        match existing {
            None => self.provision(node_id.to_string(), fingerprint, report).await,
            Some(node) => self.update(node, fingerprint, report).await,
        }
    }

    /// Read a listed node that did not load at startup.
    ///
    /// Its stored keys and OSDs are never provisioned over: if the record
    /// still cannot be read the report is refused.
    async fn reload_listed_node(&self, node_id: &str) -> Result<Option<NodeRecord>> {
        let listed = self.membership.lock().await.iter().any(|id| id == node_id);
        if !listed {
            return Ok(None);
        }

        match self.store.load_node(node_id).await {
            Ok(node) => {
                info!("Loaded node {} on its first report since startup", node_id);
                self.nodes.write().insert(node_id.to_string(), node.clone());
                Ok(Some(node))
            }
            Err(e) => {
                error!("Refusing report for node {} with an unreadable record: {}", node_id, e);
                Err(RegistrarError::store(format!(
                    "node {} is registered but its stored record cannot be loaded: {}",
                    node_id, e
                )))
            }
        }
    }

    /// Usable disks of a report, refused when the node could not be stored
    fn osd_inventory(
        &self,
        report: &HardwareReport,
        fingerprint: &crate::hardware::Fingerprint,
    ) -> Result<BTreeMap<String, OsdRecord>> {
        let inventory = inventory_osds(
            &report.storage.blockdevices,
            fingerprint,
            self.config.min_osd_size_bytes,
        );
        if inventory.len() > MAX_NODE_OSDS {
            return Err(RegistrarError::validation(format!(
                "node reports {} usable disks, at most {} can be stored",
                inventory.len(),
                MAX_NODE_OSDS
            )));
        }
        Ok(inventory)
    }

    async fn provision(
        &self,
        node_id: String,
        fingerprint: crate::hardware::Fingerprint,
        report: HardwareReport,
    ) -> Result<Registration> {
        info!("Adding node {} to cluster {}", node_id, self.cluster.install_id);
        let inventory = self.osd_inventory(&report, &fingerprint)?;

        let common_name = format!("Cluster ({}) Node ({})", self.cluster.install_id, node_id);
        let groups = vec![self.cluster.var(VAR_ORG).to_string()];
        let identity = self.issue(common_name, groups, Usage::Node).await?;
        let luks_keyfile = generate_key_material(self.config.luks_key_bytes);

        let (osds, outcome) = provision_osds(self.storage.as_ref(), &node_id, inventory).await;

        let node = NodeRecord {
            id: node_id,
            fingerprint,
            latest_report: report,
            kubelet_key: identity.private_key,
            kubelet_cert: identity.certificate,
            luks_keyfile,
            osds,
        };
        self.persist(&node).await?;

        Ok(Registration {
            node,
            transition: Transition::Provisioned,
            outcome,
        })
    }

    async fn update(
        &self,
        existing: NodeRecord,
        fingerprint: crate::hardware::Fingerprint,
        report: HardwareReport,
    ) -> Result<Registration> {
        if !existing.fingerprint.is_identical_to(Some(&fingerprint)) {
            info!(
                "Minor components changed, {} trailing fingerprint bytes differ",
                existing.fingerprint.bytes_differ(Some(&fingerprint))
            );
        }

        let inventory = self.osd_inventory(&report, &fingerprint)?;
        let (osds, outcome) =
            reconcile_osds(self.storage.as_ref(), &existing.id, &existing.osds, inventory).await;

        let node = NodeRecord {
            fingerprint,
            latest_report: report,
            osds,
            ..existing
        };
        self.persist(&node).await?;

        Ok(Registration {
            node,
            transition: Transition::Updated,
            outcome,
        })
    }

    /// Write the node with the membership list, then publish it
    async fn persist(&self, node: &NodeRecord) -> Result<()> {
        let mut membership = self.membership.lock().await;
        let mut ids = membership.clone();
        if let Err(pos) = ids.binary_search(&node.id) {
            ids.insert(pos, node.id.clone());
        }

        if let Err(e) = self.store.persist_node(node, &ids).await {
            warn!("Storing node {} failed: {}", node.id, e);
            return Err(e);
        }

        *membership = ids;
        self.nodes.write().insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn issue(&self, common_name: String, groups: Vec<String>, usage: Usage) -> Result<IssuedIdentity> {
        let issuer = Arc::clone(&self.issuer);
        tokio::task::spawn_blocking(move || issuer.issue(&common_name, &groups, usage))
            .await
            .map_err(|e| RegistrarError::identity(format!("signing task failed: {}", e)))?
    }

    fn node_lock(&self, node_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.node_locks
            .lock()
            .entry(node_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock of a node that still does not exist, unless another
    /// report is waiting on it
    fn release_node_lock(&self, node_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.node_locks.lock();
        let unused = locks
            .get(node_id)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(lock) == 2);
        if unused && !self.nodes.read().contains_key(node_id) {
            locks.remove(node_id);
        }
    }

    /// Client certificate for an operator
    pub async fn issue_user_identity(&self, user: &str, groups: &[String]) -> Result<IssuedIdentity> {
        info!("Issuing client certificate for {}", user);
        self.issue(user.to_string(), groups.to_vec(), Usage::Operator)
            .await
    }

    /// Ids of the loaded nodes, sorted
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn node(&self, node_id: &str) -> Option<NodeRecord> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Device tree of the node's latest report
    pub fn node_hardware(&self, node_id: &str) -> Result<DeviceTree> {
        self.nodes
            .read()
            .get(node_id)
            .map(|node| node.latest_report.system.clone())
            .ok_or_else(|| RegistrarError::not_found(format!("node {}", node_id)))
    }

    pub fn ca_expiry(&self) -> Result<DateTime<Utc>> {
        self.issuer.ca_expiry()
    }

    pub fn cluster(&self) -> &ClusterRecord {
        &self.cluster
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }
}

/// Random bytes for the disk-encryption key file
pub fn generate_key_material(length: usize) -> Vec<u8> {
    let mut key = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
