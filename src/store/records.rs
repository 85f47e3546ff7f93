// file: src/store/records.rs
// version: 1.1.0
// guid: c3d8f0a2-6e1b-4f7c-a9d5-8b2e4c6f1a09

//! Typed cluster and node records and their key layout.
//!
//! Keys are decoded into [`ClusterKey`] and [`NodeKey`] before any value is
//! interpreted. Node keys outside the known layout are an error so a record
//! written by a newer or broken writer is never half-understood.

use super::backend::{cluster_prefix, node_prefix, KvOp, MAX_COMMIT_OPS};
use crate::hardware::{Fingerprint, HardwareReport};
use crate::{RegistrarError, Result};
use std::collections::{BTreeMap, BTreeSet};

pub const CA_KEY: &str = "secret-ca-key";
pub const CA_CERT: &str = "secret-ca-cert";
pub const CA_BUNDLE: &str = "secret-ca-bundle";
pub const NODE_IDS: &str = "nodeids";
pub const AUTHORIZED_KEYS: &str = "authorized-keys";
pub const CEPH_CONFIG: &str = "ceph-config";
const SECRET_PREFIX: &str = "secret";

pub const LATEST_REPORT: &str = "latestreport";
pub const FINGERPRINT: &str = "fingerprint";
pub const KUBELET_KEY: &str = "secret-kubelet-key";
pub const KUBELET_CERT: &str = "secret-kubelet-cert";
pub const LUKS_KEYFILE: &str = "secret-luks-keyfile";
pub const OSD: &str = "osd";

/// Puts of a node write besides its OSDs, the membership list included
const NODE_FIELD_OPS: usize = 6;
/// Puts of one OSD entry plus the delete it costs once dropped
const OSD_OPS: usize = 4;

/// Most OSDs a node may hold so that any write of it fits one commit
pub const MAX_NODE_OSDS: usize = (MAX_COMMIT_OPS - NODE_FIELD_OPS) / OSD_OPS;

/// Cluster secret holding the storage keyring shipped to nodes
pub const KUBE_CEPH_KEYRING: &str = "secret-ceph-kube-keyring";

/// Role whose authorized keys are installed on worker nodes
pub const WORKER_ROLE: &str = "worker";

/// A key under `cluster/<install-id>/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKey<'a> {
    CaKey,
    CaCert,
    CaBundle,
    NodeIds,
    AuthorizedKey { role: &'a str },
    CephConfig,
    Secret(&'a str),
    Var(&'a str),
}

impl<'a> ClusterKey<'a> {
    /// Decode the part of a key after the cluster prefix
    pub fn parse(suffix: &'a str) -> Result<Self> {
        let mut segments = suffix.split('/');
        let field = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        let key = match (field, rest.as_slice()) {
            ("", _) => return Err(RegistrarError::store("empty cluster key")),
            (AUTHORIZED_KEYS, [role, ..]) if !role.is_empty() => {
                Self::AuthorizedKey { role: *role }
            }
            (AUTHORIZED_KEYS, _) => {
                return Err(RegistrarError::store("authorized key without a role"))
            }
            (_, [_, ..]) => {
                return Err(RegistrarError::store(format!(
                    "unexpected nested cluster key {}",
                    suffix
                )))
            }
            (CA_KEY, []) => Self::CaKey,
            (CA_CERT, []) => Self::CaCert,
            (CA_BUNDLE, []) => Self::CaBundle,
            (NODE_IDS, []) => Self::NodeIds,
            (CEPH_CONFIG, []) => Self::CephConfig,
            (name, []) if name.starts_with(SECRET_PREFIX) => Self::Secret(name),
            (name, _) => Self::Var(name),
        };
        Ok(key)
    }
}

/// Field of an OSD entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdField {
    Id,
    Key,
    Weight,
}

impl OsdField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "Id" => Some(Self::Id),
            "Key" => Some(Self::Key),
            "Weight" => Some(Self::Weight),
            _ => None,
        }
    }
}

/// A key under `nodes/<install-id>/<node-id>/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKey<'a> {
    LatestReport,
    Fingerprint,
    KubeletKey,
    KubeletCert,
    LuksKeyfile,
    Osd { disk: &'a str, field: OsdField },
}

impl<'a> NodeKey<'a> {
    /// Decode the part of a key after the node prefix
    pub fn parse(suffix: &'a str) -> Result<Self> {
        let segments: Vec<&str> = suffix.split('/').collect();
        let key = match segments.as_slice() {
            [LATEST_REPORT] => Self::LatestReport,
            [FINGERPRINT] => Self::Fingerprint,
            [KUBELET_KEY] => Self::KubeletKey,
            [KUBELET_CERT] => Self::KubeletCert,
            [LUKS_KEYFILE] => Self::LuksKeyfile,
            [OSD, disk, field] if !disk.is_empty() => match OsdField::parse(field) {
                Some(field) => Self::Osd { disk: *disk, field },
                None => {
                    return Err(RegistrarError::store(format!(
                        "unknown OSD field {} for disk {}",
                        field, disk
                    )))
                }
            },
            _ => {
                return Err(RegistrarError::store(format!(
                    "unknown node field {}",
                    suffix
                )))
            }
        };
        Ok(key)
    }
}

/// Cluster-wide state for one install
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterRecord {
    pub install_id: String,
    pub ca_key: Vec<u8>,
    pub ca_cert: Vec<u8>,
    pub ca_bundle: Vec<u8>,
    /// Free-form settings shipped to every node
    pub vars: BTreeMap<String, String>,
    /// Opaque `secret*` values, including the CA material
    pub secrets: BTreeMap<String, Vec<u8>>,
    /// Public keys by role
    pub authorized_keys: BTreeMap<String, BTreeSet<Vec<u8>>>,
    /// Sorted, deduplicated
    pub node_ids: Vec<String>,
    pub ceph_config: Vec<u8>,
}

impl ClusterRecord {
    /// Build the record from every pair under the cluster prefix
    pub fn decode(install_id: &str, pairs: &[(String, Vec<u8>)]) -> Result<Self> {
        let prefix = cluster_prefix(install_id);
        let mut record = ClusterRecord {
            install_id: install_id.to_string(),
            ..Default::default()
        };

        for (key, value) in pairs {
            let Some(suffix) = key.strip_prefix(&prefix) else {
                return Err(RegistrarError::store(format!(
                    "key {} is outside {}",
                    key, prefix
                )));
            };
            let field = match ClusterKey::parse(suffix) {
                Ok(field) => field,
                Err(e) => {
                    tracing::warn!("Ignoring cluster key {}: {}", key, e);
                    continue;
                }
            };

            match field {
                ClusterKey::CaKey => {
                    record.ca_key = value.clone();
                    record.secrets.insert(CA_KEY.to_string(), value.clone());
                }
                ClusterKey::CaCert => {
                    record.ca_cert = value.clone();
                    record.secrets.insert(CA_CERT.to_string(), value.clone());
                }
                ClusterKey::CaBundle => {
                    record.ca_bundle = value.clone();
                    record.secrets.insert(CA_BUNDLE.to_string(), value.clone());
                }
                ClusterKey::NodeIds => {
                    record.node_ids = parse_node_ids(&String::from_utf8_lossy(value));
                }
                ClusterKey::AuthorizedKey { role } => {
                    record
                        .authorized_keys
                        .entry(role.to_string())
                        .or_default()
                        .insert(value.clone());
                }
                ClusterKey::CephConfig => record.ceph_config = value.clone(),
                ClusterKey::Secret(name) => {
                    record.secrets.insert(name.to_string(), value.clone());
                }
                ClusterKey::Var(name) => {
                    record
                        .vars
                        .insert(name.to_string(), String::from_utf8_lossy(value).into_owned());
                }
            }
        }

        if record.ca_key.is_empty() {
            return Err(RegistrarError::CaMissing("key"));
        }
        if record.ca_cert.is_empty() {
            return Err(RegistrarError::CaMissing("certificate"));
        }
        Ok(record)
    }

    /// A cluster variable or the empty string
    pub fn var(&self, name: &str) -> &str {
        self.vars.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Keys installed for `role`, in stored order
    pub fn keys_for_role(&self, role: &str) -> impl Iterator<Item = &Vec<u8>> {
        self.authorized_keys.get(role).into_iter().flatten()
    }

    /// Key under which the membership list is stored
    pub fn node_ids_key(&self) -> String {
        format!("{}{}", cluster_prefix(&self.install_id), NODE_IDS)
    }
}

/// Split a comma-joined id list into a sorted, deduplicated vector
pub fn parse_node_ids(text: &str) -> Vec<String> {
    let ids: BTreeSet<String> = text
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    ids.into_iter().collect()
}

/// Sorted, deduplicated, comma-joined form of the membership list
pub fn join_node_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    let ids: BTreeSet<&str> = ids.into_iter().map(String::as_str).collect();
    ids.into_iter().collect::<Vec<_>>().join(",")
}

/// An OSD slot backed by one disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdRecord {
    /// Storage-cluster assigned id, empty until created
    pub id: String,
    pub key: String,
    /// Capacity in terabytes, six decimals
    pub weight: String,
}

impl OsdRecord {
    /// `osd.<id>` as the storage cluster names it
    pub fn name(&self) -> String {
        format!("osd.{}", self.id)
    }

    /// The OSD exists in the storage cluster
    pub fn is_registered(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Durable state of one machine
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Printed fingerprint
    pub id: String,
    /// Raw fingerprint of the latest report
    pub fingerprint: Fingerprint,
    pub latest_report: HardwareReport,
    pub kubelet_key: Vec<u8>,
    pub kubelet_cert: Vec<u8>,
    pub luks_keyfile: Vec<u8>,
    /// Disk identifier to OSD
    pub osds: BTreeMap<String, OsdRecord>,
}

impl NodeRecord {
    /// Build the record from every pair under the node prefix
    pub fn decode(install_id: &str, node_id: &str, pairs: &[(String, Vec<u8>)]) -> Result<Self> {
        let prefix = node_prefix(install_id, node_id);
        let mut fingerprint = None;
        let mut latest_report = None;
        let mut kubelet_key = Vec::new();
        let mut kubelet_cert = Vec::new();
        let mut luks_keyfile = Vec::new();
        let mut osds: BTreeMap<String, OsdRecord> = BTreeMap::new();

        for (key, value) in pairs {
            let suffix = key.strip_prefix(&prefix).ok_or_else(|| {
                RegistrarError::store(format!("key {} is outside {}", key, prefix))
            })?;

            match NodeKey::parse(suffix)? {
                NodeKey::LatestReport => {
                    latest_report = Some(HardwareReport::from_json(value)?);
                }
                NodeKey::Fingerprint => {
                    fingerprint = Some(Fingerprint::from_hex(&String::from_utf8_lossy(value))?);
                }
                NodeKey::KubeletKey => kubelet_key = value.clone(),
                NodeKey::KubeletCert => kubelet_cert = value.clone(),
                NodeKey::LuksKeyfile => luks_keyfile = value.clone(),
                NodeKey::Osd { disk, field } => {
                    let osd = osds.entry(disk.to_string()).or_default();
                    let text = String::from_utf8_lossy(value).into_owned();
                    match field {
                        OsdField::Id => osd.id = text,
                        OsdField::Key => osd.key = text,
                        OsdField::Weight => osd.weight = text,
                    }
                }
            }
        }

        let missing = |field: &str| {
            RegistrarError::store(format!("node {} is missing {}", node_id, field))
        };
        let fingerprint = fingerprint.ok_or_else(|| missing(FINGERPRINT))?;
        let latest_report = latest_report.ok_or_else(|| missing(LATEST_REPORT))?;
        if kubelet_key.is_empty() {
            return Err(missing(KUBELET_KEY));
        }
        if kubelet_cert.is_empty() {
            return Err(missing(KUBELET_CERT));
        }
        if luks_keyfile.is_empty() {
            return Err(missing(LUKS_KEYFILE));
        }

        Ok(Self {
            id: node_id.to_string(),
            fingerprint,
            latest_report,
            kubelet_key,
            kubelet_cert,
            luks_keyfile,
            osds,
        })
    }

    /// Writes replacing this node's stored state.
    ///
    /// `stored_disks` are the disk ids currently present in the store; the
    /// ones no longer in `osds` are removed. Deletes never overlap the puts,
    /// which etcd would reject within a single transaction.
    pub fn write_ops(&self, install_id: &str, stored_disks: &BTreeSet<String>) -> Result<Vec<KvOp>> {
        let prefix = node_prefix(install_id, &self.id);
        let mut ops = vec![
            KvOp::put(
                format!("{}{}", prefix, LATEST_REPORT),
                self.latest_report.to_json()?,
            ),
            KvOp::put(format!("{}{}", prefix, FINGERPRINT), self.fingerprint.to_hex()),
            KvOp::put(format!("{}{}", prefix, KUBELET_KEY), self.kubelet_key.clone()),
            KvOp::put(format!("{}{}", prefix, KUBELET_CERT), self.kubelet_cert.clone()),
            KvOp::put(format!("{}{}", prefix, LUKS_KEYFILE), self.luks_keyfile.clone()),
        ];

        for disk in stored_disks.iter().filter(|d| !self.osds.contains_key(*d)) {
            ops.push(KvOp::delete_prefix(format!("{}{}/{}/", prefix, OSD, disk)));
        }

        for (disk, osd) in &self.osds {
            let osd_prefix = format!("{}{}/{}/", prefix, OSD, disk);
            ops.push(KvOp::put(format!("{}Id", osd_prefix), osd.id.clone()));
            ops.push(KvOp::put(format!("{}Weight", osd_prefix), osd.weight.clone()));
            ops.push(KvOp::put(format!("{}Key", osd_prefix), osd.key.clone()));
        }
        Ok(ops)
    }
}

/// Disk ids that have at least one key under the node's `osd/` prefix
pub fn stored_disk_ids(install_id: &str, node_id: &str, keys: &[(String, Vec<u8>)]) -> BTreeSet<String> {
    let prefix = format!("{}{}/", node_prefix(install_id, node_id), OSD);
    keys.iter()
        .filter_map(|(key, _)| key.strip_prefix(&prefix))
        .filter_map(|rest| rest.split('/').next())
        .filter(|disk| !disk.is_empty())
        .map(str::to_string)
        .collect()
}
