// file: src/bundle/worker.rs
// version: 1.0.0
// guid: c1e7a4f9-5d30-4b8e-92a6-0f4d8b3e7c51

//! Archive a registered node unpacks over its root filesystem

use super::{build_archive, ManifestFile};
use crate::store::records::{KUBE_CEPH_KEYRING, WORKER_ROLE};
use crate::store::{ClusterRecord, NodeRecord};
use crate::{RegistrarError, Result};

pub const WORKER_ARCHIVE_NAME: &str = "worker-credentials.tar.gz";

/// Everything a worker archive is rendered from
pub struct WorkerContext<'a> {
    pub cluster: &'a ClusterRecord,
    pub node: &'a NodeRecord,
    /// Hash field of the controller's root account
    pub root_password_hash: String,
}

fn worker_manifest<'a>() -> [ManifestFile<WorkerContext<'a>>; 11] {
    [
        ManifestFile {
            path: "etc/registrar/settings",
            mode: 0o600,
            contents: settings,
        },
        ManifestFile {
            path: "etc/kubernetes/ssl/ca.pem",
            mode: 0o600,
            contents: ca_bundle,
        },
        ManifestFile {
            path: "etc/kubernetes/ssl/worker.pem",
            mode: 0o600,
            contents: kubelet_cert,
        },
        ManifestFile {
            path: "etc/kubernetes/ssl/worker-key.pem",
            mode: 0o600,
            contents: kubelet_key,
        },
        ManifestFile {
            path: "etc/keyfile",
            mode: 0o600,
            contents: |ctx| Ok(ctx.node.luks_keyfile.clone()),
        },
        ManifestFile {
            path: "etc/hostname",
            mode: 0o644,
            contents: |ctx| Ok(ctx.node.id.clone().into_bytes()),
        },
        ManifestFile {
            path: "root/.ssh/authorized_keys",
            mode: 0o600,
            contents: authorized_keys,
        },
        ManifestFile {
            path: "etc/rootpasshash",
            mode: 0o600,
            contents: |ctx| Ok(ctx.root_password_hash.clone().into_bytes()),
        },
        ManifestFile {
            path: "etc/ceph/ceph.conf",
            mode: 0o600,
            contents: |ctx| Ok(ctx.cluster.ceph_config.clone()),
        },
        ManifestFile {
            path: "etc/registrar/osd-loadout",
            mode: 0o600,
            contents: osd_loadout,
        },
        ManifestFile {
            path: "etc/ceph/keyring",
            mode: 0o600,
            contents: |ctx| {
                Ok(ctx
                    .cluster
                    .secrets
                    .get(KUBE_CEPH_KEYRING)
                    .cloned()
                    .unwrap_or_default())
            },
        },
    ]
}

/// Build the worker archive for a node
pub fn worker_archive(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    build_archive(&worker_manifest(), ctx)
}

fn settings(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    let mut out = String::new();
    for (key, value) in &ctx.cluster.vars {
        out.push_str(&format!("{}=\"{}\"\n", key, value));
    }
    Ok(out.into_bytes())
}

fn ca_bundle(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    if ctx.cluster.ca_bundle.is_empty() {
        return Err(RegistrarError::CaMissing("bundle"));
    }
    Ok(ctx.cluster.ca_bundle.clone())
}

fn kubelet_cert(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    if ctx.node.kubelet_cert.is_empty() {
        return Err(RegistrarError::identity(format!(
            "node {} has no certificate",
            ctx.node.id
        )));
    }
    Ok(ctx.node.kubelet_cert.clone())
}

fn kubelet_key(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    if ctx.node.kubelet_key.is_empty() {
        return Err(RegistrarError::identity(format!(
            "node {} has no private key",
            ctx.node.id
        )));
    }
    Ok(ctx.node.kubelet_key.clone())
}

fn authorized_keys(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for key in ctx.cluster.keys_for_role(WORKER_ROLE) {
        out.extend_from_slice(key);
        if !key.ends_with(b"\n") {
            out.push(b'\n');
        }
    }
    Ok(out)
}

fn osd_loadout(ctx: &WorkerContext<'_>) -> Result<Vec<u8>> {
    let mut out = String::new();
    for (disk_id, osd) in &ctx.node.osds {
        if osd.is_registered() {
            out.push_str(&format!("{}:{}:{}\n", disk_id, osd.id, osd.key));
        }
    }
    Ok(out.into_bytes())
}
