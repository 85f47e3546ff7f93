// file: src/cli/commands.rs
// version: 2.0.0
// guid: a7b8c9d0-e1f2-4345-8678-123456abcdef

//! Command implementations for the CLI

use crate::{
    api::{self, ApiState},
    config::{ConfigLoader, RegistrarConfig},
    hardware::{inventory_disks, HardwareReport},
    lifecycle::NodeLifecycleManager,
    storage::CephCli,
    store::{ClusterStore, EtcdBackend},
    RegistrarError, Result,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Overrides applied on top of the configuration file
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub install_id: Option<String>,
    pub listen: Option<String>,
    pub etcd_endpoints: Vec<String>,
}

/// Resolve the service configuration from an optional file and overrides
pub fn resolve_config(path: Option<&Path>, overrides: ServeOverrides) -> Result<RegistrarConfig> {
    let mut config = match path {
        Some(path) => ConfigLoader::new().load_unvalidated(path)?,
        None => RegistrarConfig::default(),
    };

    if let Some(install_id) = overrides.install_id {
        config.install_id = install_id;
    }
    if let Some(listen) = overrides.listen {
        config.listen_addr = listen;
    }
    if !overrides.etcd_endpoints.is_empty() {
        config.etcd.endpoints = overrides.etcd_endpoints;
    }

    config.validate()?;
    Ok(config)
}

/// Run the registration service
pub async fn serve_command(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let config = resolve_config(config_path.as_deref(), overrides)?;
    info!(
        "Starting registrar for cluster {} on {}",
        config.install_id, config.listen_addr
    );

    let backend = EtcdBackend::connect(
        &config.etcd.endpoints,
        config.dial_timeout(),
        config.request_timeout(),
    )
    .await?;
    let store = ClusterStore::new(Arc::new(backend), &config.install_id, config.request_timeout());
    let storage = Arc::new(CephCli::new(&config.storage.ceph_binary));
    let manager = NodeLifecycleManager::instantiate(store, storage, config.lifecycle()).await?;

    let state = Arc::new(ApiState {
        manager: Arc::new(manager),
        shadow: config.shadow.clone(),
    });
    api::serve(config.listen_socket()?, state).await
}

/// Print the node id of a report
pub fn fingerprint_command(report: &Path, raw: bool) -> Result<()> {
    print!("{}", format_fingerprint(&read_report(report)?, raw)?);
    Ok(())
}

/// Print the disk identifiers of a report
pub fn disks_command(report: &Path) -> Result<()> {
    print!("{}", format_disks(&read_report(report)?)?);
    Ok(())
}

/// Print the weighted device tree of a report
pub fn tree_command(report: &Path) -> Result<()> {
    print!("{}", read_report(report)?.system.describe()?);
    Ok(())
}

fn read_report(path: &Path) -> Result<HardwareReport> {
    let data = fs::read(path).map_err(|e| {
        RegistrarError::config(format!("Failed to read report {}: {}", path.display(), e))
    })?;
    HardwareReport::from_json(&data)
}

/// Node id, followed by the raw hex fingerprint when asked
pub fn format_fingerprint(report: &HardwareReport, raw: bool) -> Result<String> {
    let fingerprint = report.system.fingerprint()?;
    let mut out = format!("{}\n", fingerprint.node_id());
    if raw {
        out.push_str(&format!("{}\n", fingerprint.to_hex()));
    }
    Ok(out)
}

/// `Device,UUID` CSV sorted by device name
pub fn format_disks(report: &HardwareReport) -> Result<String> {
    let fingerprint = report.system.fingerprint()?;
    let mut out = String::from("Device,UUID\n");
    for (name, id) in inventory_disks(&report.storage.blockdevices, &fingerprint) {
        out.push_str(&format!("{},{}\n", name, id));
    }
    Ok(out)
}
