// file: src/storage/reconcile.rs
// version: 1.0.0
// guid: 3c8e1f5a-7d2b-4a96-b0c4-e9f6a2d1b375

//! Bring a node's OSD map in line with the disks it reports.
//!
//! Registration failures are absorbed: the disk is left out of the map and
//! reported in [`ReconcileOutcome::failed`], so the next report retries it.

use super::StorageControl;
use crate::hardware::{disk_identifier, BlockDevice, Fingerprint, DISK_DEVICE_TYPE};
use crate::store::OsdRecord;
use crate::Result;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const BYTES_PER_WEIGHT_UNIT: f64 = 1_000_000_000_000.0;

/// What a provisioning or reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Disks registered as new OSDs
    pub added: Vec<String>,
    /// Disks whose OSDs were dropped from the map
    pub removed: Vec<String>,
    /// Disks that could not be registered
    pub failed: Vec<String>,
    /// Dropped OSDs whose purge failed
    pub purge_failed: Vec<String>,
}

impl ReconcileOutcome {
    /// Nothing was added or removed
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Crush weight for a size in bytes: terabytes with six decimals
pub fn osd_weight(size: &str) -> String {
    match size.trim().parse::<f64>() {
        Ok(bytes) => format!("{:.6}", bytes / BYTES_PER_WEIGHT_UNIT),
        Err(_) => {
            warn!("Failed to calculate weight for OSD from size {:?}, using zero", size);
            "0.0".to_string()
        }
    }
}

/// Unregistered OSD entries for every usable disk, keyed by disk identifier.
///
/// Disks whose size is known and below `min_size_bytes` are skipped.
pub fn inventory_osds(
    devices: &[BlockDevice],
    host: &Fingerprint,
    min_size_bytes: u64,
) -> BTreeMap<String, OsdRecord> {
    let mut osds = BTreeMap::new();
    for device in devices.iter().filter(|d| d.device_type == DISK_DEVICE_TYPE) {
        if let Some(bytes) = device.size_bytes() {
            if bytes < min_size_bytes {
                debug!(
                    "Skipping disk {} of {} bytes, below the {} byte minimum",
                    device.name, bytes, min_size_bytes
                );
                continue;
            }
        }

        osds.insert(
            disk_identifier(device, host),
            OsdRecord {
                weight: osd_weight(&device.size),
                ..Default::default()
            },
        );
    }
    osds
}

/// Create the OSD, its key and its crush placement.
///
/// A failed crush placement is only logged: the OSD already has an id and a
/// key, it just stays inactive until placed by hand.
pub async fn register_osd(
    control: &dyn StorageControl,
    disk_id: &str,
    weight: &str,
    host: &str,
) -> Result<OsdRecord> {
    let id = control.create_osd(disk_id).await?;
    let mut osd = OsdRecord {
        id,
        key: String::new(),
        weight: weight.to_string(),
    };
    let name = osd.name();

    control.add_osd_key(&name).await?;
    osd.key = control.get_osd_key(&name).await?;

    if let Err(e) = control.crush_add_osd(&name, weight, host).await {
        warn!(
            disk = disk_id,
            osd = %name,
            "Adding OSD with weight {} on {} to the crush map failed; it will not be active: {}",
            weight, host, e
        );
    }

    info!(disk = disk_id, osd = %name, "Registered OSD");
    Ok(osd)
}

async fn register_missing(
    control: &dyn StorageControl,
    host: &str,
    osds: &mut BTreeMap<String, OsdRecord>,
    inventory: BTreeMap<String, OsdRecord>,
    outcome: &mut ReconcileOutcome,
) {
    for (disk_id, wanted) in inventory {
        if osds.contains_key(&disk_id) {
            continue;
        }
        match register_osd(control, &disk_id, &wanted.weight, host).await {
            Ok(osd) => {
                osds.insert(disk_id.clone(), osd);
                outcome.added.push(disk_id);
            }
            Err(e) => {
                warn!(disk = %disk_id, "Failed to add OSD for node {}: {}", host, e);
                outcome.failed.push(disk_id);
            }
        }
    }
}

/// OSDs for a node seen for the first time.
///
/// The host bucket is created and moved under the default root first;
/// failures there are logged since the bucket may already exist.
pub async fn provision_osds(
    control: &dyn StorageControl,
    host: &str,
    inventory: BTreeMap<String, OsdRecord>,
) -> (BTreeMap<String, OsdRecord>, ReconcileOutcome) {
    if let Err(e) = control.add_host_bucket(host).await {
        warn!("Adding host bucket {} failed: {}", host, e);
    }
    if let Err(e) = control.move_host_to_default_root(host).await {
        warn!("Moving host bucket {} under the default root failed: {}", host, e);
    }

    let mut osds = BTreeMap::new();
    let mut outcome = ReconcileOutcome::default();
    register_missing(control, host, &mut osds, inventory, &mut outcome).await;
    (osds, outcome)
}

/// Purge OSDs whose disks are gone and register disks that are new.
///
/// A failed purge is logged and the OSD dropped from the map anyway.
pub async fn reconcile_osds(
    control: &dyn StorageControl,
    host: &str,
    current: &BTreeMap<String, OsdRecord>,
    inventory: BTreeMap<String, OsdRecord>,
) -> (BTreeMap<String, OsdRecord>, ReconcileOutcome) {
    let mut osds = current.clone();
    let mut outcome = ReconcileOutcome::default();

    let gone: Vec<String> = current
        .keys()
        .filter(|disk_id| !inventory.contains_key(*disk_id))
        .cloned()
        .collect();
    for disk_id in gone {
        if let Some(osd) = osds.remove(&disk_id) {
            if osd.is_registered() {
                if let Err(e) = control.purge_osd(&osd.name()).await {
                    warn!(disk = %disk_id, osd = %osd.name(), "Failed to purge OSD of node {}: {}", host, e);
                    outcome.purge_failed.push(disk_id.clone());
                }
            }
            info!(disk = %disk_id, "Removed OSD from node {}", host);
            outcome.removed.push(disk_id);
        }
    }

    register_missing(control, host, &mut osds, inventory, &mut outcome).await;
    (osds, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistrarError;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    /// Records every call; fails the operations it is told to
    #[derive(Default)]
    struct FakeControl {
        calls: Mutex<Vec<String>>,
        next_id: Mutex<u32>,
        fail_create: BTreeSet<String>,
        fail_crush: bool,
        fail_purge: bool,
    }

    impl FakeControl {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }

        fn failure(command: &str) -> RegistrarError {
            RegistrarError::Process {
                command: command.to_string(),
                exit_code: Some(1),
                stderr: "injected".to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageControl for FakeControl {
        async fn create_osd(&self, disk_id: &str) -> Result<String> {
            self.record(format!("create {}", disk_id));
            if self.fail_create.contains(disk_id) {
                return Err(Self::failure("osd create"));
            }
            let mut next = self.next_id.lock();
            *next += 1;
            Ok(next.to_string())
        }

        async fn add_osd_key(&self, osd_name: &str) -> Result<()> {
            self.record(format!("auth add {}", osd_name));
            Ok(())
        }

        async fn get_osd_key(&self, osd_name: &str) -> Result<String> {
            self.record(format!("auth get-key {}", osd_name));
            Ok(format!("key-{}", osd_name))
        }

        async fn crush_add_osd(&self, osd_name: &str, weight: &str, host: &str) -> Result<()> {
            self.record(format!("crush add {} {} {}", osd_name, weight, host));
            if self.fail_crush {
                return Err(Self::failure("osd crush add"));
            }
            Ok(())
        }

        async fn add_host_bucket(&self, host: &str) -> Result<()> {
            self.record(format!("add-bucket {}", host));
            Err(Self::failure("osd crush add-bucket"))
        }

        async fn move_host_to_default_root(&self, host: &str) -> Result<()> {
            self.record(format!("move {}", host));
            Ok(())
        }

        async fn purge_osd(&self, osd_name: &str) -> Result<()> {
            self.record(format!("purge {}", osd_name));
            if self.fail_purge {
                return Err(Self::failure("osd purge"));
            }
            Ok(())
        }
    }

    fn disk(name: &str, serial: &str, size: &str) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            serial: serial.to_string(),
            size: size.to_string(),
            device_type: DISK_DEVICE_TYPE.to_string(),
            ..Default::default()
        }
    }

    fn wanted(disks: &[&str]) -> BTreeMap<String, OsdRecord> {
        disks
            .iter()
            .map(|d| {
                (
                    d.to_string(),
                    OsdRecord {
                        weight: "1.000000".to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_osd_weight() {
        assert_eq!(osd_weight("4000787030016"), "4.000787");
        assert_eq!(osd_weight("480103981056"), "0.480104");
        assert_eq!(osd_weight(" 0 "), "0.000000");
        assert_eq!(osd_weight("unknown"), "0.0");
    }

    #[test]
    fn test_inventory_filters_small_and_non_disks() {
        let host = Fingerprint::from_bytes([3; 16]);
        let mut partition = disk("sda1", "p", "500000000000");
        partition.device_type = "part".to_string();
        let devices = vec![
            disk("sda", "big", "500000000000"),
            disk("sdb", "small", "1000000"),
            disk("sdc", "odd", "n/a"),
            partition,
        ];

        let osds = inventory_osds(&devices, &host, 10_000_000_000);
        assert_eq!(osds.len(), 2);
        assert_eq!(osds[&disk_identifier(&devices[0], &host)].weight, "0.500000");
        assert_eq!(osds[&disk_identifier(&devices[2], &host)].weight, "0.0");
        assert!(osds.values().all(|osd| !osd.is_registered()));
    }

    #[tokio::test]
    async fn test_register_sequence() {
        let control = FakeControl::default();
        let osd = register_osd(&control, "disk-a", "0.5", "node-1").await.unwrap();

        assert_eq!(osd.id, "1");
        assert_eq!(osd.key, "key-osd.1");
        assert_eq!(osd.weight, "0.5");
        assert_eq!(
            control.calls(),
            vec![
                "create disk-a",
                "auth add osd.1",
                "auth get-key osd.1",
                "crush add osd.1 0.5 node-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_crush_failure_keeps_osd() {
        let control = FakeControl {
            fail_crush: true,
            ..Default::default()
        };
        let osd = register_osd(&control, "disk-a", "0.5", "node-1").await.unwrap();
        assert!(osd.is_registered());
    }

    #[tokio::test]
    async fn test_provision_omits_failed_disks() {
        let control = FakeControl {
            fail_create: ["disk-b".to_string()].into_iter().collect(),
            ..Default::default()
        };

        let (osds, outcome) = provision_osds(&control, "node-1", wanted(&["disk-a", "disk-b"])).await;

        assert_eq!(osds.keys().collect::<Vec<_>>(), vec!["disk-a"]);
        assert_eq!(outcome.added, vec!["disk-a"]);
        assert_eq!(outcome.failed, vec!["disk-b"]);
        let calls = control.calls();
        assert_eq!(calls[0], "add-bucket node-1");
        assert_eq!(calls[1], "move node-1");
    }

    #[tokio::test]
    async fn test_reconcile_swaps_disks() {
        let control = FakeControl::default();
        let (current, _) = provision_osds(&control, "node-1", wanted(&["disk-a", "disk-b"])).await;
        let before = control.calls().len();

        let (osds, outcome) =
            reconcile_osds(&control, "node-1", &current, wanted(&["disk-a", "disk-c"])).await;

        assert_eq!(osds.keys().collect::<Vec<_>>(), vec!["disk-a", "disk-c"]);
        assert_eq!(osds["disk-a"], current["disk-a"]);
        assert_eq!(outcome.removed, vec!["disk-b"]);
        assert_eq!(outcome.added, vec!["disk-c"]);
        let calls = control.calls();
        assert_eq!(calls[before], format!("purge {}", current["disk-b"].name()));
        assert_eq!(calls[before + 1], "create disk-c");
    }

    #[tokio::test]
    async fn test_reconcile_unchanged_inventory_makes_no_calls() {
        let control = FakeControl::default();
        let (current, _) = provision_osds(&control, "node-1", wanted(&["disk-a"])).await;
        let before = control.calls().len();

        let (osds, outcome) = reconcile_osds(&control, "node-1", &current, wanted(&["disk-a"])).await;

        assert_eq!(osds, current);
        assert!(outcome.is_unchanged());
        assert_eq!(control.calls().len(), before);
    }

    #[tokio::test]
    async fn test_purge_failure_still_drops_osd() {
        let control = FakeControl {
            fail_purge: true,
            ..Default::default()
        };
        let (current, _) = provision_osds(&control, "node-1", wanted(&["disk-a"])).await;

        let (osds, outcome) = reconcile_osds(&control, "node-1", &current, BTreeMap::new()).await;

        assert!(osds.is_empty());
        assert_eq!(outcome.removed, vec!["disk-a"]);
        assert_eq!(outcome.purge_failed, vec!["disk-a"]);
    }
}
