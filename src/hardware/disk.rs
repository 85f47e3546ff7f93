// file: src/hardware/disk.rs
// version: 1.1.0
// guid: 1f6f3c3e-58d4-4b0e-9f0a-2e7b6a9d5c41

//! Per-disk identifiers.
//!
//! A disk is named by the host fingerprint's leading bytes followed by a
//! CRC-64 of the disk's model, serial and size, so the name survives the
//! kernel renaming `sda` to `nvme0n1` while identical disks on different
//! hosts still differ.

use super::fingerprint::{format_dashed, Fingerprint, BYTES_PER_FINGERPRINT};
use super::BlockDevice;
use crc::{Crc, CRC_64_XZ};
use std::collections::BTreeMap;

/// lsblk type of whole disks
pub const DISK_DEVICE_TYPE: &str = "disk";

const DISK_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);
const CHECKSUM_BYTES: usize = std::mem::size_of::<u64>();

/// Stable identifier of a disk attached to `host`
pub fn disk_identifier(disk: &BlockDevice, host: &Fingerprint) -> String {
    let mut digest = DISK_CRC.digest();
    digest.update(disk.model.trim_matches(' ').as_bytes());
    digest.update(disk.serial.trim_matches(' ').as_bytes());
    digest.update(disk.size.trim_matches(' ').as_bytes());
    let checksum = digest.finalize();

    let mut id = *host.as_bytes();
    id[BYTES_PER_FINGERPRINT - CHECKSUM_BYTES..].copy_from_slice(&checksum.to_be_bytes());
    format_dashed(&id)
}

/// Map of device name to disk identifier for every whole disk
pub fn inventory_disks(devices: &[BlockDevice], host: &Fingerprint) -> BTreeMap<String, String> {
    devices
        .iter()
        .filter(|dev| dev.device_type == DISK_DEVICE_TYPE)
        .map(|dev| (dev.name.clone(), disk_identifier(dev, host)))
        .collect()
}
