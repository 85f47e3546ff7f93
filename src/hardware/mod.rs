// file: src/hardware/mod.rs
// version: 1.0.0
// guid: 844946da-f186-411e-a184-4eb92c03b673

//! Hardware inventory reports
//!
//! A report carries two views of a machine: the component tree produced by
//! `lshw` and the flat block device list produced by `lsblk`. Both are
//! accepted as JSON and kept verbatim enough to be stored and served back.

pub mod disk;
pub mod fingerprint;
pub mod serde_helpers;

pub use disk::{disk_identifier, inventory_disks, DISK_DEVICE_TYPE};
pub use fingerprint::{
    fingerprint_json, format_dashed, Fingerprint, BYTES_FOR_MAJOR_COMPONENTS,
    BYTES_PER_FINGERPRINT, BYTES_PER_TREE_LEVEL,
};

use crate::error::{RegistrarError, Result};
use serde::{Deserialize, Serialize};

/// A numeric attribute with its unit, as `lshw` reports sizes and capacities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    #[serde(default)]
    pub units: String,
    #[serde(default, deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub value: String,
}

/// A node of the hardware component tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub id: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub class: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub handle: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub product: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub description: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub vendor: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub version: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub serial: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub slot: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "serde_helpers::measure::deserialize"
    )]
    pub size: Option<Measure>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "serde_helpers::measure::deserialize"
    )]
    pub capacity: Option<Measure>,
    /// Child components, in report order
    #[serde(
        rename = "Nodes",
        alias = "nodes",
        alias = "children",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub devices: Vec<Device>,
    /// Attributes not used for identity (capabilities, configuration, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    /// Serial that identifies the part; empty and "0" are placeholders
    pub fn has_valid_serial(&self) -> bool {
        !self.serial.is_empty() && self.serial != "0"
    }

    /// Human readable label for log lines
    pub fn label(&self) -> &str {
        if !self.description.is_empty() {
            &self.description
        } else if !self.id.is_empty() {
            &self.id
        } else {
            &self.class
        }
    }
}

/// The component tree rooted at the machine itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTree {
    pub system: Device,
}

/// A block device as listed by `lsblk -b --json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDevice {
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub mountpoint: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub name: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub kname: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub model: String,
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub serial: String,
    /// Size in bytes, kept as text because it feeds the disk checksum
    #[serde(deserialize_with = "serde_helpers::lenient_string::deserialize")]
    pub size: String,
    #[serde(deserialize_with = "serde_helpers::lenient_bool::deserialize")]
    pub rota: bool,
    #[serde(
        rename = "type",
        deserialize_with = "serde_helpers::lenient_string::deserialize"
    )]
    pub device_type: String,
}

impl BlockDevice {
    /// Size in bytes if the reported size is numeric
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.trim().parse().ok()
    }
}

/// Wrapper matching the `lsblk --json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockDevices {
    #[serde(default)]
    pub blockdevices: Vec<BlockDevice>,
}

/// A full inventory report submitted by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareReport {
    #[serde(rename = "System", alias = "system")]
    pub system: DeviceTree,
    #[serde(rename = "Storage", alias = "storage", default)]
    pub storage: BlockDevices,
}

impl HardwareReport {
    /// Parse a JSON report
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| RegistrarError::parse(format!("invalid report JSON: {}", e)))
    }

    /// Serialize the report for storage
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Block devices of type "disk"
    pub fn disks(&self) -> impl Iterator<Item = &BlockDevice> {
        self.storage
            .blockdevices
            .iter()
            .filter(|dev| dev.device_type == DISK_DEVICE_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHYSICAL: &str = include_str!("../../tests/fixtures/report_physical.json");
    const VM: &str = include_str!("../../tests/fixtures/report_vm.json");

    #[test]
    fn test_parse_physical_report() {
        let report = HardwareReport::from_json(PHYSICAL.as_bytes()).unwrap();
        let system = &report.system.system;

        assert_eq!(system.class, "system");
        assert_eq!(system.serial, "7GHK3Q2");
        assert_eq!(system.devices.len(), 2);
        assert_eq!(system.devices[0].devices.len(), 3);

        let cpu = &system.devices[0].devices[0];
        assert_eq!(cpu.size.as_ref().unwrap().units, "Hz");
        assert_eq!(cpu.size.as_ref().unwrap().value, "2100000000");

        assert_eq!(report.storage.blockdevices.len(), 4);
        assert_eq!(report.disks().count(), 2);
    }

    #[test]
    fn test_parse_lowercase_children_and_numeric_lsblk() {
        let report = HardwareReport::from_json(VM.as_bytes()).unwrap();
        let system = &report.system.system;

        assert_eq!(system.devices.len(), 2);
        assert_eq!(system.devices[0].devices[1].devices[0].class, "network");

        let vda = &report.storage.blockdevices[0];
        assert_eq!(vda.size, "21474836480");
        assert_eq!(vda.size_bytes(), Some(21_474_836_480));
        assert_eq!(vda.model, "");
        assert!(!vda.rota);
        assert!(report.storage.blockdevices[1].rota);
    }

    #[test]
    fn test_lshw_children_and_bare_sizes() {
        let json = r#"{
            "system": {
                "system": {
                    "id": "box",
                    "class": "system",
                    "serial": "S1",
                    "children": [
                        {"id": "disk", "class": "disk", "size": 512110190592, "units": "bytes"}
                    ]
                }
            }
        }"#;

        let report = HardwareReport::from_json(json.as_bytes()).unwrap();
        let disk = &report.system.system.devices[0];
        assert_eq!(disk.size.as_ref().unwrap().value, "512110190592");
        assert_eq!(disk.extra.get("units").unwrap(), "bytes");
        assert!(report.storage.blockdevices.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_extra_attributes() {
        let json = r#"{"System": {"system": {"id": "a", "class": "system",
            "capabilities": {"smbios-3.0": "SMBIOS version 3.0"}}}}"#;
        let report = HardwareReport::from_json(json.as_bytes()).unwrap();
        let stored = report.to_json().unwrap();
        let reloaded = HardwareReport::from_json(&stored).unwrap();

        assert_eq!(report, reloaded);
        assert!(reloaded.system.system.extra.contains_key("capabilities"));
    }

    #[test]
    fn test_malformed_report_is_parse_error() {
        let err = HardwareReport::from_json(b"{\"System\": [1, 2]}").unwrap_err();
        assert!(matches!(err, RegistrarError::Parse(_)));

        let err = HardwareReport::from_json(b"not json").unwrap_err();
        assert!(matches!(err, RegistrarError::Parse(_)));
    }

    #[test]
    fn test_valid_serial_placeholders() {
        let mut device = Device::default();
        assert!(!device.has_valid_serial());
        device.serial = "0".to_string();
        assert!(!device.has_valid_serial());
        device.serial = "ABC123".to_string();
        assert!(device.has_valid_serial());
    }
}
