// file: src/hardware/fingerprint.rs
// version: 1.0.0
// guid: 6094cd52-1fa5-4cfd-9612-9e59bf8cbff3

//! Hardware fingerprinting
//!
//! Every device in the component tree gets a weight equal to its depth times
//! [`BYTES_PER_TREE_LEVEL`] and a CRC-32 over its identifying attributes. The
//! checksum is added byte-wise (modulo 256, no carry between bytes) into the
//! fingerprint window starting at the device's weight, clipped to
//! [`BYTES_PER_FINGERPRINT`]. The root and its direct children land in the
//! first [`BYTES_FOR_MAJOR_COMPONENTS`] bytes and alone decide the printed
//! node identifier; deeper devices only move the trailing bytes.
//!
//! Virtual machines rarely expose serials, so when none of the significant
//! devices has one the MAC of the first network device stands in for it.

use super::{Device, DeviceTree, HardwareReport};
use crate::error::{RegistrarError, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use std::fmt;

/// Bytes of fingerprint allocated to each level of the device tree
pub const BYTES_PER_TREE_LEVEL: usize = 4;

/// Leading bytes that identify the machine; the rest track minor parts
pub const BYTES_FOR_MAJOR_COMPONENTS: usize = 8;

/// Size of a fingerprint
pub const BYTES_PER_FINGERPRINT: usize = 16;

/// Added to the repeated major bytes of the printed form
const PRINTED_OFFSET: u8 = 55;

const DEVICE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A 16-byte hardware fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fingerprint([u8; BYTES_PER_FINGERPRINT]);

impl Fingerprint {
    /// Wrap raw fingerprint bytes
    pub const fn from_bytes(bytes: [u8; BYTES_PER_FINGERPRINT]) -> Self {
        Self(bytes)
    }

    /// Raw fingerprint bytes
    pub fn as_bytes(&self) -> &[u8; BYTES_PER_FINGERPRINT] {
        &self.0
    }

    /// The bytes that decide node identity
    pub fn major_parts(&self) -> &[u8] {
        &self.0[..BYTES_FOR_MAJOR_COMPONENTS]
    }

    /// Number of trailing bytes from the first differing byte to the end.
    ///
    /// The lower the number, the less significant the difference. A missing
    /// fingerprint differs in every byte.
    pub fn bytes_differ(&self, other: Option<&Fingerprint>) -> usize {
        let Some(other) = other else {
            return BYTES_PER_FINGERPRINT;
        };

        self.0
            .iter()
            .zip(other.0.iter())
            .position(|(a, b)| a != b)
            .map(|first| BYTES_PER_FINGERPRINT - first)
            .unwrap_or(0)
    }

    /// Both fingerprints are byte-for-byte equal
    pub fn is_identical_to(&self, other: Option<&Fingerprint>) -> bool {
        self.bytes_differ(other) == 0
    }

    /// Any difference is confined to the minor components
    pub fn has_same_major_parts(&self, other: Option<&Fingerprint>) -> bool {
        self.bytes_differ(other) <= BYTES_FOR_MAJOR_COMPONENTS
    }

    /// Canonical printed form, used as the node identifier.
    ///
    /// Only the major bytes take part: they are written once as-is and once
    /// more shifted by a constant so the result does not look concatenated.
    pub fn node_id(&self) -> String {
        let mut printed = [0u8; BYTES_PER_FINGERPRINT];
        for (i, byte) in printed.iter_mut().enumerate() {
            let major = self.0[i % BYTES_FOR_MAJOR_COMPONENTS];
            *byte = if i < BYTES_FOR_MAJOR_COMPONENTS {
                major
            } else {
                major.wrapping_add(PRINTED_OFFSET)
            };
        }
        format_dashed(&printed)
    }

    /// Lower-case hex of the raw bytes, the stored form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the stored hex form
    pub fn from_hex(text: &str) -> Result<Self> {
        let decoded = hex::decode(text.trim())
            .map_err(|e| RegistrarError::parse(format!("invalid fingerprint hex: {}", e)))?;
        let bytes: [u8; BYTES_PER_FINGERPRINT] = decoded.try_into().map_err(|v: Vec<u8>| {
            RegistrarError::parse(format!(
                "fingerprint must be {} bytes, got {}",
                BYTES_PER_FINGERPRINT,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node_id())
    }
}

/// Format 16 bytes as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
pub fn format_dashed(bytes: &[u8; BYTES_PER_FINGERPRINT]) -> String {
    uuid::Uuid::from_bytes(*bytes).hyphenated().to_string()
}

/// Parse a JSON report and fingerprint its device tree
pub fn fingerprint_json(data: &[u8]) -> Result<Fingerprint> {
    HardwareReport::from_json(data)?.system.fingerprint()
}

fn is_significant(weight: usize) -> bool {
    weight < BYTES_FOR_MAJOR_COMPONENTS
}

impl DeviceTree {
    /// Compute the fingerprint of the tree
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let alternative_serial = self.alternative_serial()?;
        let mut raw = [0u8; BYTES_PER_FINGERPRINT];
        accumulate(&self.system, 0, alternative_serial, &mut raw)?;
        Ok(Fingerprint(raw))
    }

    /// Render the weighted tree, one device per line, for diagnostics
    pub fn describe(&self) -> Result<String> {
        let alternative_serial = self.alternative_serial()?;
        let mut out = String::new();
        describe_device(&self.system, 0, alternative_serial, "", &mut out)?;
        Ok(out)
    }

    /// MAC address standing in for missing serials, empty when not needed
    fn alternative_serial(&self) -> Result<&str> {
        if !significant_devices_lack_serials(&self.system, 0) {
            return Ok("");
        }

        first_network_serial(&self.system).ok_or_else(|| {
            RegistrarError::fingerprint("device tree lacks serials and MAC addresses")
        })
    }
}

fn significant_devices_lack_serials(device: &Device, weight: usize) -> bool {
    if !is_significant(weight) {
        return true;
    }
    if device.has_valid_serial() {
        return false;
    }

    let child_weight = weight + BYTES_PER_TREE_LEVEL;
    if !is_significant(child_weight) {
        return true;
    }
    device
        .devices
        .iter()
        .all(|child| significant_devices_lack_serials(child, child_weight))
}

fn first_network_serial(device: &Device) -> Option<&str> {
    if device.class == "network" {
        return Some(&device.serial);
    }
    device.devices.iter().find_map(first_network_serial)
}

/// CRC-32 over the identifying attributes of one device
fn device_hash(device: &Device, weight: usize, alternative_serial: &str) -> Result<u32> {
    let serial = if is_significant(weight) && !device.has_valid_serial() {
        alternative_serial
    } else {
        device.serial.as_str()
    };

    if device.id.is_empty()
        && serial.is_empty()
        && device.class.is_empty()
        && device.product.is_empty()
        && device.vendor.is_empty()
    {
        return Err(RegistrarError::FeaturelessDevice(format!(
            "id, serial, class, product and vendor are all empty (weight {})",
            weight
        )));
    }

    let mut digest = DEVICE_CRC.digest();
    // the root id is the hostname
    if weight > 0 {
        digest.update(device.id.as_bytes());
    }
    digest.update(serial.as_bytes());
    digest.update(device.class.as_bytes());
    digest.update(device.product.as_bytes());
    // "Linux x.y" vendors are kernel-provided and change with upgrades
    if !device.vendor.to_lowercase().starts_with("linux") {
        digest.update(device.vendor.as_bytes());
    }
    Ok(digest.finalize())
}

/// Add a device checksum into the window at `weight`, byte by byte without carry
fn add_window(raw: &mut [u8; BYTES_PER_FINGERPRINT], weight: usize, hash: u32) {
    for (offset, byte) in hash.to_le_bytes().iter().enumerate() {
        if let Some(slot) = raw.get_mut(weight + offset) {
            *slot = slot.wrapping_add(*byte);
        }
    }
}

fn accumulate(
    device: &Device,
    weight: usize,
    alternative_serial: &str,
    raw: &mut [u8; BYTES_PER_FINGERPRINT],
) -> Result<()> {
    let hash = device_hash(device, weight, alternative_serial)?;
    add_window(raw, weight, hash);

    for child in &device.devices {
        accumulate(child, weight + BYTES_PER_TREE_LEVEL, alternative_serial, raw)?;
    }
    Ok(())
}

fn describe_device(
    device: &Device,
    weight: usize,
    alternative_serial: &str,
    indent: &str,
    out: &mut String,
) -> Result<()> {
    let hash = device_hash(device, weight, alternative_serial)?;
    out.push_str(&format!(
        "{}device:{}\t class:{}\t crc32:{}\t weight:{}\n",
        indent,
        device.label(),
        device.class,
        hash,
        weight
    ));

    let child_indent = format!("{}  ", indent);
    for child in &device.devices {
        describe_device(
            child,
            weight + BYTES_PER_TREE_LEVEL,
            alternative_serial,
            &child_indent,
            out,
        )?;
    }
    Ok(())
}
