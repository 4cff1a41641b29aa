// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network device enumeration.
//!
//! Only devices the kernel still drives show up here.  A device which has been handed to a DPDK
//! poll mode driver disappears from `class/net`, which is why callers cache the MAC to PCI
//! binding before that happens.

use std::path::{Path, PathBuf};

use sysfs::{link_target_name, list_dir, read_attribute, sysfs_root, write_attribute};
use tracing::{debug, info, warn};

use crate::HardwareError;
use crate::mac::Mac;
use crate::pci::address::PciAddress;

/// A kernel visible network device backed by a PCI function.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetDevice {
    /// Hardware address.
    pub mac: Mac,
    /// PCI function backing the device.
    pub pci_address: PciAddress,
    /// Kernel interface name (e.g. `ens3f0`).
    pub interface_name: String,
    /// True when the device exposes SR-IOV capabilities.
    pub is_sriov: bool,
    /// Number of virtual functions the device supports (0 when not SR-IOV capable).
    pub sriov_total_vfs: u32,
    /// Number of virtual functions currently enabled.
    pub sriov_current_vfs: u32,
}

/// Source of network device information.
pub trait DeviceEnumerator {
    /// Take a fresh inventory of kernel visible network devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the device inventory can not be read.
    fn enumerate(&self) -> Result<Vec<NetDevice>, HardwareError>;

    /// Set the number of SR-IOV virtual functions enabled on `device`.
    ///
    /// Returns `Ok(false)` when the device already has `numvfs` functions enabled and nothing
    /// was written.
    ///
    /// # Errors
    ///
    /// Returns an error if `numvfs` exceeds what the device supports or the write fails.
    fn set_sriov_numvfs(&mut self, device: &NetDevice, numvfs: u32)
    -> Result<bool, HardwareError>;
}

/// A point in time snapshot of the host's network devices.
#[derive(Debug, Clone, Default)]
pub struct PciNetDevices {
    devices: Vec<NetDevice>,
}

impl PciNetDevices {
    /// Snapshot the devices currently reported by `enumerator`.
    ///
    /// # Errors
    ///
    /// Propagates enumeration failures.
    pub fn scan(enumerator: &impl DeviceEnumerator) -> Result<Self, HardwareError> {
        let devices = enumerator.enumerate()?;
        debug!("enumerated {} network devices", devices.len());
        Ok(Self { devices })
    }

    /// Find a device by hardware address.
    #[must_use]
    pub fn get_device_from_mac(&self, mac: &Mac) -> Option<&NetDevice> {
        self.devices.iter().find(|device| device.mac == *mac)
    }

    /// Find a device by kernel interface name.
    #[must_use]
    pub fn get_device_from_interface_name(&self, name: &str) -> Option<&NetDevice> {
        self.devices
            .iter()
            .find(|device| device.interface_name == name)
    }

    /// Every device in the snapshot, in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = &NetDevice> {
        self.devices.iter()
    }

    /// Devices which can host SR-IOV virtual functions.
    pub fn sriov_capable(&self) -> impl Iterator<Item = &NetDevice> {
        self.devices.iter().filter(|device| device.is_sriov)
    }
}

impl From<Vec<NetDevice>> for PciNetDevices {
    fn from(devices: Vec<NetDevice>) -> Self {
        Self { devices }
    }
}

/// [`DeviceEnumerator`] reading `class/net` under a sysfs root.
#[derive(Debug, Clone)]
pub struct SysfsNetDevices {
    root: PathBuf,
}

impl SysfsNetDevices {
    /// Enumerate devices below an arbitrary directory laid out like sysfs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Enumerate devices of the running host.
    ///
    /// # Errors
    ///
    /// Fails if sysfs can not be located.
    pub fn from_host() -> Result<Self, HardwareError> {
        Ok(Self::new(sysfs_root()?.inner().clone()))
    }

    /// Root of the sysfs tree this enumerator reads.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn class_net(&self) -> PathBuf {
        self.root.join("class/net")
    }

    /// Names of the kernel (Linux) bridges on the host.
    ///
    /// # Errors
    ///
    /// Fails if `class/net` can not be listed.
    pub fn linux_bridges(&self) -> Result<Vec<String>, HardwareError> {
        Ok(list_dir(self.class_net())?
            .into_iter()
            .filter(|name| self.class_net().join(name).join("bridge").is_dir())
            .collect())
    }

    fn read_u32(dir: &Path, name: &str) -> Result<Option<u32>, HardwareError> {
        match read_attribute(dir, name)? {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| {
                HardwareError::UnexpectedAttribute {
                    attribute: dir.join(name).display().to_string(),
                    value,
                }
            }),
        }
    }

    fn read_device(&self, name: &str) -> Result<Option<NetDevice>, HardwareError> {
        let dir = self.class_net().join(name);
        let Some(target) = link_target_name(dir.join("device"))? else {
            debug!("{name} has no backing device, skipping");
            return Ok(None);
        };
        let Ok(pci_address) = PciAddress::try_from(target.as_str()) else {
            debug!("{name} is backed by non PCI device {target}, skipping");
            return Ok(None);
        };
        let Some(address) = read_attribute(&dir, "address")? else {
            debug!("{name} reports no hardware address, skipping");
            return Ok(None);
        };
        let mac = match Mac::try_from(address.as_str()) {
            Ok(mac) => mac,
            Err(e) => {
                warn!("{name}: {e}, skipping");
                return Ok(None);
            }
        };
        let device_dir = dir.join("device");
        let total = Self::read_u32(&device_dir, "sriov_totalvfs")?;
        let current = Self::read_u32(&device_dir, "sriov_numvfs")?;
        Ok(Some(NetDevice {
            mac,
            pci_address,
            interface_name: name.to_string(),
            is_sriov: total.is_some(),
            sriov_total_vfs: total.unwrap_or(0),
            sriov_current_vfs: current.unwrap_or(0),
        }))
    }
}

impl DeviceEnumerator for SysfsNetDevices {
    fn enumerate(&self) -> Result<Vec<NetDevice>, HardwareError> {
        let mut devices = vec![];
        for name in list_dir(self.class_net())? {
            if let Some(device) = self.read_device(&name)? {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    fn set_sriov_numvfs(
        &mut self,
        device: &NetDevice,
        numvfs: u32,
    ) -> Result<bool, HardwareError> {
        let device_dir = self.class_net().join(&device.interface_name).join("device");
        let total = Self::read_u32(&device_dir, "sriov_totalvfs")?
            .ok_or_else(|| HardwareError::NoSuchDevice(device.interface_name.clone()))?;
        if numvfs > total {
            return Err(HardwareError::TooManyVirtualFunctions {
                interface: device.interface_name.clone(),
                requested: numvfs,
                total,
            });
        }
        let current = Self::read_u32(&device_dir, "sriov_numvfs")?.unwrap_or(0);
        if current == numvfs {
            debug!(
                "{} already has {numvfs} virtual functions",
                device.interface_name
            );
            return Ok(false);
        }
        info!(
            "setting {numvfs} virtual functions on {} (was {current})",
            device.interface_name
        );
        // the kernel refuses to change a non zero VF count without going through zero
        if current != 0 {
            write_attribute(&device_dir, "sriov_numvfs", "0")?;
        }
        write_attribute(&device_dir, "sriov_numvfs", &numvfs.to_string())?;
        Ok(true)
    }
}
