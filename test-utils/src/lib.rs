// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Testing utilities for the neutron-ovs crates

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use config::Relations;
use config::relations::UnitData;
use hardware::{DeviceEnumerator, HardwareError, Mac, NetDevice, PciAddress};
use tracing::debug;

/// In memory [`DeviceEnumerator`].
///
/// Devices can be hidden to mimic a NIC being bound to a DPDK driver, and every SR-IOV write is
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct FakeDevices {
    devices: Vec<NetDevice>,
    numvfs_writes: Vec<(String, u32)>,
}

impl FakeDevices {
    fn device(name: &str, mac: &str, pci: &str) -> NetDevice {
        NetDevice {
            mac: Mac::try_from(mac).unwrap_or_else(|e| panic!("bad fixture mac {mac}: {e}")),
            pci_address: PciAddress::try_from(pci)
                .unwrap_or_else(|e| panic!("bad fixture pci address {pci}: {e}")),
            interface_name: name.to_string(),
            is_sriov: false,
            sriov_total_vfs: 0,
            sriov_current_vfs: 0,
        }
    }

    /// Add a plain NIC.
    #[must_use]
    pub fn with_nic(mut self, name: &str, mac: &str, pci: &str) -> Self {
        self.devices.push(Self::device(name, mac, pci));
        self
    }

    /// Add an SR-IOV capable NIC.
    #[must_use]
    pub fn with_sriov_nic(mut self, name: &str, mac: &str, pci: &str, total: u32, current: u32) -> Self {
        let mut device = Self::device(name, mac, pci);
        device.is_sriov = true;
        device.sriov_total_vfs = total;
        device.sriov_current_vfs = current;
        self.devices.push(device);
        self
    }

    /// Remove `name` from enumeration, as happens once DPDK takes the device.
    pub fn hide(&mut self, name: &str) {
        self.devices.retain(|device| device.interface_name != name);
    }

    /// `(interface, numvfs)` pairs written so far.
    pub fn numvfs_writes(&self) -> &[(String, u32)] {
        &self.numvfs_writes
    }
}

impl DeviceEnumerator for FakeDevices {
    fn enumerate(&self) -> Result<Vec<NetDevice>, HardwareError> {
        Ok(self.devices.clone())
    }

    fn set_sriov_numvfs(
        &mut self,
        device: &NetDevice,
        numvfs: u32,
    ) -> Result<bool, HardwareError> {
        let known = self
            .devices
            .iter_mut()
            .find(|known| known.interface_name == device.interface_name)
            .ok_or_else(|| HardwareError::NoSuchDevice(device.interface_name.clone()))?;
        if numvfs > known.sriov_total_vfs {
            return Err(HardwareError::TooManyVirtualFunctions {
                interface: known.interface_name.clone(),
                requested: numvfs,
                total: known.sriov_total_vfs,
            });
        }
        if known.sriov_current_vfs == numvfs {
            return Ok(false);
        }
        debug!("fake write of {numvfs} vfs on {}", known.interface_name);
        known.sriov_current_vfs = numvfs;
        self.numvfs_writes
            .push((known.interface_name.clone(), numvfs));
        Ok(true)
    }
}

/// Unit data from `key, value` pairs.
pub fn unit(pairs: &[(&str, &str)]) -> UnitData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Relations with one unit per `(interface, pairs)` entry.
pub fn relations(units: &[(&str, &[(&str, &str)])]) -> Relations {
    let mut relations = Relations::new();
    for (interface, pairs) in units {
        relations.add_unit(interface, unit(pairs));
    }
    relations
}
