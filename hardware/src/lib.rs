// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host hardware discovery for the neutron-ovs charm.
//!
//! The charm only cares about a narrow slice of the machine: which network devices exist, which
//! PCI function backs each of them, whether they can host SR-IOV virtual functions, and how CPU
//! cores are spread across NUMA nodes (for the DPDK EAL options).

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod mac;
pub mod nic;
pub mod numa;
pub mod pci;

pub use mac::Mac;
pub use nic::{DeviceEnumerator, NetDevice, PciNetDevices, SysfsNetDevices};
pub use pci::address::PciAddress;

/// Errors which may occur while inspecting host hardware.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Access to sysfs failed.
    #[error(transparent)]
    Sysfs(#[from] sysfs::SysfsErr),
    /// A device reported a PCI address we could not parse.
    #[error(transparent)]
    PciAddress(#[from] pci::address::InvalidPciAddress),
    /// A sysfs attribute held something other than what the kernel documents.
    #[error("unexpected value {value:?} in {attribute}")]
    UnexpectedAttribute {
        /// Attribute (path) which was read.
        attribute: String,
        /// The offending content.
        value: String,
    },
    /// The requested device is not known to the enumerator.
    #[error("no such network device: {0}")]
    NoSuchDevice(String),
    /// More virtual functions were requested than the device supports.
    #[error("{interface} supports at most {total} virtual functions, {requested} requested")]
    TooManyVirtualFunctions {
        /// Interface name.
        interface: String,
        /// Number of VFs requested.
        requested: u32,
        /// Number of VFs supported by the device.
        total: u32,
    },
}
