// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! DPDK support for the neutron-ovs charm.
//!
//! Devices handed to DPDK are named by MAC address in the charm options, but Open vSwitch wants
//! PCI addresses, and the MAC stops being visible once the kernel driver lets go of the device.
//! [`resolver::DeviceResolver`] bridges that gap with a persistent cache.  The remaining modules
//! describe bonds and compute the EAL options handed to `ovs-vswitchd`.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod bond;
pub mod eal;
pub mod resolver;
pub mod topology;

pub use bond::{BondConfig, BondConfigError, BondMode, BondsConfig, Lacp, LacpTime};
pub use config::ResolvedDeviceMap;
pub use resolver::{DeviceResolver, ResolveError};
pub use topology::{BondPorts, BridgeBondTopology, TopologyError};
