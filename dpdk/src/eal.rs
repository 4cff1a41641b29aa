// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! DPDK EAL option helpers and port naming.

use std::fmt::Write;

use config::ResolvedDeviceMap;
use hardware::PciAddress;
use hardware::numa::NumaNode;
use sha1::{Digest, Sha1};

pub use hardware::numa::parse_cpu_list;

/// OVS port name for a DPDK device.
///
/// With late DPDK initialisation the name is derived from the PCI address so that it stays
/// stable when devices are added or removed; older OVS expects `dpdk<index>`.
#[must_use]
pub fn dpdk_port_name(pci: &PciAddress, late_init: bool, index: usize) -> String {
    if late_init {
        let digest = Sha1::digest(pci.to_string().as_bytes());
        let mut name = String::from("dpdk-");
        for byte in digest.iter() {
            let _ = write!(name, "{byte:02x}");
        }
        name.truncate("dpdk-".len() + 7);
        name
    } else {
        format!("dpdk{index}")
    }
}

/// Hex mask selecting the first `cores_per_node` cores of every NUMA node.
///
/// Rendered with a `0x` prefix and at least two digits.
#[must_use]
pub fn cpu_mask(nodes: &[NumaNode], cores_per_node: u32) -> String {
    let mut words: Vec<u64> = vec![];
    for node in nodes {
        for core in node.cpus.iter().take(cores_per_node as usize) {
            let word = (*core / 64) as usize;
            if words.len() <= word {
                words.resize(word + 1, 0);
            }
            words[word] |= 1u64 << (core % 64);
        }
    }
    while words.len() > 1 && words.last() == Some(&0) {
        words.pop();
    }
    let mut hex = String::new();
    for (position, word) in words.iter().rev().enumerate() {
        if position == 0 {
            let _ = write!(hex, "{word:x}");
        } else {
            let _ = write!(hex, "{word:016x}");
        }
    }
    format!("0x{hex:0>2}")
}

/// `dpdk-socket-mem` value: `megabytes` on every NUMA node, or once if no node is known.
#[must_use]
pub fn socket_memory(nodes: &[NumaNode], megabytes: u32) -> String {
    if nodes.is_empty() {
        return megabytes.to_string();
    }
    nodes
        .iter()
        .map(|_| megabytes.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn whitelist(devices: &ResolvedDeviceMap, flag: &str) -> String {
    devices
        .keys()
        .map(|pci| format!("{flag} {pci}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Devices as old style `-w <pci>` EAL arguments.
#[must_use]
pub fn device_whitelist(devices: &ResolvedDeviceMap) -> String {
    whitelist(devices, "-w")
}

/// Devices as `--pci-whitelist <pci>` EAL arguments.
#[must_use]
pub fn pci_whitelist(devices: &ResolvedDeviceMap) -> String {
    whitelist(devices, "--pci-whitelist")
}
