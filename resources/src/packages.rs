// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OS packages required by a feature and release combination.

use config::{FeatureFlags, OpenStackRelease};
use tracing::debug;

use crate::map::{LEGACY_OVS_AGENT, OVS_AGENT, sriov_agent_name};

pub const DVR_PACKAGES: &[&str] = &["neutron-l3-agent", "libnetfilter-log1"];
pub const DHCP_PACKAGES: &[&str] = &["neutron-dhcp-agent"];
/// haproxy serves the metadata proxy on isolated provider networks.
pub const METADATA_PACKAGES: &[&str] = &["neutron-metadata-agent", "haproxy"];
pub const L3HA_PACKAGES: &[&str] = &["keepalived"];
pub const PY3_PACKAGES: &[&str] = &["python3-neutron", "python3-zmq"];
pub const PURGE_PACKAGES: &[&str] = &["python-neutron", "python-neutron-fwaas"];
pub const OVS_DPDK_PACKAGE: &str = "openvswitch-switch-dpdk";
pub const DKMS_PACKAGE: &str = "openvswitch-datapath-dkms";

/// Packages of the OVS plugin itself: kernel headers and the DKMS datapath when the running
/// kernel needs an out of tree module, then the legacy agent package.
#[must_use]
pub fn ovs_plugin_packages(kernel_headers: &str, needs_dkms: bool) -> Vec<String> {
    let mut packages = vec![];
    if needs_dkms {
        packages.push(kernel_headers.to_string());
        packages.push(DKMS_PACKAGE.to_string());
    }
    packages.push(LEGACY_OVS_AGENT.to_string());
    packages
}

fn extend(packages: &mut Vec<String>, names: &[&str]) {
    packages.extend(names.iter().map(ToString::to_string));
}

/// Packages to install, in install order.  Duplicates are kept.
#[must_use]
pub fn determine_packages(flags: &FeatureFlags, plugin_packages: &[String]) -> Vec<String> {
    let release = &flags.os_release;
    let mut packages = plugin_packages.to_vec();
    let mut py3_extras = vec![];
    if flags.use_dvr {
        extend(&mut packages, DVR_PACKAGES);
        py3_extras.push("python3-neutron-fwaas".to_string());
        if flags.use_l3ha && *release >= OpenStackRelease::Newton {
            extend(&mut packages, L3HA_PACKAGES);
        }
    }
    if flags.enable_local_dhcp {
        extend(&mut packages, DHCP_PACKAGES);
        extend(&mut packages, METADATA_PACKAGES);
    }
    if *release >= OpenStackRelease::Mitaka {
        if let Some(position) = packages.iter().position(|p| p == LEGACY_OVS_AGENT) {
            packages.remove(position);
            packages.push(OVS_AGENT.to_string());
        }
    }
    if flags.use_dpdk {
        packages.push(OVS_DPDK_PACKAGE.to_string());
    }
    if flags.enable_sriov {
        packages.push(sriov_agent_name(flags).to_string());
    }
    if *release >= OpenStackRelease::Rocky {
        packages.retain(|p| !p.starts_with("python-"));
        extend(&mut packages, PY3_PACKAGES);
        packages.extend(py3_extras);
    }
    debug!("required packages: {packages:?}");
    packages
}

/// Packages left over from python 2 deployments.
#[must_use]
pub fn determine_purge_packages(flags: &FeatureFlags) -> Vec<String> {
    if flags.os_release >= OpenStackRelease::Rocky {
        PURGE_PACKAGES.iter().map(ToString::to_string).collect()
    } else {
        vec![]
    }
}

/// Purge packages which nothing in `required` still needs.
#[must_use]
pub fn purge_candidates(flags: &FeatureFlags, required: &[String]) -> Vec<String> {
    determine_purge_packages(flags)
        .into_iter()
        .filter(|p| !required.contains(p))
        .collect()
}
