// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bridge, port and bond provisioning, and the switch to the DPDK enabled `ovs-vswitchd`.

use config::mapping::parse_bridge_mappings;
use config::{FeatureFlags, PortMapping, SystemState};
use dpdk::eal::{cpu_mask, dpdk_port_name, pci_whitelist, socket_memory};
use dpdk::{BondsConfig, BridgeBondTopology, DeviceResolver};
use hardware::DeviceEnumerator;
use kvstore::KvStore;
use ordermap::OrderSet;
use resources::ContextGenerator;
use resources::paths::PHY_NIC_MTU_SERVICE;
use tracing::{debug, info, warn};

use crate::ProvisionError;
use crate::runner::CommandRunner;
use crate::service::{
    OPENVSWITCH_SERVICE, ServiceAction, restart_best_effort, service, service_running,
};
use crate::vsctl::{IpfixSettings, Vsctl};

pub const INT_BRIDGE: &str = "br-int";
pub const EXT_BRIDGE: &str = "br-ex";
pub const UPDATE_ALTERNATIVES: &[&str] = &["update-alternatives", "--set", "ovs-vswitchd"];
pub const OVS_DPDK_BIN: &str = "/usr/lib/openvswitch-switch-dpdk/ovs-vswitchd-dpdk";
const VHOST_OWNERSHIP: &str = "--vhost-owner libvirt-qemu:kvm --vhost-perm 0660";

/// Bring the Open vSwitch configuration in line with `state`.
///
/// Ensures the integration and external bridges, attaches the external port when DVR is on,
/// and provisions the data bridges: kernel ports from `data-port` without DPDK, resolved DPDK
/// ports (and bonds, with late DPDK initialisation) otherwise.  IPFIX export follows
/// `ipfix-target` on every managed bridge.
///
/// # Errors
///
/// Fails on an invalid `dpdk-bond-config` before any command is issued, and on the first
/// failing command or device resolution afterwards.
pub fn configure_ovs<R, E, S>(
    runner: &mut R,
    state: &SystemState,
    enumerator: &E,
    cache: &mut S,
) -> Result<(), ProvisionError>
where
    R: CommandRunner,
    E: DeviceEnumerator,
    S: KvStore,
{
    let flags = state.flags();
    let bond_configs = BondsConfig::parse_option(state.config.dpdk_bond_config.as_deref())?;
    if !service_running(runner, OPENVSWITCH_SERVICE) {
        info!("{OPENVSWITCH_SERVICE} is not running, restarting it");
        service(runner, ServiceAction::Restart, OPENVSWITCH_SERVICE)?;
    }
    let datapath = flags.datapath_type();
    let mut vsctl = Vsctl::new(runner, flags.ovs_late_dpdk_init);
    vsctl.add_bridge(INT_BRIDGE, datapath)?;
    vsctl.add_bridge(EXT_BRIDGE, datapath)?;
    if flags.use_dvr {
        let ext = ContextGenerator::ExternalPort.generate(state);
        if let Some(port) = ext.get_str("ext_port") {
            vsctl.add_bridge_port(EXT_BRIDGE, port, false)?;
        }
    }

    let mut bridges: OrderSet<String> = [INT_BRIDGE, EXT_BRIDGE]
        .into_iter()
        .map(ToString::to_string)
        .collect();
    if flags.use_dpdk {
        let mut resolver = DeviceResolver::new(enumerator, cache);
        let mtu = state.neutron_api().global_physnet_mtu;
        let resolved = resolver.resolve_dpdk_bridges(&state.config)?;
        debug!("dpdk bridges: {resolved:?}");
        for (index, (pci, bridge)) in resolved.iter().enumerate() {
            vsctl.add_bridge(bridge, datapath)?;
            let port = dpdk_port_name(pci, flags.ovs_late_dpdk_init, index);
            vsctl.dpdk_add_bridge_port(bridge, &port, pci)?;
            vsctl.dpdk_set_mtu_request(&port, mtu)?;
        }
        bridges.extend(resolved.into_values());

        if flags.ovs_late_dpdk_init {
            let bonds = resolver.resolve_dpdk_bonds(&state.config)?;
            debug!("dpdk bonds: {bonds:?}");
            let data_ports = PortMapping::parse_option(state.config.data_port());
            let mut topology = BridgeBondTopology::new();
            for (pci, bond) in &bonds {
                let Some(bridge) = data_ports.get(bond) else {
                    debug!("bond {bond} is not attached to any bridge, skipping {pci}");
                    continue;
                };
                vsctl.add_bridge(bridge, datapath)?;
                topology.add_port(bridge, bond, &dpdk_port_name(pci, true, 0), *pci)?;
            }
            for (bridge, bond, ports) in topology.bonds() {
                vsctl.dpdk_add_bridge_bond(bridge, bond, ports)?;
                vsctl.dpdk_set_interfaces_mtu(mtu, ports.keys().map(String::as_str))?;
                vsctl.dpdk_set_bond_config(bond, bond_configs.get_bond_config(bond))?;
            }
        }
    } else {
        let ports = PortMapping::parse_option(state.config.data_port())
            .resolve_port_names(&state.host.net_devices);
        for bridge in parse_bridge_mappings(state.config.bridge_mappings()).into_values() {
            vsctl.add_bridge(&bridge, datapath)?;
            for (port, _) in ports.iter().filter(|(_, target)| **target == bridge) {
                if state.host.linux_bridges.contains(port) {
                    warn!("{port} is a linux bridge, not attaching it to {bridge}");
                } else {
                    vsctl.add_bridge_port(&bridge, port, true)?;
                }
            }
            bridges.insert(bridge);
        }
    }

    match state.config.ipfix_target() {
        Some(target) => {
            for bridge in &bridges {
                vsctl.disable_ipfix(bridge)?;
                vsctl.enable_ipfix(bridge, target, IpfixSettings::default())?;
            }
        }
        None => {
            for bridge in &bridges {
                vsctl.disable_ipfix(bridge)?;
            }
        }
    }

    restart_best_effort(runner, PHY_NIC_MTU_SERVICE);
    Ok(())
}

fn dpdk_other_config(state: &SystemState, flags: &FeatureFlags) -> [(&'static str, String); 4] {
    let nodes = &state.host.numa_nodes;
    let whitelist = pci_whitelist(&state.host.resolved_devices);
    let extra = if flags.ovs_vhostuser_client {
        whitelist
    } else {
        format!("{VHOST_OWNERSHIP} {whitelist}")
    };
    [
        (
            "dpdk-lcore-mask",
            cpu_mask(nodes, state.config.dpdk_socket_cores),
        ),
        (
            "dpdk-socket-mem",
            socket_memory(nodes, state.config.dpdk_socket_memory),
        ),
        ("dpdk-init", "true".to_string()),
        ("dpdk-extra", extra),
    ]
}

/// Switch `ovs-vswitchd` to the DPDK build and, with late DPDK initialisation, write the EAL
/// settings into the `Open_vSwitch` table.
///
/// Returns whether a setting changed.  Open vSwitch is restarted after a change unless the
/// unit is paused.
///
/// # Errors
///
/// Propagates command failures.
pub fn enable_ovs_dpdk<R: CommandRunner>(
    runner: &mut R,
    state: &SystemState,
) -> Result<bool, ProvisionError> {
    let flags = state.flags();
    let mut argv = UPDATE_ALTERNATIVES.to_vec();
    argv.push(OVS_DPDK_BIN);
    runner.check_call(&argv)?;

    let mut changed = false;
    if flags.ovs_late_dpdk_init {
        let mut vsctl = Vsctl::new(runner, true);
        for (column, value) in dpdk_other_config(state, &flags) {
            changed |= vsctl.set_open_vswitch_column(&format!("other_config:{column}"), &value)?;
        }
    }
    if changed && !state.paused {
        service(runner, ServiceAction::Restart, OPENVSWITCH_SERVICE)?;
    } else if changed {
        info!("unit is paused, not restarting {OPENVSWITCH_SERVICE}");
    }
    Ok(changed)
}
