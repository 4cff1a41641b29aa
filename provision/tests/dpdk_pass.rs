// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A DPDK provisioning pass with bridges and bonds, repeated after the devices have been
//! taken over by DPDK.

use config::{CharmConfig, OpenStackRelease, OvsVersion, Release, SystemState, SystemStateBuilder};
use dpdk::DeviceResolver;
use kvstore::{KvStore, MemoryKvStore};
use pretty_assertions::assert_eq;
use neutron_ovs_provision::{RecordingRunner, configure_ovs, enable_ovs_dpdk};
use test_utils::{FakeDevices, relations};

fn state() -> SystemState {
    SystemStateBuilder::default()
        .config(CharmConfig {
            enable_dpdk: true,
            data_port: Some("br-phynet1:fe:ed:be:ef:00:01 br-phynet2:bond0".to_string()),
            dpdk_bond_mappings: Some(
                "bond0:fe:ed:be:ef:00:03 bond0:FE:ED:BE:EF:00:04".to_string(),
            ),
            dpdk_bond_config: Some(":active-backup bond0:balance-slb:off:slow".to_string()),
            ..CharmConfig::default()
        })
        .relations(relations(&[(
            "neutron-plugin-api",
            &[("l2-population", "True"), ("global-physnet-mtu", "9000")],
        )]))
        .os_release(Release::from(OpenStackRelease::Queens))
        .ovs_version(OvsVersion::new(2, 9, 0))
        .finish()
        .unwrap()
}

fn devices() -> FakeDevices {
    FakeDevices::default()
        .with_nic("ens3f0", "fe:ed:be:ef:00:01", "0000:03:00.0")
        .with_nic("ens3f1", "fe:ed:be:ef:00:02", "0000:03:00.1")
        .with_nic("enp0s28f1", "fe:ed:be:ef:00:03", "0000:00:1c.1")
        .with_nic("enp0s28f2", "fe:ed:be:ef:00:04", "0000:00:1c.2")
}

fn expected_commands() -> Vec<&'static str> {
    vec![
        "systemctl is-active --quiet openvswitch-switch",
        "ovs-vsctl -- --may-exist add-br br-int -- set bridge br-int datapath_type=netdev",
        "ovs-vsctl -- --may-exist add-br br-ex -- set bridge br-ex datapath_type=netdev",
        "ovs-vsctl -- --may-exist add-br br-phynet1 -- set bridge br-phynet1 datapath_type=netdev",
        "ovs-vsctl add-port br-phynet1 dpdk-70cb47d -- set Interface dpdk-70cb47d type=dpdk \
         options:dpdk-devargs=0000:03:00.0",
        "ovs-vsctl set Interface dpdk-70cb47d mtu_request=9000",
        "ovs-vsctl -- --may-exist add-br br-phynet2 -- set bridge br-phynet2 datapath_type=netdev",
        "ovs-vsctl -- --may-exist add-br br-phynet2 -- set bridge br-phynet2 datapath_type=netdev",
        "ovs-vsctl --may-exist add-bond br-phynet2 bond0 dpdk-b9fb961 dpdk-8502f56 \
         -- set Interface dpdk-b9fb961 type=dpdk options:dpdk-devargs=0000:00:1c.1 \
         -- set Interface dpdk-8502f56 type=dpdk options:dpdk-devargs=0000:00:1c.2",
        "ovs-vsctl set Interface dpdk-b9fb961 mtu_request=9000",
        "ovs-vsctl set Interface dpdk-8502f56 mtu_request=9000",
        "ovs-vsctl -- set port bond0 bond_mode=balance-slb -- set port bond0 lacp=off \
         -- set port bond0 other_config:lacp-time=slow",
        "ovs-vsctl clear Bridge br-int ipfix",
        "ovs-vsctl clear Bridge br-ex ipfix",
        "ovs-vsctl clear Bridge br-phynet1 ipfix",
        "systemctl restart os-charm-phy-nic-mtu",
    ]
}

#[test]
fn dpdk_pass_survives_devices_leaving_the_kernel() {
    let state = state();
    let mut devices = devices();
    let mut cache = MemoryKvStore::new();

    let mut runner = RecordingRunner::new();
    configure_ovs(&mut runner, &state, &devices, &mut cache).unwrap();
    assert_eq!(runner.command_lines(), expected_commands());
    assert_eq!(cache.get("fe:ed:be:ef:00:01").as_deref(), Some("0000:03:00.0"));
    assert_eq!(cache.get("fe:ed:be:ef:00:04").as_deref(), Some("0000:00:1c.2"));
    assert_eq!(cache.durable().len(), 3);

    for name in ["ens3f0", "enp0s28f1", "enp0s28f2"] {
        devices.hide(name);
    }
    let mut runner = RecordingRunner::new();
    configure_ovs(&mut runner, &state, &devices, &mut cache).unwrap();
    assert_eq!(runner.command_lines(), expected_commands());
}

#[test]
fn eal_settings_follow_resolved_devices() {
    let mut state = state();
    let devices = devices();
    let mut cache = MemoryKvStore::new();
    state.host.resolved_devices = DeviceResolver::new(&devices, &mut cache)
        .resolve_dpdk_devices(&state.config)
        .unwrap();
    assert_eq!(state.host.resolved_devices.len(), 3);

    let mut runner = RecordingRunner::new();
    assert!(enable_ovs_dpdk(&mut runner, &state).unwrap());
    let commands = runner.command_lines();
    assert!(commands.contains(
        &"ovs-vsctl set Open_vSwitch . other_config:dpdk-extra=--pci-whitelist 0000:03:00.0 \
          --pci-whitelist 0000:00:1c.1 --pci-whitelist 0000:00:1c.2"
            .to_string()
    ));
    assert_eq!(commands.last().map(String::as_str), Some("systemctl restart openvswitch-switch"));
}
