// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Files managed by the charm.

pub const NEUTRON_CONF: &str = "/etc/neutron/neutron.conf";
pub const ML2_CONF: &str = "/etc/neutron/plugins/ml2/ml2_conf.ini";
pub const OVS_CONF: &str = "/etc/neutron/plugins/ml2/openvswitch_agent.ini";
pub const OVS_DEFAULT: &str = "/etc/default/openvswitch-switch";
pub const DPDK_INTERFACES: &str = "/etc/dpdk/interfaces";
pub const PHY_NIC_MTU_CONF: &str = "/etc/init/os-charm-phy-nic-mtu.conf";

pub const NEUTRON_METADATA_AGENT_CONF: &str = "/etc/neutron/metadata_agent.ini";
pub const NEUTRON_DHCP_AGENT_CONF: &str = "/etc/neutron/dhcp_agent.ini";
pub const NEUTRON_DNSMASQ_CONF: &str = "/etc/neutron/dnsmasq.conf";

pub const NEUTRON_L3_AGENT_CONF: &str = "/etc/neutron/l3_agent.ini";
pub const NEUTRON_FWAAS_CONF: &str = "/etc/neutron/fwaas_driver.ini";
pub const EXT_PORT_CONF: &str = "/etc/init/ext-port.conf";

pub const NEUTRON_SRIOV_AGENT_CONF: &str = "/etc/neutron/plugins/ml2/sriov_agent.ini";
pub const NEUTRON_SRIOV_INIT_DEFAULT: &str = "/etc/default/neutron-openvswitch-networking-sriov";
pub const NEUTRON_SRIOV_UPSTART_CONF: &str = "/etc/init/neutron-openvswitch-networking-sriov.conf";

/// Metadata proxy shared secret.
pub const SHARED_SECRET: &str = "/etc/neutron/secret.txt";

/// Job which applies the physical NIC MTU on hosts without MAAS managed MTUs.  It is not a
/// daemon, so it never appears in the service list.
pub const PHY_NIC_MTU_SERVICE: &str = "os-charm-phy-nic-mtu";
