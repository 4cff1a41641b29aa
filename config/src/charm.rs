// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Operator facing charm options.

use serde::{Deserialize, Serialize};

/// Charm options, keyed by their kebab-case option names.
///
/// Options not present in the input take the charm's published default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CharmConfig {
    // dpdk
    pub enable_dpdk: bool,
    pub data_port: Option<String>,
    pub dpdk_bond_mappings: Option<String>,
    pub dpdk_bond_config: Option<String>,
    pub dpdk_driver: Option<String>,
    pub dpdk_socket_memory: u32,
    pub dpdk_socket_cores: u32,

    // sr-iov
    pub enable_sriov: bool,
    pub sriov_numvfs: String,
    pub sriov_device_mappings: Option<String>,

    // bridges and ports
    pub bridge_mappings: Option<String>,
    pub flat_network_providers: Option<String>,
    pub vlan_ranges: Option<String>,
    pub ext_port: Option<String>,
    pub ipfix_target: Option<String>,
    pub os_data_network: Option<String>,

    // agents
    pub enable_local_dhcp_and_metadata: bool,
    pub use_dvr_snat: bool,
    pub dnsmasq_flags: Option<String>,
    pub dns_servers: Option<String>,
    pub instance_mtu: Option<u32>,
    pub worker_multiplier: Option<f64>,

    // security groups and firewall
    pub firewall_driver: Option<String>,
    pub disable_security_groups: bool,
    pub prevent_arp_spoofing: bool,
    pub security_group_log_output_base: Option<String>,
    pub security_group_log_rate_limit: Option<u32>,
    pub security_group_log_burst_limit: u32,
    pub firewall_group_log_output_base: Option<String>,
    pub firewall_group_log_rate_limit: Option<u32>,
    pub firewall_group_log_burst_limit: Option<u32>,

    // messaging
    pub rabbit_user: String,
    pub rabbit_vhost: String,

    // logging of the managed services
    pub use_syslog: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            enable_dpdk: false,
            data_port: None,
            dpdk_bond_mappings: None,
            dpdk_bond_config: Some(":balance-tcp:active:fast".to_string()),
            dpdk_driver: None,
            dpdk_socket_memory: 1024,
            dpdk_socket_cores: 1,
            enable_sriov: false,
            sriov_numvfs: "auto".to_string(),
            sriov_device_mappings: None,
            bridge_mappings: Some("physnet1:br-data".to_string()),
            flat_network_providers: None,
            vlan_ranges: Some("physnet1:1000:2000".to_string()),
            ext_port: None,
            ipfix_target: None,
            os_data_network: None,
            enable_local_dhcp_and_metadata: false,
            use_dvr_snat: false,
            dnsmasq_flags: None,
            dns_servers: None,
            instance_mtu: None,
            worker_multiplier: None,
            firewall_driver: None,
            disable_security_groups: false,
            prevent_arp_spoofing: true,
            security_group_log_output_base: None,
            security_group_log_rate_limit: None,
            security_group_log_burst_limit: 25,
            firewall_group_log_output_base: None,
            firewall_group_log_rate_limit: None,
            firewall_group_log_burst_limit: Some(25),
            rabbit_user: "neutron".to_string(),
            rabbit_vhost: "openstack".to_string(),
            use_syslog: false,
            verbose: false,
            debug: false,
        }
    }
}

/// Treat empty and whitespace only option strings like unset options.
pub(crate) fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl CharmConfig {
    /// `data-port`, if set.
    #[must_use]
    pub fn data_port(&self) -> Option<&str> {
        non_empty(self.data_port.as_ref())
    }

    /// `dpdk-bond-mappings`, if set.
    #[must_use]
    pub fn dpdk_bond_mappings(&self) -> Option<&str> {
        non_empty(self.dpdk_bond_mappings.as_ref())
    }

    /// `bridge-mappings`, if set.
    #[must_use]
    pub fn bridge_mappings(&self) -> Option<&str> {
        non_empty(self.bridge_mappings.as_ref())
    }

    /// `ipfix-target`, if set.
    #[must_use]
    pub fn ipfix_target(&self) -> Option<&str> {
        non_empty(self.ipfix_target.as_ref())
    }

    /// `ext-port`, if set.
    #[must_use]
    pub fn ext_port(&self) -> Option<&str> {
        non_empty(self.ext_port.as_ref())
    }
}
