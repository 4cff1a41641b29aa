// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-pass system snapshot.

use std::path::Path;

use derive_builder::Builder;
use hardware::NetDevice;
use hardware::numa::NumaNode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mapping::ResolvedDeviceMap;
use crate::relations::{NeutronApiSettings, Relations};
use crate::release::{HostRelease, OpenStackRelease, OvsVersion, Release};
use crate::{CharmConfig, ConfigError};

/// Facts about the host gathered before any decision is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostFacts {
    /// Devices resolved for DPDK use (bridge and bond mappings, bonds winning).
    pub resolved_devices: ResolvedDeviceMap,
    /// Kernel visible network devices.
    pub net_devices: Vec<NetDevice>,
    /// Linux bridges present on the host.
    pub linux_bridges: Vec<String>,
    /// NUMA nodes ordered by id.
    pub numa_nodes: Vec<NumaNode>,
    /// Logical CPU count.
    pub cpu_count: usize,
    /// Metadata proxy shared secret.
    pub shared_secret: Option<String>,
    /// Address used on the `neutron-plugin` relation.
    pub host_ip: Option<String>,
    /// Address used for tunnel endpoints.
    pub local_ip: Option<String>,
    /// Fully qualified host name, if one could be determined.
    pub fqdn: Option<String>,
    /// Set on first install from stein onward; switches the agent `host` option to the FQDN.
    pub use_fqdn: bool,
}

/// Everything a reconciliation pass consults.
#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct SystemState {
    #[builder(default)]
    pub config: CharmConfig,
    #[builder(default)]
    pub relations: Relations,
    /// Installed OpenStack release.  Absent compares below every release.
    #[builder(default)]
    pub os_release: Release<OpenStackRelease>,
    #[builder(default)]
    pub host_release: Release<HostRelease>,
    /// Installed Open vSwitch; absent means no runtime DPDK features.
    #[builder(default)]
    pub ovs_version: Option<OvsVersion>,
    #[builder(default)]
    pub host: HostFacts,
    /// Unit is paused; services must not be restarted.
    #[builder(default)]
    pub paused: bool,
}

/// Feature switches derived from a [`SystemState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub use_dvr: bool,
    pub use_l3ha: bool,
    pub enable_local_dhcp: bool,
    pub enable_sriov: bool,
    pub use_dpdk: bool,
    pub ovs_late_dpdk_init: bool,
    pub ovs_vhostuser_client: bool,
    pub os_release: Release<OpenStackRelease>,
    pub host_release: Release<HostRelease>,
}

impl FeatureFlags {
    /// OVS datapath for every managed bridge.
    #[must_use]
    pub fn datapath_type(&self) -> &'static str {
        if self.use_dpdk { "netdev" } else { "system" }
    }
}

impl SystemState {
    /// Settings published by neutron-api.
    #[must_use]
    pub fn neutron_api(&self) -> NeutronApiSettings {
        NeutronApiSettings::from_relations(&self.relations)
    }

    /// Derive the feature switches of this pass.
    #[must_use]
    pub fn flags(&self) -> FeatureFlags {
        let api = self.neutron_api();
        let flags = FeatureFlags {
            use_dvr: api.enable_dvr,
            use_l3ha: api.enable_l3ha,
            enable_local_dhcp: self.config.enable_local_dhcp_and_metadata,
            enable_sriov: self.config.enable_sriov && self.os_release >= OpenStackRelease::Kilo,
            use_dpdk: self.config.enable_dpdk && self.os_release >= OpenStackRelease::Mitaka,
            ovs_late_dpdk_init: self
                .ovs_version
                .is_some_and(|v| v >= OvsVersion::LATE_DPDK_INIT),
            ovs_vhostuser_client: self
                .ovs_version
                .is_some_and(|v| v >= OvsVersion::VHOSTUSER_CLIENT),
            os_release: self.os_release.clone(),
            host_release: self.host_release.clone(),
        };
        debug!("feature flags: {flags:?}");
        flags
    }
}

/// On-disk description of one pass, as read by the operator binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StateFile {
    pub config: CharmConfig,
    pub relations: Relations,
    pub os_release: Option<String>,
    pub host_release: Option<String>,
    pub ovs_version: Option<OvsVersion>,
    pub host: HostFacts,
    pub paused: bool,
}

impl StateFile {
    /// Read a state file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml_ng::from_str(&text)?)
    }

    /// Start a [`SystemStateBuilder`] from the file's contents; host facts may still be added.
    #[must_use]
    pub fn into_builder(self) -> SystemStateBuilder {
        let mut builder = SystemStateBuilder::default();
        builder
            .config(self.config)
            .relations(self.relations)
            .os_release(Release::from_option(self.os_release.as_deref()))
            .host_release(Release::from_option(self.host_release.as_deref()))
            .ovs_version(self.ovs_version)
            .host(self.host)
            .paused(self.paused);
        builder
    }
}

impl SystemStateBuilder {
    /// Build, reporting a missing field as a [`ConfigError`].
    pub fn finish(&self) -> Result<SystemState, ConfigError> {
        self.build()
            .map_err(|e| ConfigError::Incomplete(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::UnitData;

    fn neutron_api(pairs: &[(&str, &str)]) -> Relations {
        let unit: UnitData = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut relations = Relations::new();
        relations.add_unit(Relations::NEUTRON_PLUGIN_API, unit);
        relations
    }

    #[test]
    fn release_gates_on_flags() {
        let config = CharmConfig {
            enable_dpdk: true,
            enable_sriov: true,
            ..CharmConfig::default()
        };
        let liberty = SystemStateBuilder::default()
            .config(config.clone())
            .os_release(Release::from(OpenStackRelease::Liberty))
            .finish()
            .unwrap()
            .flags();
        assert!(liberty.enable_sriov);
        assert!(!liberty.use_dpdk);
        let juno = SystemStateBuilder::default()
            .config(config.clone())
            .os_release(Release::from(OpenStackRelease::Juno))
            .finish()
            .unwrap()
            .flags();
        assert!(!juno.enable_sriov);
        let mitaka = SystemStateBuilder::default()
            .config(config)
            .os_release(Release::from(OpenStackRelease::Mitaka))
            .ovs_version(OvsVersion::new(2, 6, 1))
            .finish()
            .unwrap()
            .flags();
        assert!(mitaka.use_dpdk);
        assert!(mitaka.ovs_late_dpdk_init);
        assert!(!mitaka.ovs_vhostuser_client);
        assert_eq!(mitaka.datapath_type(), "netdev");
    }

    #[test]
    fn dvr_and_l3ha_come_from_neutron_api() {
        let state = SystemStateBuilder::default()
            .relations(neutron_api(&[
                ("l2-population", "False"),
                ("enable-dvr", "True"),
                ("enable-l3ha", "True"),
            ]))
            .finish()
            .unwrap();
        let flags = state.flags();
        assert!(flags.use_dvr);
        assert!(flags.use_l3ha);
        assert!(!flags.use_dpdk);
        assert_eq!(flags.datapath_type(), "system");
    }

    #[test]
    fn state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        std::fs::write(
            &path,
            "config:\n  enable-dpdk: true\n  data-port: br-ex:fe:ed:be:ef:00:01\n\
             relations:\n  neutron-plugin-api:\n    - l2-population: 'True'\n      enable-dvr: 'True'\n\
             os-release: queens\nhost-release: bionic\novs-version: 2.9.0\n\
             host:\n  cpu-count: 8\n",
        )
        .unwrap();
        let state = StateFile::load(&path).unwrap().into_builder().finish().unwrap();
        assert!(state.config.enable_dpdk);
        assert_eq!(state.os_release, OpenStackRelease::Queens);
        assert_eq!(state.host_release, HostRelease::Bionic);
        assert_eq!(state.host.cpu_count, 8);
        let flags = state.flags();
        assert!(flags.use_dvr && flags.use_dpdk && flags.ovs_vhostuser_client);
    }
}
