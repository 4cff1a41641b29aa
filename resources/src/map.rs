// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The resource map: which files the charm manages, which services each file restarts, and
//! which contexts render it.

use config::{FeatureFlags, HostRelease, OpenStackRelease, SystemState};
use ordermap::{OrderMap, OrderSet};
use tracing::debug;

use crate::context::{Context, ContextGenerator};
use crate::paths::{
    DPDK_INTERFACES, EXT_PORT_CONF, ML2_CONF, NEUTRON_CONF, NEUTRON_DHCP_AGENT_CONF,
    NEUTRON_DNSMASQ_CONF, NEUTRON_FWAAS_CONF, NEUTRON_L3_AGENT_CONF, NEUTRON_METADATA_AGENT_CONF,
    NEUTRON_SRIOV_AGENT_CONF, NEUTRON_SRIOV_INIT_DEFAULT, NEUTRON_SRIOV_UPSTART_CONF, OVS_CONF,
    OVS_DEFAULT, PHY_NIC_MTU_CONF, PHY_NIC_MTU_SERVICE,
};

pub const LEGACY_OVS_AGENT: &str = "neutron-plugin-openvswitch-agent";
pub const OVS_AGENT: &str = "neutron-openvswitch-agent";
pub const METADATA_AGENT: &str = "neutron-metadata-agent";
pub const L3_AGENT: &str = "neutron-l3-agent";
pub const DHCP_AGENT: &str = "neutron-dhcp-agent";
pub const LEGACY_SRIOV_AGENT: &str = "neutron-plugin-sriov-agent";
pub const SRIOV_AGENT: &str = "neutron-sriov-agent";

/// Name of the SR-IOV agent service (and package); the `-plugin-` prefix was dropped in mitaka.
#[must_use]
pub fn sriov_agent_name(flags: &FeatureFlags) -> &'static str {
    if flags.os_release < OpenStackRelease::Mitaka {
        LEGACY_SRIOV_AGENT
    } else {
        SRIOV_AGENT
    }
}

/// One managed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    /// Services restarted when the file changes.
    pub services: OrderSet<String>,
    /// Context sources, merged in order.
    pub contexts: Vec<ContextGenerator>,
}

impl Resource {
    fn new(services: &[&str], contexts: &[ContextGenerator]) -> Self {
        Self {
            services: services.iter().map(ToString::to_string).collect(),
            contexts: contexts.to_vec(),
        }
    }

    /// Merge the output of every generator; later generators win on key clashes.
    #[must_use]
    pub fn context(&self, state: &SystemState) -> Context {
        let mut merged = Context::new();
        for generator in &self.contexts {
            merged.merge(generator.generate(state));
        }
        merged
    }
}

/// Ordered `path -> resource` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap(OrderMap<&'static str, Resource>);

/// Receives managed files for rendering.
pub trait ConfigRenderer {
    fn register(&mut self, path: &str, contexts: &[ContextGenerator]);
}

type Rule = fn(ResourceMap, &FeatureFlags) -> ResourceMap;

/// Applied in order to the base map.
const RULES: [(&str, Rule); 5] = [
    ("dvr", dvr_rule),
    ("local dhcp", local_dhcp_rule),
    ("release rename", release_rename_rule),
    ("sriov", sriov_rule),
    ("host managed mtu", host_mtu_rule),
];

impl ResourceMap {
    /// The files managed for every configuration before any rule is applied.
    #[must_use]
    pub fn base() -> Self {
        use ContextGenerator as G;
        let restart = G::RemoteRestart(G::RESTART_INTERFACES);
        Self(OrderMap::from_iter([
            (
                NEUTRON_CONF,
                Resource::new(
                    &[LEGACY_OVS_AGENT],
                    &[
                        G::OvsPlugin,
                        restart,
                        G::Amqp,
                        G::ZeroMq,
                        G::NotificationDriver,
                        G::HostIp,
                        G::Zone,
                    ],
                ),
            ),
            (ML2_CONF, Resource::new(&[LEGACY_OVS_AGENT], &[G::OvsPlugin])),
            (OVS_CONF, Resource::new(&[OVS_AGENT], &[G::OvsPlugin])),
            (
                OVS_DEFAULT,
                Resource::new(&["openvswitch-switch"], &[G::OvsDpdkDevice, restart]),
            ),
            (
                DPDK_INTERFACES,
                Resource::new(&["dpdk", "openvswitch-switch"], &[G::DpdkDevice]),
            ),
            (
                PHY_NIC_MTU_CONF,
                Resource::new(&[PHY_NIC_MTU_SERVICE], &[G::PhyNicMtu]),
            ),
        ]))
    }

    /// Compose the resource map for `flags`.
    #[must_use]
    pub fn build(flags: &FeatureFlags) -> Self {
        RULES.iter().fold(Self::base(), |map, (name, rule)| {
            let map = rule(map, flags);
            debug!("after {name} rule: {:?}", map.paths().collect::<Vec<_>>());
            map
        })
    }

    /// Insert or replace entries, keeping the position of replaced ones.
    fn update(mut self, other: impl IntoIterator<Item = (&'static str, Resource)>) -> Self {
        self.0.extend(other);
        self
    }

    fn drop_paths(mut self, paths: &[&str]) -> Self {
        for path in paths {
            self.0.remove(*path);
        }
        self
    }

    fn services_of(&mut self, path: &str) -> Option<&mut OrderSet<String>> {
        self.0.get_mut(path).map(|resource| &mut resource.services)
    }

    fn add_services(mut self, path: &str, services: &[&str]) -> Self {
        if let Some(set) = self.services_of(path) {
            set.extend(services.iter().map(ToString::to_string));
        }
        self
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.0.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Resource)> {
        self.0.iter().map(|(path, resource)| (*path, resource))
    }

    /// `path -> services`.
    #[must_use]
    pub fn restart_map(&self) -> OrderMap<&'static str, Vec<String>> {
        self.iter()
            .map(|(path, resource)| (path, resource.services.iter().cloned().collect()))
            .collect()
    }

    /// Every service named in the map, first appearance first, without the NIC MTU job.
    #[must_use]
    pub fn services(&self) -> OrderSet<String> {
        self.0
            .values()
            .flat_map(|resource| resource.services.iter())
            .filter(|service| *service != PHY_NIC_MTU_SERVICE)
            .cloned()
            .collect()
    }

    /// Hand every managed file and its contexts to `renderer`, in map order.
    pub fn register_configs(&self, renderer: &mut impl ConfigRenderer) {
        for (path, resource) in self.iter() {
            renderer.register(path, &resource.contexts);
        }
    }
}

fn metadata_map() -> [(&'static str, Resource); 1] {
    use ContextGenerator as G;
    [(
        NEUTRON_METADATA_AGENT_CONF,
        Resource::new(
            &[METADATA_AGENT],
            &[G::SharedSecret, G::ApiIdentity, G::WorkerConfig],
        ),
    )]
}

fn dvr_rule(map: ResourceMap, flags: &FeatureFlags) -> ResourceMap {
    use ContextGenerator as G;
    if !flags.use_dvr {
        return map;
    }
    map.update([
        (NEUTRON_L3_AGENT_CONF, Resource::new(&[L3_AGENT], &[G::L3Agent])),
        (NEUTRON_FWAAS_CONF, Resource::new(&[L3_AGENT], &[G::L3Agent])),
        (EXT_PORT_CONF, Resource::new(&[L3_AGENT], &[G::ExternalPort])),
    ])
    .update(metadata_map())
    .add_services(NEUTRON_CONF, &[METADATA_AGENT, L3_AGENT])
}

fn local_dhcp_rule(map: ResourceMap, flags: &FeatureFlags) -> ResourceMap {
    use ContextGenerator as G;
    if !flags.enable_local_dhcp {
        return map;
    }
    map.update(metadata_map())
        .update([
            (NEUTRON_DHCP_AGENT_CONF, Resource::new(&[DHCP_AGENT], &[G::DhcpAgent])),
            (NEUTRON_DNSMASQ_CONF, Resource::new(&[DHCP_AGENT], &[G::DhcpAgent])),
        ])
        .add_services(NEUTRON_CONF, &[METADATA_AGENT, DHCP_AGENT])
}

fn release_rename_rule(mut map: ResourceMap, flags: &FeatureFlags) -> ResourceMap {
    if flags.os_release < OpenStackRelease::Mitaka {
        return map.drop_paths(&[OVS_CONF, DPDK_INTERFACES]);
    }
    for resource in map.0.values_mut() {
        if resource.services.remove(LEGACY_OVS_AGENT) {
            resource.services.insert(OVS_AGENT.to_string());
        }
    }
    let map = map.drop_paths(&[ML2_CONF]);
    if !flags.use_dpdk {
        map.drop_paths(&[DPDK_INTERFACES, OVS_DEFAULT])
    } else if flags.ovs_late_dpdk_init {
        map.drop_paths(&[OVS_DEFAULT])
    } else {
        map
    }
}

fn sriov_rule(map: ResourceMap, flags: &FeatureFlags) -> ResourceMap {
    use ContextGenerator as G;
    if !flags.enable_sriov {
        return map;
    }
    let agent = sriov_agent_name(flags);
    map.update([
        (NEUTRON_SRIOV_AGENT_CONF, Resource::new(&[agent], &[G::OvsPlugin])),
        (NEUTRON_SRIOV_INIT_DEFAULT, Resource::new(&[], &[G::OvsPlugin])),
        (NEUTRON_SRIOV_UPSTART_CONF, Resource::new(&[], &[])),
    ])
    .add_services(NEUTRON_CONF, &[agent])
}

fn host_mtu_rule(map: ResourceMap, flags: &FeatureFlags) -> ResourceMap {
    if flags.host_release >= HostRelease::Xenial {
        map.drop_paths(&[EXT_PORT_CONF, PHY_NIC_MTU_CONF])
    } else {
        map
    }
}
