// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Template contexts.
//!
//! Every managed file is rendered from the merged output of a list of [`ContextGenerator`]s.
//! Generators are pure functions of a [`SystemState`]; the only host access left is the check
//! that a requested log file location is usable.

use std::path::Path;

use config::{HostRelease, OpenStackRelease, PortMapping, Relations, Release, SystemState};
use hardware::Mac;
use ordermap::OrderMap;
use serde::Serialize;
use serde_yaml_ng::Value;
use tracing::{debug, warn};

use dpdk::eal;

pub const IPTABLES_HYBRID: &str = "iptables_hybrid";
pub const OPENVSWITCH: &str = "openvswitch";

const NFG_LOG_RATE_LIMIT_MIN: u32 = 100;
const NFG_LOG_BURST_LIMIT_MIN: u32 = 25;
const DEFAULT_WORKER_MULTIPLIER: f64 = 2.0;
const RABBITMQ_PORT: u16 = 5672;

/// Key/value data handed to a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(OrderMap<String, Value>);

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Insert `value`, or null when absent.
    pub fn insert_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        self.0
            .insert(key.to_string(), value.map_or(Value::Null, Into::into));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Shorthand for string valued keys.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merge `other` into `self`; keys of `other` win.
    pub fn merge(&mut self, other: Context) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The context sources a managed file can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextGenerator {
    /// ML2/OVS agent settings.
    OvsPlugin,
    /// `restart-trigger*` values published on the given interfaces.
    RemoteRestart(&'static [&'static str]),
    /// RabbitMQ connection.
    Amqp,
    /// ZeroMQ messaging settings.
    ZeroMq,
    /// Whether notifications are sent.
    NotificationDriver,
    /// Agent `host` override once FQDNs are in use.
    HostIp,
    /// Availability zone of the principal.
    Zone,
    /// DPDK EAL options for `/etc/default/openvswitch-switch`.
    OvsDpdkDevice,
    /// Devices and driver for `/etc/dpdk/interfaces`.
    DpdkDevice,
    /// MTU applied to the data port NICs.
    PhyNicMtu,
    /// Metadata proxy shared secret.
    SharedSecret,
    /// Keystone credentials relayed by neutron-api.
    ApiIdentity,
    /// API worker count.
    WorkerConfig,
    DhcpAgent,
    L3Agent,
    /// External network port (DVR).
    ExternalPort,
}

impl ContextGenerator {
    /// Interfaces whose units may publish restart triggers for the agent.
    pub const RESTART_INTERFACES: &'static [&'static str] =
        &[Relations::NEUTRON_PLUGIN, Relations::NEUTRON_CONTROL];

    /// Compute this generator's context.
    #[must_use]
    pub fn generate(&self, state: &SystemState) -> Context {
        let context = match self {
            Self::OvsPlugin => ovs_plugin(state),
            Self::RemoteRestart(interfaces) => remote_restart(&state.relations, interfaces),
            Self::Amqp => amqp(state),
            Self::ZeroMq => zeromq(&state.relations),
            Self::NotificationDriver => notification_driver(&state.relations),
            Self::HostIp => host_ip(state),
            Self::Zone => zone(&state.relations),
            Self::OvsDpdkDevice => ovs_dpdk_device(state),
            Self::DpdkDevice => dpdk_device(state),
            Self::PhyNicMtu => phy_nic_mtu(state),
            Self::SharedSecret => shared_secret(state),
            Self::ApiIdentity => api_identity(&state.relations),
            Self::WorkerConfig => worker_config(state),
            Self::DhcpAgent => dhcp_agent(state),
            Self::L3Agent => l3_agent(state),
            Self::ExternalPort => external_port(state),
        };
        debug!("{self:?} produced {} keys", context.len());
        context
    }
}

fn comma_joined(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.split_whitespace().collect::<Vec<_>>().join(","))
}

/// Accept a log file location only if its directory exists and it is not itself a directory;
/// `None` means logging goes to syslog.
#[must_use]
pub fn validate_log_path(kind: &str, desired: Option<&str>) -> Option<String> {
    let desired = desired.map(str::trim).filter(|d| !d.is_empty())?;
    let path = Path::new(desired);
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    if !dir.exists() {
        warn!(
            "desired {kind} log directory {} does not exist, falling back to syslog",
            dir.display()
        );
        return None;
    }
    if path.is_dir() {
        warn!("desired {kind} log path {desired} is a directory, falling back to syslog");
        return None;
    }
    Some(desired.to_string())
}

/// Firewall driver actually used by the agent.
#[must_use]
pub fn firewall_driver(
    configured: Option<&str>,
    host: &Release<HostRelease>,
    nsg_logging: bool,
) -> &'static str {
    let driver = match configured.map(str::trim) {
        None | Some("") => IPTABLES_HYBRID,
        Some(IPTABLES_HYBRID) => IPTABLES_HYBRID,
        Some(OPENVSWITCH) => OPENVSWITCH,
        Some(other) => {
            warn!("unknown firewall driver {other}, using {IPTABLES_HYBRID}");
            return IPTABLES_HYBRID;
        }
    };
    if driver == IPTABLES_HYBRID && nsg_logging {
        warn!("security group logging needs the {OPENVSWITCH} firewall driver, it stays off");
    }
    if driver == OPENVSWITCH && *host < HostRelease::Xenial {
        return IPTABLES_HYBRID;
    }
    driver
}

fn ovs_plugin(state: &SystemState) -> Context {
    let config = &state.config;
    let api = state.neutron_api();
    let mut ctx = Context::new();
    ctx.insert("neutron_plugin", "ovs");
    ctx.insert("core_plugin", "neutron.plugins.ml2.plugin.Ml2Plugin");
    ctx.insert("network_manager", "neutron");
    ctx.insert("config", crate::paths::ML2_CONF);
    if let Some(local_ip) = &state.host.local_ip {
        ctx.insert("local_ip", local_ip.as_str());
    }
    ctx.insert(
        "neutron_security_groups",
        !config.disable_security_groups && api.neutron_security_groups,
    );
    ctx.insert("l2_population", api.l2_population);
    ctx.insert("distributed_routing", api.enable_dvr);
    ctx.insert_opt("extension_drivers", api.extension_drivers.clone());
    ctx.insert("overlay_network_type", api.overlay_network_type.as_str());
    ctx.insert("polling_interval", api.polling_interval);
    ctx.insert("rpc_response_timeout", api.rpc_response_timeout);
    ctx.insert("report_interval", api.report_interval);
    ctx.insert("use_syslog", config.use_syslog);
    ctx.insert("verbose", config.verbose);
    ctx.insert("debug", config.debug);
    ctx.insert("prevent_arp_spoofing", config.prevent_arp_spoofing);
    ctx.insert("enable_dpdk", config.enable_dpdk);
    if let Some(mtu) = api.network_device_mtu {
        ctx.insert("network_device_mtu", mtu);
        ctx.insert("veth_mtu", mtu);
    }
    if let Some(mappings) = comma_joined(config.bridge_mappings()) {
        ctx.insert("bridge_mappings", mappings);
    }
    if let Some(mappings) = comma_joined(config.sriov_device_mappings.as_deref()) {
        ctx.insert("sriov_device_mappings", mappings);
    }
    if config.enable_sriov {
        ctx.insert("enable_sriov", true);
    }
    let numvfs = config.sriov_numvfs.trim();
    if !numvfs.is_empty() {
        if numvfs == "auto" || numvfs.parse::<u32>().is_ok() {
            ctx.insert("sriov_vfs_blanket", numvfs);
        } else {
            ctx.insert("sriov_vfs_list", numvfs);
        }
    }
    if let Some(providers) = comma_joined(config.flat_network_providers.as_deref()) {
        ctx.insert("network_providers", providers);
    }
    if let Some(ranges) = comma_joined(config.vlan_ranges.as_deref()) {
        ctx.insert("vlan_ranges", ranges);
    }
    ctx.insert_opt(
        "nsg_log_output_base",
        validate_log_path("NSG", config.security_group_log_output_base.as_deref()),
    );
    ctx.insert_opt("nsg_log_rate_limit", config.security_group_log_rate_limit);
    ctx.insert("nsg_log_burst_limit", config.security_group_log_burst_limit);
    let driver = firewall_driver(
        config.firewall_driver.as_deref(),
        &state.host_release,
        api.enable_nsg_logging,
    );
    ctx.insert("firewall_driver", driver);
    ctx.insert(
        "enable_nsg_logging",
        api.enable_nsg_logging && driver == OPENVSWITCH,
    );
    ctx
}

/// Collect `restart-trigger*` keys from every unit on `interfaces`; several values for one key
/// are sorted and joined with `-`.
fn remote_restart(relations: &Relations, interfaces: &[&str]) -> Context {
    let mut triggers: OrderMap<String, Vec<String>> = OrderMap::new();
    for interface in interfaces {
        for unit in relations.units(interface) {
            for (key, value) in unit {
                if key.starts_with("restart-trigger") {
                    triggers
                        .entry(key.replace('-', "_"))
                        .or_default()
                        .push(value.clone());
                }
            }
        }
    }
    let mut ctx = Context::new();
    for (key, mut values) in triggers {
        values.sort();
        ctx.insert(&key, values.join("-"));
    }
    ctx
}

fn amqp(state: &SystemState) -> Context {
    let config = &state.config;
    let mut hosts = vec![];
    let mut password = None;
    for unit in state.relations.units(Relations::AMQP) {
        let Some(unit_password) = unit.get("password").filter(|p| !p.is_empty()) else {
            continue;
        };
        password.get_or_insert_with(|| unit_password.clone());
        let clustered = unit.get("clustered").is_some_and(|c| !c.is_empty());
        let host = (if clustered { unit.get("vip") } else { None })
            .or_else(|| unit.get("hostname"))
            .or_else(|| unit.get("private-address"))
            .filter(|h| !h.is_empty());
        if let Some(host) = host {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
    }
    let mut ctx = Context::new();
    let (Some(password), Some(first)) = (password, hosts.first()) else {
        debug!("amqp relation is not complete");
        return ctx;
    };
    ctx.insert("rabbitmq_host", first.as_str());
    ctx.insert("rabbitmq_user", config.rabbit_user.as_str());
    ctx.insert("rabbitmq_password", password.as_str());
    ctx.insert("rabbitmq_virtual_host", config.rabbit_vhost.as_str());
    if hosts.len() > 1 {
        let mut sorted = hosts.clone();
        sorted.sort();
        ctx.insert("rabbitmq_hosts", sorted.join(","));
    }
    let endpoints: Vec<String> = hosts
        .iter()
        .map(|host| format!("{}:{password}@{host}:{RABBITMQ_PORT}", config.rabbit_user))
        .collect();
    ctx.insert(
        "transport_url",
        format!("rabbit://{}/{}", endpoints.join(","), config.rabbit_vhost),
    );
    ctx
}

fn zeromq(relations: &Relations) -> Context {
    let mut ctx = Context::new();
    let interface = Relations::ZEROMQ;
    if let Some(nonce) = relations.first(interface, "nonce") {
        ctx.insert("zmq_nonce", nonce);
        ctx.insert_opt("zmq_host", relations.first(interface, "host"));
        ctx.insert_opt(
            "zmq_redis_address",
            relations.first(interface, "zmq_redis_address"),
        );
    }
    ctx
}

fn notification_driver(relations: &Relations) -> Context {
    let mut ctx = Context::new();
    let enabled = if relations.is_related(Relations::AMQP) {
        "True"
    } else {
        "False"
    };
    ctx.insert("notifications", enabled);
    ctx
}

fn host_ip(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    let host = &state.host;
    if host.use_fqdn && state.os_release >= OpenStackRelease::Stein && host.host_ip.is_some() {
        match &host.fqdn {
            Some(fqdn) if fqdn.contains('.') => ctx.insert("host", fqdn.as_str()),
            _ => debug!("no fully qualified name for this host, keeping the default agent host"),
        }
    }
    ctx
}

fn zone(relations: &Relations) -> Context {
    let mut ctx = Context::new();
    let zone = relations
        .units(Relations::NEUTRON_PLUGIN)
        .first()
        .and_then(|unit| unit.get("default_availability_zone"))
        .filter(|zone| !zone.is_empty());
    if let Some(zone) = zone {
        ctx.insert("availability_zone", zone.as_str());
    }
    ctx
}

fn ovs_dpdk_device(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    let devices = &state.host.resolved_devices;
    if devices.is_empty() {
        return ctx;
    }
    let nodes = &state.host.numa_nodes;
    ctx.insert("dpdk_enabled", state.config.enable_dpdk);
    ctx.insert("device_whitelist", eal::device_whitelist(devices));
    ctx.insert(
        "socket_memory",
        eal::socket_memory(nodes, state.config.dpdk_socket_memory),
    );
    ctx.insert(
        "cpu_mask",
        eal::cpu_mask(nodes, state.config.dpdk_socket_cores),
    );
    ctx
}

fn dpdk_device(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    let Some(driver) = state.config.dpdk_driver.as_deref() else {
        return ctx;
    };
    let devices: serde_yaml_ng::Mapping = state
        .host
        .resolved_devices
        .iter()
        .map(|(pci, target)| (Value::from(pci.to_string()), Value::from(target.as_str())))
        .collect();
    ctx.insert("devices", devices);
    ctx.insert("driver", driver);
    ctx
}

fn phy_nic_mtu(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    let ports = PortMapping::parse_option(state.config.data_port())
        .resolve_port_names(&state.host.net_devices);
    let mut names: Vec<&str> = ports.keys().map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        return ctx;
    }
    if let Some(mtu) = state.neutron_api().network_device_mtu {
        ctx.insert("devs", names.join("\\n"));
        ctx.insert("mtu", mtu);
    }
    ctx
}

fn shared_secret(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    if state.neutron_api().enable_dvr || state.config.enable_local_dhcp_and_metadata {
        match &state.host.shared_secret {
            Some(secret) => ctx.insert("shared_secret", secret.as_str()),
            None => warn!("metadata proxy needs a shared secret but none was provided"),
        }
    }
    ctx
}

const IDENTITY_REQUIRED: [&str; 7] = [
    "service_host",
    "service_port",
    "auth_host",
    "auth_port",
    "service_tenant",
    "service_username",
    "service_password",
];

/// Keystone credentials from the first `neutron-plugin-api` unit publishing a complete set, plus
/// the first region found.
fn api_identity(relations: &Relations) -> Context {
    let mut ctx = Context::new();
    let units = relations.units(Relations::NEUTRON_PLUGIN_API);
    let Some(unit) = units.iter().find(|unit| {
        IDENTITY_REQUIRED
            .iter()
            .all(|key| unit.get(*key).is_some_and(|v| !v.is_empty()))
    }) else {
        return ctx;
    };
    let get = |key: &str| unit.get(key).map_or("", String::as_str);
    let or = |key: &str, default: &'static str| {
        unit.get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    };
    ctx.insert("service_protocol", or("service_protocol", "http"));
    ctx.insert("service_host", get("service_host"));
    ctx.insert("service_port", get("service_port"));
    ctx.insert("auth_protocol", or("auth_protocol", "http"));
    ctx.insert("auth_host", get("auth_host"));
    ctx.insert("auth_port", get("auth_port"));
    ctx.insert("admin_tenant_name", get("service_tenant"));
    ctx.insert("admin_user", get("service_username"));
    ctx.insert("admin_password", get("service_password"));
    ctx.insert("api_version", or("api_version", "2.0"));
    ctx.insert_opt("region", relations.first(Relations::NEUTRON_PLUGIN_API, "region"));
    ctx
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn worker_config(state: &SystemState) -> Context {
    let multiplier = state
        .config
        .worker_multiplier
        .unwrap_or(DEFAULT_WORKER_MULTIPLIER);
    let mut workers = (state.host.cpu_count as f64 * multiplier).floor().max(0.0) as u64;
    if multiplier > 0.0 && workers == 0 {
        workers = 1;
    }
    let mut ctx = Context::new();
    ctx.insert("workers", workers);
    ctx
}

/// `k1=v1, k2=v2` flags; a token without `=` continues the previous value.
#[must_use]
pub fn config_flags_parser(flags: &str) -> serde_yaml_ng::Mapping {
    let mut parsed: OrderMap<String, String> = OrderMap::new();
    let mut last: Option<String> = None;
    for token in flags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some((key, value)) = token.split_once('=') {
            let key = key.trim().to_string();
            parsed.insert(key.clone(), value.trim().to_string());
            last = Some(key);
        } else if let Some(value) = last.as_ref().and_then(|key| parsed.get_mut(key)) {
            value.push(',');
            value.push_str(token);
        } else {
            warn!("ignoring flag without a value: {token}");
        }
    }
    parsed
        .into_iter()
        .map(|(k, v)| (Value::from(k), Value::from(v)))
        .collect()
}

fn dhcp_agent(state: &SystemState) -> Context {
    let config = &state.config;
    let mut ctx = zone(&state.relations);
    if let Some(flags) = config.dnsmasq_flags.as_deref().filter(|f| !f.trim().is_empty()) {
        ctx.insert("dnsmasq_flags", config_flags_parser(flags));
    }
    ctx.insert_opt("dns_servers", config.dns_servers.clone());
    if let Some(domain) = state.neutron_api().dns_domain {
        ctx.insert("dns_domain", domain);
    }
    ctx.insert_opt("instance_mtu", config.instance_mtu);
    ctx
}

fn l3_agent(state: &SystemState) -> Context {
    let config = &state.config;
    let api = state.neutron_api();
    let mut ctx = Context::new();
    if api.enable_dvr {
        let mode = if config.use_dvr_snat { "dvr_snat" } else { "dvr" };
        ctx.insert("agent_mode", mode);
        ctx.insert("use_l3ha", api.enable_l3ha);
        if config.ext_port().is_none() {
            ctx.insert("external_configuration_new", true);
        }
    } else {
        ctx.insert("agent_mode", "legacy");
    }
    ctx.insert("enable_nfg_logging", api.enable_nfg_logging);
    ctx.insert_opt(
        "nfg_log_output_base",
        validate_log_path("NFG", config.firewall_group_log_output_base.as_deref()),
    );
    ctx.insert_opt(
        "nfg_log_rate_limit",
        config
            .firewall_group_log_rate_limit
            .map(|limit| limit.max(NFG_LOG_RATE_LIMIT_MIN)),
    );
    ctx.insert_opt(
        "nfg_log_burst_limit",
        config
            .firewall_group_log_burst_limit
            .map(|limit| limit.max(NFG_LOG_BURST_LIMIT_MIN)),
    );
    let mut plugins = api.l3_extension_plugins.clone();
    if state.os_release >= OpenStackRelease::Stein {
        plugins.push("fwaas_v2".to_string());
        if api.enable_nfg_logging {
            plugins.push("fwaas_v2_log".to_string());
        }
    }
    ctx.insert("l3_extension_plugins", plugins.join(","));
    ctx
}

fn external_port(state: &SystemState) -> Context {
    let mut ctx = Context::new();
    let Some(ports) = state.config.ext_port() else {
        return ctx;
    };
    let resolved = ports.split_whitespace().find_map(|port| match Mac::try_from(port) {
        Ok(mac) => state
            .host
            .net_devices
            .iter()
            .find(|device| device.mac == mac)
            .map(|device| device.interface_name.clone()),
        Err(_) => Some(port.to_string()),
    });
    if let Some(port) = resolved {
        ctx.insert("ext_port", port);
        if let Some(mtu) = state.neutron_api().network_device_mtu {
            ctx.insert("ext_port_mtu", mtu);
        }
    }
    ctx
}
