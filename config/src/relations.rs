// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Relation data published by related applications.

use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings published by one remote unit.
pub type UnitData = OrderMap<String, String>;

/// Relation data, by interface name, one entry per remote unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Relations(OrderMap<String, Vec<UnitData>>);

impl Relations {
    pub const NEUTRON_PLUGIN: &'static str = "neutron-plugin";
    pub const NEUTRON_PLUGIN_API: &'static str = "neutron-plugin-api";
    pub const NEUTRON_CONTROL: &'static str = "neutron-control";
    pub const AMQP: &'static str = "amqp";
    pub const ZEROMQ: &'static str = "zeromq-configuration";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the data of one more remote unit on `interface`.
    pub fn add_unit(&mut self, interface: &str, data: UnitData) {
        self.0.entry(interface.to_string()).or_default().push(data);
    }

    /// Units related over `interface`, in relation order.
    #[must_use]
    pub fn units(&self, interface: &str) -> &[UnitData] {
        self.0.get(interface).map_or(&[], Vec::as_slice)
    }

    /// First non empty value of `key` published by a unit on `interface`.
    #[must_use]
    pub fn first(&self, interface: &str, key: &str) -> Option<&str> {
        self.units(interface)
            .iter()
            .filter_map(|unit| unit.get(key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }

    /// True when at least one unit is related over `interface`.
    #[must_use]
    pub fn is_related(&self, interface: &str) -> bool {
        !self.units(interface).is_empty()
    }
}

/// Interpret the usual relation encodings of a boolean.
#[must_use]
pub fn bool_from_string(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "t" | "on" => Some(true),
        "n" | "no" | "false" | "f" | "off" => Some(false),
        _ => None,
    }
}

/// Settings published by neutron-api over the `neutron-plugin-api` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutronApiSettings {
    pub l2_population: bool,
    pub enable_dvr: bool,
    pub enable_l3ha: bool,
    pub neutron_security_groups: bool,
    pub enable_nsg_logging: bool,
    pub enable_nfg_logging: bool,
    pub overlay_network_type: String,
    pub network_device_mtu: Option<u32>,
    pub global_physnet_mtu: u32,
    pub polling_interval: u32,
    pub rpc_response_timeout: u32,
    pub report_interval: u32,
    pub dns_domain: Option<String>,
    pub extension_drivers: Option<String>,
    pub l3_extension_plugins: Vec<String>,
    pub region: Option<String>,
}

impl Default for NeutronApiSettings {
    fn default() -> Self {
        Self {
            l2_population: false,
            enable_dvr: false,
            enable_l3ha: false,
            neutron_security_groups: false,
            enable_nsg_logging: false,
            enable_nfg_logging: false,
            overlay_network_type: "gre".to_string(),
            network_device_mtu: None,
            global_physnet_mtu: 1500,
            polling_interval: 2,
            rpc_response_timeout: 60,
            report_interval: 30,
            dns_domain: None,
            extension_drivers: None,
            l3_extension_plugins: vec![],
            region: None,
        }
    }
}

fn set_bool(target: &mut bool, unit: &UnitData, key: &str) {
    if let Some(raw) = unit.get(key) {
        match bool_from_string(raw) {
            Some(value) => *target = value,
            None => warn!("ignoring non boolean {key}={raw} from neutron-api"),
        }
    }
}

fn set_u32(target: &mut u32, unit: &UnitData, key: &str) {
    if let Some(raw) = unit.get(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("ignoring non numeric {key}={raw} from neutron-api"),
        }
    }
}

fn set_string(target: &mut Option<String>, unit: &UnitData, key: &str) {
    if let Some(raw) = unit.get(key).filter(|raw| !raw.is_empty()) {
        *target = Some(raw.clone());
    }
}

impl NeutronApiSettings {
    /// Collect neutron-api settings.
    ///
    /// Only units which have published `l2-population` are considered ready; later units
    /// override earlier ones.  Without any ready unit every setting keeps its default.
    #[must_use]
    pub fn from_relations(relations: &Relations) -> Self {
        let mut settings = Self::default();
        for unit in relations.units(Relations::NEUTRON_PLUGIN_API) {
            if !unit.contains_key("l2-population") {
                debug!("skipping neutron-api unit which is not ready yet");
                continue;
            }
            set_bool(&mut settings.l2_population, unit, "l2-population");
            set_bool(&mut settings.enable_dvr, unit, "enable-dvr");
            set_bool(&mut settings.enable_l3ha, unit, "enable-l3ha");
            set_bool(
                &mut settings.neutron_security_groups,
                unit,
                "neutron-security-groups",
            );
            set_bool(&mut settings.enable_nsg_logging, unit, "enable-nsg-logging");
            set_bool(&mut settings.enable_nfg_logging, unit, "enable-nfg-logging");
            if let Some(overlay) = unit.get("overlay-network-type").filter(|s| !s.is_empty()) {
                settings.overlay_network_type.clone_from(overlay);
            }
            if let Some(raw) = unit.get("network-device-mtu") {
                settings.network_device_mtu = raw.trim().parse().ok();
            }
            set_u32(&mut settings.global_physnet_mtu, unit, "global-physnet-mtu");
            set_u32(&mut settings.polling_interval, unit, "polling-interval");
            set_u32(
                &mut settings.rpc_response_timeout,
                unit,
                "rpc-response-timeout",
            );
            set_u32(&mut settings.report_interval, unit, "report-interval");
            set_string(&mut settings.dns_domain, unit, "dns-domain");
            set_string(&mut settings.extension_drivers, unit, "extension-drivers");
            set_string(&mut settings.region, unit, "region");
            if let Some(plugins) = unit.get("l3-extension-plugins") {
                settings.l3_extension_plugins = plugins
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
        }
        settings
    }
}
