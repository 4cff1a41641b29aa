// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Parsers for the whitespace separated `left:right` mapping options.

use hardware::{Mac, NetDevice, PciAddress};
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};

/// Bridge used for the port-only form of `data-port`.
pub const DEFAULT_DATA_BRIDGE: &str = "br-data";

/// Ordered `port -> bridge` (or `mac -> bond`) mapping.
///
/// Tokens read `<bridge>:<port>`, split at the *first* colon, with the port as the key.  The
/// port is frequently a MAC address, which itself contains colons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMapping(OrderMap<String, String>);

/// Ordered `pci address -> bridge or bond` mapping of devices resolved for DPDK.
pub type ResolvedDeviceMap = OrderMap<PciAddress, String>;

impl PortMapping {
    /// Parse a mapping option.  Tokens without a colon are skipped; when nothing parses at all
    /// the first token is taken as a port on [`DEFAULT_DATA_BRIDGE`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut mapping = OrderMap::new();
        for token in value.split_whitespace() {
            if let Some((bridge, port)) = token.split_once(':') {
                mapping.insert(port.trim().to_string(), bridge.trim().to_string());
            }
        }
        if mapping.is_empty() {
            if let Some(first) = value.split_whitespace().next() {
                mapping.insert(first.to_string(), DEFAULT_DATA_BRIDGE.to_string());
            }
        }
        Self(mapping)
    }

    /// Parse an optional option value; unset is empty.
    #[must_use]
    pub fn parse_option(value: Option<&str>) -> Self {
        value.map(Self::parse).unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, port: &str) -> Option<&str> {
        self.0.get(port).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, port: &str) -> bool {
        self.0.contains_key(port)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(port, bridge)` pairs in option order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Translate MAC keys to the kernel interface names carrying them.
    ///
    /// Keys which are not MACs are kept as they are.  MACs matching no visible device are
    /// dropped.
    #[must_use]
    pub fn resolve_port_names(&self, devices: &[NetDevice]) -> OrderMap<String, String> {
        self.iter()
            .filter_map(|(port, bridge)| {
                let name = match Mac::try_from(port) {
                    Ok(mac) => devices
                        .iter()
                        .find(|device| device.mac == mac)?
                        .interface_name
                        .clone(),
                    Err(_) => port.to_string(),
                };
                Some((name, bridge.to_string()))
            })
            .collect()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for PortMapping {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Parse `bridge-mappings` (`<physnet>:<bridge>` tokens) into `physnet -> bridge`.
#[must_use]
pub fn parse_bridge_mappings(value: Option<&str>) -> OrderMap<String, String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|token| token.split_once(':'))
        .map(|(physnet, bridge)| (physnet.to_string(), bridge.to_string()))
        .collect()
}

/// Interfaces named by `sriov-device-mappings` (`<physnet>:<interface>` tokens).
#[must_use]
pub fn sriov_interfaces(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|token| token.split_once(':'))
        .map(|(_, interface)| interface.to_string())
        .collect()
}
