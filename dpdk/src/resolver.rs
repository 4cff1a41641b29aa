// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! MAC to PCI address resolution.

use config::{CharmConfig, PortMapping, ResolvedDeviceMap};
use hardware::{DeviceEnumerator, HardwareError, Mac, PciAddress, PciNetDevices};
use kvstore::{KvError, KvStore};
use tracing::{debug, info, warn};

/// Errors which abort device resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The live device inventory could not be read.
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    /// A binding could not be made durable.
    #[error(transparent)]
    Cache(#[from] KvError),
}

/// Resolves configured device MACs to PCI addresses.
///
/// Every binding observed on a live device is written to the cache and flushed before it is
/// used, so the binding survives the device being handed to DPDK (after which it no longer
/// appears in enumeration).  Cache entries are never removed.
pub struct DeviceResolver<'a, E, S> {
    enumerator: &'a E,
    cache: &'a mut S,
}

impl<'a, E: DeviceEnumerator, S: KvStore> DeviceResolver<'a, E, S> {
    pub fn new(enumerator: &'a E, cache: &'a mut S) -> Self {
        Self { enumerator, cache }
    }

    fn cached(&self, canonical: &str, raw: &str) -> Option<PciAddress> {
        let value = self.cache.get(canonical).or_else(|| self.cache.get(raw))?;
        match PciAddress::try_from(value.as_str()) {
            Ok(pci) => Some(pci),
            Err(e) => {
                warn!("ignoring cached binding {raw} -> {value}: {e}");
                None
            }
        }
    }

    /// Resolve every key of `mapping` to a PCI address.
    ///
    /// Keys which resolve to nothing are left out of the result.  If two keys resolve to the
    /// same PCI address the later target wins.
    ///
    /// # Errors
    ///
    /// Fails if the devices can not be enumerated or a new binding can not be flushed.
    pub fn resolve(&mut self, mapping: &PortMapping) -> Result<ResolvedDeviceMap, ResolveError> {
        let mut resolved = ResolvedDeviceMap::new();
        if mapping.is_empty() {
            return Ok(resolved);
        }
        let devices = PciNetDevices::scan(self.enumerator)?;
        for (key, target) in mapping.iter() {
            let mac = Mac::try_from(key).ok();
            let canonical = mac.map_or_else(|| key.to_string(), |mac| mac.to_string());
            if let Some(device) = mac.and_then(|mac| devices.get_device_from_mac(&mac)) {
                let pci = device.pci_address.to_string();
                if self.cache.get(&canonical).as_deref() != Some(pci.as_str()) {
                    info!("recording {canonical} -> {pci} ({})", device.interface_name);
                }
                self.cache.set(&canonical, &pci);
                self.cache.flush()?;
            }
            match self.cached(&canonical, key) {
                Some(pci) => {
                    debug!("{key} resolved to {pci} for {target}");
                    resolved.insert(pci, target.to_string());
                }
                None => debug!("{key} is not a known device, skipping"),
            }
        }
        Ok(resolved)
    }

    /// Resolve the devices named by `data-port`.
    ///
    /// # Errors
    ///
    /// See [`DeviceResolver::resolve`].
    pub fn resolve_dpdk_bridges(
        &mut self,
        config: &CharmConfig,
    ) -> Result<ResolvedDeviceMap, ResolveError> {
        self.resolve(&PortMapping::parse_option(config.data_port()))
    }

    /// Resolve the devices named by `dpdk-bond-mappings`.
    ///
    /// # Errors
    ///
    /// See [`DeviceResolver::resolve`].
    pub fn resolve_dpdk_bonds(
        &mut self,
        config: &CharmConfig,
    ) -> Result<ResolvedDeviceMap, ResolveError> {
        self.resolve(&PortMapping::parse_option(config.dpdk_bond_mappings()))
    }

    /// Every device handed to DPDK: bridge devices, then bond members, with bond targets
    /// replacing bridge targets for the same PCI address.
    ///
    /// # Errors
    ///
    /// See [`DeviceResolver::resolve`].
    pub fn resolve_dpdk_devices(
        &mut self,
        config: &CharmConfig,
    ) -> Result<ResolvedDeviceMap, ResolveError> {
        let mut devices = self.resolve_dpdk_bridges(config)?;
        devices.extend(self.resolve_dpdk_bonds(config)?);
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvstore::MemoryKvStore;
    use pretty_assertions::assert_eq;
    use test_utils::FakeDevices;

    fn pci(s: &str) -> PciAddress {
        PciAddress::try_from(s).unwrap()
    }

    fn devices() -> FakeDevices {
        FakeDevices::default()
            .with_nic("ens3f0", "fe:ed:be:ef:00:01", "0000:03:00.0")
            .with_nic("ens3f1", "fe:ed:be:ef:00:02", "0000:03:00.1")
    }

    #[test]
    fn live_devices_are_recorded_and_flushed() {
        let devices = devices();
        let mut cache = MemoryKvStore::new();
        let mapping = PortMapping::parse("br-ex:fe:ed:be:ef:00:01 br-data:FE:ED:BE:EF:00:02");
        let resolved = DeviceResolver::new(&devices, &mut cache)
            .resolve(&mapping)
            .unwrap();
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec![
                (pci("0000:03:00.0"), "br-ex".to_string()),
                (pci("0000:03:00.1"), "br-data".to_string()),
            ]
        );
        assert_eq!(cache.flushes(), 2);
        assert_eq!(
            cache.durable().get("fe:ed:be:ef:00:02").map(String::as_str),
            Some("0000:03:00.1")
        );
    }

    #[test]
    fn vanished_devices_resolve_from_cache() {
        let mut cache: MemoryKvStore = [("fe:ed:be:ef:00:03", "0000:04:00.0")].into_iter().collect();
        let devices = devices();
        let mapping = PortMapping::parse("br-ex:fe:ed:be:ef:00:03");
        let resolved = DeviceResolver::new(&devices, &mut cache)
            .resolve(&mapping)
            .unwrap();
        assert_eq!(resolved.get(&pci("0000:04:00.0")).map(String::as_str), Some("br-ex"));
        assert_eq!(cache.flushes(), 0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn unknown_and_corrupt_entries_are_dropped() {
        let mut cache: MemoryKvStore = [("fe:ed:be:ef:00:04", "garbage")].into_iter().collect();
        let devices = devices();
        let mapping = PortMapping::parse(
            "br-ex:fe:ed:be:ef:00:09 br-ex:fe:ed:be:ef:00:04 br-ex:eth7 br-data:fe:ed:be:ef:00:01",
        );
        let resolved = DeviceResolver::new(&devices, &mut cache)
            .resolve(&mapping)
            .unwrap();
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec![(pci("0000:03:00.0"), "br-data".to_string())]
        );
        assert!(logs_contain("ignoring cached binding"));
    }

    #[test]
    fn same_device_later_target_wins() {
        let devices = devices();
        let mut cache = MemoryKvStore::new();
        let mapping = PortMapping::parse("br-a:fe:ed:be:ef:00:01 br-b:FE:ED:BE:EF:00:01");
        let resolved = DeviceResolver::new(&devices, &mut cache)
            .resolve(&mapping)
            .unwrap();
        // both tokens spell the same MAC differently, so both survive parsing
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec![(pci("0000:03:00.0"), "br-b".to_string())]
        );
    }

    #[test]
    fn bonds_override_bridges() {
        let devices = devices();
        let mut cache = MemoryKvStore::new();
        let config = CharmConfig {
            data_port: Some("br-ex:fe:ed:be:ef:00:01 br-ex:fe:ed:be:ef:00:02".to_string()),
            dpdk_bond_mappings: Some("bond0:fe:ed:be:ef:00:02".to_string()),
            ..CharmConfig::default()
        };
        let merged = DeviceResolver::new(&devices, &mut cache)
            .resolve_dpdk_devices(&config)
            .unwrap();
        assert_eq!(
            merged.into_iter().collect::<Vec<_>>(),
            vec![
                (pci("0000:03:00.0"), "br-ex".to_string()),
                (pci("0000:03:00.1"), "bond0".to_string()),
            ]
        );
    }

    #[test]
    fn resolve_is_idempotent_and_bounded() {
        bolero::check!()
            .with_type::<Vec<(u8, bool)>>()
            .for_each(|entries| {
                let devices = devices();
                let mut cache = MemoryKvStore::new();
                let text: Vec<String> = entries
                    .iter()
                    .map(|(last, bond)| {
                        let target = if *bond { "bond0" } else { "br-ex" };
                        format!("{target}:fe:ed:be:ef:00:{:02x}", last % 4)
                    })
                    .collect();
                let mapping = PortMapping::parse(&text.join(" "));
                let mut resolver = DeviceResolver::new(&devices, &mut cache);
                let first = resolver.resolve(&mapping).unwrap();
                let second = resolver.resolve(&mapping).unwrap();
                assert!(first.len() <= mapping.len());
                assert_eq!(first, second);
            });
    }
}
