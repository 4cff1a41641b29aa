// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bridge, bond and member port index used to provision DPDK bonds.

use hardware::PciAddress;
use ordermap::OrderMap;
use tracing::debug;

/// Member ports of one bond: `port name -> PCI address`.
pub type BondPorts = OrderMap<String, PciAddress>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("bond {bond} is already attached to bridge {existing}, can not add it to {requested}")]
    BondOnTwoBridges {
        bond: String,
        existing: String,
        requested: String,
    },
}

/// `bridge -> bond -> ports`, each level in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct BridgeBondTopology {
    bridges: OrderMap<String, OrderMap<String, BondPorts>>,
}

impl BridgeBondTopology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `port` as a member of `bond` on `bridge`.
    ///
    /// # Errors
    ///
    /// A bond lives on exactly one bridge; naming it under a second bridge is rejected.
    pub fn add_port(
        &mut self,
        bridge: &str,
        bond: &str,
        port: &str,
        pci: PciAddress,
    ) -> Result<(), TopologyError> {
        if let Some((existing, _)) = self
            .bridges
            .iter()
            .find(|(name, bonds)| name.as_str() != bridge && bonds.contains_key(bond))
        {
            return Err(TopologyError::BondOnTwoBridges {
                bond: bond.to_string(),
                existing: existing.clone(),
                requested: bridge.to_string(),
            });
        }
        debug!("bond {bond} on {bridge}: member {port} ({pci})");
        self.bridges
            .entry(bridge.to_string())
            .or_default()
            .entry(bond.to_string())
            .or_default()
            .insert(port.to_string(), pci);
        Ok(())
    }

    /// `(bridge, {bond: ports})` pairs in insertion order.  The iterator borrows the topology
    /// and may be recreated at will.
    pub fn items(&self) -> impl Iterator<Item = (&str, &OrderMap<String, BondPorts>)> {
        self.bridges
            .iter()
            .map(|(bridge, bonds)| (bridge.as_str(), bonds))
    }

    /// [`Self::items`] flattened to `(bridge, bond, ports)` triples.
    pub fn bonds(&self) -> impl Iterator<Item = (&str, &str, &BondPorts)> {
        self.items().flat_map(|(bridge, bonds)| {
            bonds
                .iter()
                .map(move |(bond, ports)| (bridge, bond.as_str(), ports))
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pci(function: u8) -> PciAddress {
        PciAddress::new(0, 3, 0, function).unwrap()
    }

    #[test]
    fn groups_ports_by_bridge_and_bond() {
        let mut topology = BridgeBondTopology::new();
        topology.add_port("br-ex", "bond0", "dpdk-70cb47d", pci(0)).unwrap();
        topology.add_port("br-data", "bond1", "dpdk-b9fb961", pci(2)).unwrap();
        topology.add_port("br-ex", "bond0", "dpdk-d8508be", pci(1)).unwrap();
        let bonds: Vec<_> = topology
            .bonds()
            .map(|(bridge, bond, ports)| (bridge, bond, ports.keys().cloned().collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            bonds,
            vec![
                ("br-ex", "bond0", vec!["dpdk-70cb47d".to_string(), "dpdk-d8508be".to_string()]),
                ("br-data", "bond1", vec!["dpdk-b9fb961".to_string()]),
            ]
        );
        // restartable
        assert_eq!(topology.bonds().count(), 2);
    }

    #[test]
    fn items_are_bridges_with_their_bonds() {
        let mut topology = BridgeBondTopology::new();
        topology.add_port("br-ex", "bond0", "p0", pci(0)).unwrap();
        topology.add_port("br-ex", "bond1", "p2", pci(2)).unwrap();
        topology.add_port("br-data", "bond2", "p4", pci(4)).unwrap();
        topology.add_port("br-ex", "bond0", "p1", pci(1)).unwrap();
        let items: Vec<_> = topology
            .items()
            .map(|(bridge, bonds)| (bridge, bonds.keys().map(String::as_str).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            items,
            vec![("br-ex", vec!["bond0", "bond1"]), ("br-data", vec!["bond2"])]
        );
        let (_, bonds) = topology.items().next().unwrap();
        assert_eq!(bonds["bond0"].len(), 2);
        assert_eq!(bonds["bond0"]["p1"], pci(1));
    }

    #[test]
    fn bond_on_second_bridge_is_rejected() {
        let mut topology = BridgeBondTopology::new();
        topology.add_port("br-ex", "bond0", "p0", pci(0)).unwrap();
        let err = topology.add_port("br-data", "bond0", "p1", pci(1)).unwrap_err();
        assert_eq!(
            err,
            TopologyError::BondOnTwoBridges {
                bond: "bond0".to_string(),
                existing: "br-ex".to_string(),
                requested: "br-data".to_string(),
            }
        );
        assert_eq!(topology.bonds().count(), 1);
    }

    #[test]
    fn member_order_does_not_change_membership() {
        bolero::check!()
            .with_type::<Vec<u8>>()
            .for_each(|functions| {
                let mut forward = BridgeBondTopology::new();
                let mut backward = BridgeBondTopology::new();
                for f in functions {
                    let f = f % 8;
                    forward.add_port("br-ex", "bond0", &format!("p{f}"), pci(f)).unwrap();
                }
                for f in functions.iter().rev() {
                    let f = f % 8;
                    backward.add_port("br-ex", "bond0", &format!("p{f}"), pci(f)).unwrap();
                }
                let members = |topology: &BridgeBondTopology| {
                    let mut all: Vec<(String, PciAddress)> = topology
                        .bonds()
                        .flat_map(|(_, _, ports)| ports.iter().map(|(p, a)| (p.clone(), *a)))
                        .collect();
                    all.sort();
                    all
                };
                assert_eq!(members(&forward), members(&backward));
                assert_eq!(forward.is_empty(), functions.is_empty());
            });
    }
}
