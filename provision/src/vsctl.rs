// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `ovs-vsctl` operations.

use dpdk::{BondConfig, BondPorts};
use hardware::PciAddress;
use tracing::{debug, info};

use crate::ProvisionError;
use crate::runner::{CommandError, CommandRunner};

pub const OVS_VSCTL: &str = "ovs-vsctl";

/// IPFIX exporter settings other than the collector address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpfixSettings {
    pub sampling: u32,
    pub cache_active_timeout: u32,
    pub cache_max_flows: u32,
}

impl Default for IpfixSettings {
    fn default() -> Self {
        Self {
            sampling: 64,
            cache_active_timeout: 60,
            cache_max_flows: 128,
        }
    }
}

/// Issues `ovs-vsctl` commands through a [`CommandRunner`].
///
/// `late_init` selects the command forms understood by Open vSwitch 2.6 and later, where DPDK
/// ports carry their PCI address in `options:dpdk-devargs` and bonds of DPDK ports exist.
pub struct Vsctl<'r, R: ?Sized> {
    runner: &'r mut R,
    late_init: bool,
}

impl<'r, R: CommandRunner + ?Sized> Vsctl<'r, R> {
    #[must_use]
    pub fn new(runner: &'r mut R, late_init: bool) -> Self {
        Self { runner, late_init }
    }

    fn call(&mut self, args: &[&str]) -> Result<(), CommandError> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(OVS_VSCTL);
        argv.extend_from_slice(args);
        self.runner.check_call(&argv)
    }

    /// Create `name` unless it exists and set its datapath.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn add_bridge(&mut self, name: &str, datapath_type: &str) -> Result<(), CommandError> {
        info!("adding bridge {name} ({datapath_type})");
        let datapath = format!("datapath_type={datapath_type}");
        self.call(&[
            "--", "--may-exist", "add-br", name, "--", "set", "bridge", name, &datapath,
        ])
    }

    /// Attach a kernel interface to `bridge` and bring it up.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn add_bridge_port(
        &mut self,
        bridge: &str,
        port: &str,
        promisc: bool,
    ) -> Result<(), CommandError> {
        info!("adding port {port} to bridge {bridge}");
        self.call(&["--", "--may-exist", "add-port", bridge, port])?;
        self.runner.check_call(&["ip", "link", "set", port, "up"])?;
        if promisc {
            self.runner
                .check_call(&["ip", "link", "set", port, "promisc", "on"])?;
        }
        Ok(())
    }

    /// Attach a DPDK port to `bridge`.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn dpdk_add_bridge_port(
        &mut self,
        bridge: &str,
        port: &str,
        pci: &PciAddress,
    ) -> Result<(), CommandError> {
        info!("adding dpdk port {port} ({pci}) to bridge {bridge}");
        if self.late_init {
            let devargs = format!("options:dpdk-devargs={pci}");
            self.call(&[
                "add-port", bridge, port, "--", "set", "Interface", port, "type=dpdk", &devargs,
            ])
        } else {
            self.call(&[
                "--", "--may-exist", "add-port", bridge, port, "--", "set", "Interface", port,
                "type=dpdk",
            ])
        }
    }

    /// Create `bond` on `bridge` from DPDK member ports.
    ///
    /// # Errors
    ///
    /// Bonds of DPDK ports need late DPDK initialisation; command failures are propagated.
    pub fn dpdk_add_bridge_bond(
        &mut self,
        bridge: &str,
        bond: &str,
        ports: &BondPorts,
    ) -> Result<(), ProvisionError> {
        if !self.late_init {
            return Err(ProvisionError::BondsNeedLateInit(bond.to_string()));
        }
        info!("adding dpdk bond {bond} to bridge {bridge}");
        let devargs: Vec<String> = ports
            .values()
            .map(|pci| format!("options:dpdk-devargs={pci}"))
            .collect();
        let mut args = vec!["--may-exist", "add-bond", bridge, bond];
        args.extend(ports.keys().map(String::as_str));
        for (port, devargs) in ports.keys().zip(&devargs) {
            args.extend(["--", "set", "Interface", port.as_str(), "type=dpdk", devargs.as_str()]);
        }
        Ok(self.call(&args)?)
    }

    /// Apply the LACP settings of `bond`.
    ///
    /// # Errors
    ///
    /// Bonds of DPDK ports need late DPDK initialisation; command failures are propagated.
    pub fn dpdk_set_bond_config(
        &mut self,
        bond: &str,
        config: BondConfig,
    ) -> Result<(), ProvisionError> {
        if !self.late_init {
            return Err(ProvisionError::BondsNeedLateInit(bond.to_string()));
        }
        debug!("bond {bond}: {config:?}");
        let mode = format!("bond_mode={}", config.mode);
        let lacp = format!("lacp={}", config.lacp);
        let lacp_time = format!("other_config:lacp-time={}", config.lacp_time);
        Ok(self.call(&[
            "--", "set", "port", bond, &mode, "--", "set", "port", bond, &lacp, "--", "set",
            "port", bond, &lacp_time,
        ])?)
    }

    /// Request `mtu` on `port`.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn dpdk_set_mtu_request(&mut self, port: &str, mtu: u32) -> Result<(), CommandError> {
        let request = format!("mtu_request={mtu}");
        self.call(&["set", "Interface", port, &request])
    }

    /// Request `mtu` on every port of `ports`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing port.
    pub fn dpdk_set_interfaces_mtu<'p>(
        &mut self,
        mtu: u32,
        ports: impl IntoIterator<Item = &'p str>,
    ) -> Result<(), CommandError> {
        for port in ports {
            self.dpdk_set_mtu_request(port, mtu)?;
        }
        Ok(())
    }

    /// Export flow samples of `bridge` to `target`.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn enable_ipfix(
        &mut self,
        bridge: &str,
        target: &str,
        settings: IpfixSettings,
    ) -> Result<(), CommandError> {
        info!("enabling ipfix on {bridge} towards {target}");
        let targets = format!("targets=\"{target}\"");
        let sampling = format!("sampling={}", settings.sampling);
        let timeout = format!("cache_active_timeout={}", settings.cache_active_timeout);
        let flows = format!("cache_max_flows={}", settings.cache_max_flows);
        self.call(&[
            "set", "Bridge", bridge, "ipfix=@i", "--", "--id=@i", "create", "IPFIX", &targets,
            &sampling, &timeout, &flows,
        ])
    }

    /// Stop exporting flow samples of `bridge`.  Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub fn disable_ipfix(&mut self, bridge: &str) -> Result<(), CommandError> {
        self.call(&["clear", "Bridge", bridge, "ipfix"])
    }

    /// Current value of `column` in the `Open_vSwitch` table, if it can be read.
    pub fn get_open_vswitch_column(&mut self, column: &str) -> Option<String> {
        let output = self
            .runner
            .check_output(&[OVS_VSCTL, "get", "Open_vSwitch", ".", column])
            .ok()?;
        // ovs-vsctl prints atoms as JSON scalars, which YAML reads the same way; maps and sets
        // are not valid JSON and are kept verbatim
        let value = match serde_yaml_ng::from_str(output.trim()) {
            Ok(serde_yaml_ng::Value::String(s)) => s,
            Ok(serde_yaml_ng::Value::Bool(b)) => b.to_string(),
            Ok(serde_yaml_ng::Value::Number(n)) => n.to_string(),
            _ => output.trim().to_string(),
        };
        Some(value)
    }

    /// Write `value` to `column` unless it already holds it.  Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Propagates failure of the write; a failed read counts as "not set".
    pub fn set_open_vswitch_column(
        &mut self,
        column: &str,
        value: &str,
    ) -> Result<bool, CommandError> {
        if self.get_open_vswitch_column(column).as_deref() == Some(value) {
            debug!("{column} already set to {value}");
            return Ok(false);
        }
        info!("setting {column}:{value} in the Open_vSwitch table");
        let assignment = format!("{column}={value}");
        self.call(&["set", "Open_vSwitch", ".", &assignment])?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use pretty_assertions::assert_eq;

    fn pci(function: u8) -> PciAddress {
        PciAddress::new(0, 3, 0, function).unwrap()
    }

    #[test]
    fn bridges_and_kernel_ports() {
        let mut runner = RecordingRunner::new();
        let mut vsctl = Vsctl::new(&mut runner, false);
        vsctl.add_bridge("br-int", "system").unwrap();
        vsctl.add_bridge_port("br-data", "eth1", true).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ovs-vsctl -- --may-exist add-br br-int -- set bridge br-int datapath_type=system",
                "ovs-vsctl -- --may-exist add-port br-data eth1",
                "ip link set eth1 up",
                "ip link set eth1 promisc on",
            ]
        );
    }

    #[test]
    fn dpdk_port_forms() {
        let mut runner = RecordingRunner::new();
        Vsctl::new(&mut runner, false)
            .dpdk_add_bridge_port("br-phynet1", "dpdk0", &pci(0))
            .unwrap();
        Vsctl::new(&mut runner, true)
            .dpdk_add_bridge_port("br-phynet1", "dpdk-70cb47d", &pci(0))
            .unwrap();
        Vsctl::new(&mut runner, true)
            .dpdk_set_mtu_request("dpdk1", 9000)
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ovs-vsctl -- --may-exist add-port br-phynet1 dpdk0 -- set Interface dpdk0 type=dpdk",
                "ovs-vsctl add-port br-phynet1 dpdk-70cb47d -- set Interface dpdk-70cb47d \
                 type=dpdk options:dpdk-devargs=0000:03:00.0",
                "ovs-vsctl set Interface dpdk1 mtu_request=9000",
            ]
        );
    }

    #[test]
    fn bonds() {
        let ports: BondPorts = [
            ("dpdk-70cb47d".to_string(), pci(0)),
            ("dpdk-d8508be".to_string(), pci(1)),
        ]
        .into_iter()
        .collect();
        let mut runner = RecordingRunner::new();
        assert!(matches!(
            Vsctl::new(&mut runner, false).dpdk_add_bridge_bond("br-ex", "bond0", &ports),
            Err(ProvisionError::BondsNeedLateInit(bond)) if bond == "bond0"
        ));
        assert!(runner.commands().is_empty());
        let mut vsctl = Vsctl::new(&mut runner, true);
        vsctl.dpdk_add_bridge_bond("br-ex", "bond0", &ports).unwrap();
        vsctl
            .dpdk_set_bond_config("bond0", BondConfig::default())
            .unwrap();
        vsctl
            .dpdk_set_interfaces_mtu(1500, ports.keys().map(String::as_str))
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ovs-vsctl --may-exist add-bond br-ex bond0 dpdk-70cb47d dpdk-d8508be \
                 -- set Interface dpdk-70cb47d type=dpdk options:dpdk-devargs=0000:03:00.0 \
                 -- set Interface dpdk-d8508be type=dpdk options:dpdk-devargs=0000:03:00.1",
                "ovs-vsctl -- set port bond0 bond_mode=balance-tcp -- set port bond0 lacp=active \
                 -- set port bond0 other_config:lacp-time=fast",
                "ovs-vsctl set Interface dpdk-70cb47d mtu_request=1500",
                "ovs-vsctl set Interface dpdk-d8508be mtu_request=1500",
            ]
        );
    }

    #[test]
    fn ipfix() {
        let mut runner = RecordingRunner::new();
        let mut vsctl = Vsctl::new(&mut runner, false);
        vsctl.disable_ipfix("br-int").unwrap();
        vsctl
            .enable_ipfix("br-int", "127.0.0.1:80", IpfixSettings::default())
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ovs-vsctl clear Bridge br-int ipfix",
                "ovs-vsctl set Bridge br-int ipfix=@i -- --id=@i create IPFIX \
                 targets=\"127.0.0.1:80\" sampling=64 cache_active_timeout=60 cache_max_flows=128",
            ]
        );
    }

    #[test]
    fn open_vswitch_columns_are_written_when_changed() {
        let get = ["ovs-vsctl", "get", "Open_vSwitch", ".", "other_config:dpdk-init"];
        let mut runner = RecordingRunner::new().with_output(&get, "\"true\"\n");
        let mut vsctl = Vsctl::new(&mut runner, true);
        assert!(!vsctl.set_open_vswitch_column("other_config:dpdk-init", "true").unwrap());
        assert!(vsctl.set_open_vswitch_column("other_config:dpdk-init", "false").unwrap());
        assert!(
            vsctl
                .set_open_vswitch_column("other_config:dpdk-lcore-mask", "0x03")
                .unwrap()
        );
        assert_eq!(
            runner.command_lines(),
            vec![
                "ovs-vsctl get Open_vSwitch . other_config:dpdk-init",
                "ovs-vsctl get Open_vSwitch . other_config:dpdk-init",
                "ovs-vsctl set Open_vSwitch . other_config:dpdk-init=false",
                "ovs-vsctl get Open_vSwitch . other_config:dpdk-lcore-mask",
                "ovs-vsctl set Open_vSwitch . other_config:dpdk-lcore-mask=0x03",
            ]
        );
    }

    #[test]
    fn open_vswitch_column_values() {
        let get = |column: &'static str| ["ovs-vsctl", "get", "Open_vSwitch", ".", column];
        let mut runner = RecordingRunner::new()
            .with_output(&get("other_config:dpdk-lcore-mask"), "\"0x33\"\n")
            .with_output(&get("other_config:dpdk-init"), "true\n")
            .with_output(&get("other_config:dpdk-socket-mem"), "\"1024,1024\"\n")
            .with_output(&get("other_config"), "{dpdk-init=\"true\"}\n")
            .with_output(&get("other_config:vhost-sock-dir"), "\"\"\n");
        let mut vsctl = Vsctl::new(&mut runner, true);
        assert_eq!(
            vsctl
                .get_open_vswitch_column("other_config:dpdk-lcore-mask")
                .as_deref(),
            Some("0x33")
        );
        assert_eq!(
            vsctl.get_open_vswitch_column("other_config:dpdk-init").as_deref(),
            Some("true")
        );
        assert_eq!(
            vsctl
                .get_open_vswitch_column("other_config:dpdk-socket-mem")
                .as_deref(),
            Some("1024,1024")
        );
        assert_eq!(
            vsctl.get_open_vswitch_column("other_config").as_deref(),
            Some("{dpdk-init=\"true\"}")
        );
        assert_eq!(
            vsctl
                .get_open_vswitch_column("other_config:vhost-sock-dir")
                .as_deref(),
            Some("")
        );
    }
}
