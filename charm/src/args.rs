// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::path::{Path, PathBuf};

pub(crate) use clap::Parser;
use clap::Subcommand;

/// Default location of the MAC to PCI address cache.
pub(crate) const DEFAULT_DEVICE_CACHE: &str = "/var/lib/neutron-ovs/devices.yaml";

#[derive(Parser, Debug)]
#[command(name = "neutron-ovs")]
#[command(version)]
#[command(about = "One reconciliation pass of the neutron-openvswitch charm", long_about = None)]
pub(crate) struct CmdArgs {
    #[arg(long, value_name = "state file (yaml)")]
    state: PathBuf,
    #[arg(long, value_name = "device cache", default_value = DEFAULT_DEVICE_CACHE)]
    kv: PathBuf,
    #[arg(long, value_name = "sysfs root (detected if absent)")]
    sysfs: Option<PathBuf>,
    #[arg(long, value_name = "shared secret file", default_value = resources::paths::SHARED_SECRET)]
    secret: PathBuf,
    #[arg(long, value_name = "record commands instead of running them", default_value_t = false)]
    dry_run: bool,
    #[arg(long, value_name = "loglevel for a specific component")]
    log_level: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Print managed files with their services and context sources
    ResourceMap,
    /// Print managed files with the services they restart
    RestartMap,
    /// Print packages to install and to purge
    Packages,
    /// Resolve DPDK devices and print the PCI address to bridge or bond map
    ResolveDevices,
    /// Print the merged template context of every managed file
    RenderContexts,
    /// Create bridges, ports and bonds
    ConfigureOvs,
    /// Configure SR-IOV virtual functions
    ConfigureSriov,
    /// Switch Open vSwitch to DPDK and apply EAL settings
    EnableDpdk,
}

impl Command {
    /// Whether the pass needs facts gathered from the host.
    pub(crate) fn needs_host(self) -> bool {
        !matches!(self, Self::ResourceMap | Self::RestartMap | Self::Packages)
    }
}

impl CmdArgs {
    pub(crate) fn state(&self) -> &Path {
        &self.state
    }
    pub(crate) fn kv(&self) -> &Path {
        &self.kv
    }
    pub(crate) fn sysfs(&self) -> Option<&Path> {
        self.sysfs.as_deref()
    }
    pub(crate) fn secret(&self) -> &Path {
        &self.secret
    }
    pub(crate) fn dry_run(&self) -> bool {
        self.dry_run
    }
    pub(crate) fn log_level(&self) -> &[String] {
        &self.log_level
    }
    pub(crate) fn command(&self) -> Command {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let args = CmdArgs::try_parse_from(["neutron-ovs", "--state", "s.yaml", "packages"]).unwrap();
        assert_eq!(args.state(), Path::new("s.yaml"));
        assert_eq!(args.kv(), Path::new(DEFAULT_DEVICE_CACHE));
        assert_eq!(args.secret(), Path::new("/etc/neutron/secret.txt"));
        assert!(args.sysfs().is_none());
        assert!(!args.dry_run());
        assert_eq!(args.command(), Command::Packages);
        assert!(!args.command().needs_host());
    }

    #[test]
    fn provisioning_with_overrides() {
        let args = CmdArgs::try_parse_from([
            "neutron-ovs",
            "--state",
            "s.yaml",
            "--sysfs",
            "/tmp/sys",
            "--dry-run",
            "--log-level",
            "neutron_ovs_dpdk=trace",
            "--log-level",
            "warn",
            "configure-ovs",
        ])
        .unwrap();
        assert_eq!(args.sysfs(), Some(Path::new("/tmp/sys")));
        assert!(args.dry_run());
        assert_eq!(args.log_level(), ["neutron_ovs_dpdk=trace", "warn"]);
        assert!(args.command().needs_host());
    }

    #[test]
    fn state_is_required() {
        assert!(CmdArgs::try_parse_from(["neutron-ovs", "packages"]).is_err());
        assert!(CmdArgs::try_parse_from(["neutron-ovs", "--state", "s.yaml"]).is_err());
    }
}
