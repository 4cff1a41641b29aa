// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host fact gathering.
//!
//! Facts already present in the state file are kept; everything else is read from sysfs,
//! procfs and the kernel.

use std::path::{Path, PathBuf};

use config::{CharmConfig, HostFacts};
use dpdk::DeviceResolver;
use hardware::numa::scan_numa_nodes;
use hardware::{DeviceEnumerator, HardwareError, NetDevice, SysfsNetDevices};
use kvstore::KvStore;
use procfs::{CpuInfo, Current};
use provision::get_shared_secret;
use tracing::{debug, info, warn};

use crate::CharmError;

/// Kernels from this version on ship the Open vSwitch datapath.
const IN_TREE_DATAPATH: (u32, u32) = (3, 13);

/// Where host devices are read from.
#[derive(Debug)]
pub(crate) struct Host {
    devices: SysfsNetDevices,
    numa_dir: PathBuf,
}

impl Host {
    /// Use the sysfs tree below `root`, or the host's sysfs mount when absent.
    pub(crate) fn locate(root: Option<&Path>) -> Result<Self, CharmError> {
        match root {
            Some(root) => Ok(Self {
                devices: SysfsNetDevices::new(root),
                numa_dir: root.join("devices/system/node"),
            }),
            None => {
                let root = sysfs::sysfs_root()?;
                Ok(Self {
                    numa_dir: root.numa_nodes(),
                    devices: SysfsNetDevices::new(root.inner().clone()),
                })
            }
        }
    }

    pub(crate) fn devices(&self) -> &SysfsNetDevices {
        &self.devices
    }

    pub(crate) fn devices_mut(&mut self) -> &mut SysfsNetDevices {
        &mut self.devices
    }

    /// Fill in the facts `facts` leaves empty.
    ///
    /// The shared secret is only read (and created if missing) when `secret` is given.  DPDK
    /// devices are resolved through `cache` when DPDK is enabled.
    pub(crate) fn gather<S: KvStore>(
        &self,
        facts: &mut HostFacts,
        config: &CharmConfig,
        cache: &mut S,
        secret: Option<&Path>,
    ) -> Result<(), CharmError> {
        if facts.net_devices.is_empty() {
            facts.net_devices = self.devices.enumerate()?;
        }
        if facts.linux_bridges.is_empty() {
            facts.linux_bridges = self.devices.linux_bridges()?;
        }
        if facts.numa_nodes.is_empty() {
            facts.numa_nodes = scan_numa_nodes(&self.numa_dir)?;
        }
        if facts.cpu_count == 0 {
            facts.cpu_count = CpuInfo::current()?.num_cores();
        }
        if facts.shared_secret.is_none()
            && let Some(path) = secret
        {
            facts.shared_secret = Some(get_shared_secret(path)?);
        }
        if facts.fqdn.is_none() {
            facts.fqdn = hostname();
        }
        if facts.resolved_devices.is_empty() && config.enable_dpdk {
            facts.resolved_devices =
                DeviceResolver::new(&self.devices, cache).resolve_dpdk_devices(config)?;
        }
        debug!(
            "host has {} network devices, {} numa nodes, {} cpus",
            facts.net_devices.len(),
            facts.numa_nodes.len(),
            facts.cpu_count
        );
        Ok(())
    }
}

/// Serves the devices of `inner` but only records virtual function changes.
#[derive(Debug)]
pub(crate) struct DryRunDevices<'a, E> {
    inner: &'a E,
    numvfs: Vec<(String, u32)>,
}

impl<'a, E: DeviceEnumerator> DryRunDevices<'a, E> {
    pub(crate) fn new(inner: &'a E) -> Self {
        Self {
            inner,
            numvfs: vec![],
        }
    }

    /// `(interface, numvfs)` for every write that was skipped.
    pub(crate) fn numvfs(&self) -> &[(String, u32)] {
        &self.numvfs
    }
}

impl<E: DeviceEnumerator> DeviceEnumerator for DryRunDevices<'_, E> {
    fn enumerate(&self) -> Result<Vec<NetDevice>, HardwareError> {
        self.inner.enumerate()
    }

    fn set_sriov_numvfs(
        &mut self,
        device: &NetDevice,
        numvfs: u32,
    ) -> Result<bool, HardwareError> {
        if numvfs > device.sriov_total_vfs {
            return Err(HardwareError::TooManyVirtualFunctions {
                interface: device.interface_name.clone(),
                requested: numvfs,
                total: device.sriov_total_vfs,
            });
        }
        if device.sriov_current_vfs == numvfs {
            return Ok(false);
        }
        info!(
            "would set {numvfs} virtual functions on {} (was {})",
            device.interface_name, device.sriov_current_vfs
        );
        self.numvfs.push((device.interface_name.clone(), numvfs));
        Ok(true)
    }
}

fn hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().ok(),
        Err(e) => {
            warn!("unable to read host name: {e}");
            None
        }
    }
}

/// `uname -r` of the running kernel.
pub(crate) fn kernel_release() -> Result<String, CharmError> {
    let uts = nix::sys::utsname::uname()?;
    Ok(uts.release().to_string_lossy().into_owned())
}

/// Headers package matching `release`.
pub(crate) fn headers_package(release: &str) -> String {
    format!("linux-headers-{release}")
}

/// Whether `release` predates the in-tree Open vSwitch datapath.
pub(crate) fn needs_dkms(release: &str) -> bool {
    let mut parts = release
        .split(|c: char| !c.is_ascii_digit())
        .map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) < IN_TREE_DATAPATH,
        _ => {
            warn!("unable to parse kernel release {release}, assuming an in-tree datapath");
            false
        }
    }
}
