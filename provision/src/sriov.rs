// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime SR-IOV virtual function configuration.
//!
//! Only the running system is changed here; the boot time job installed with the charm applies
//! the same settings after a reboot.

use std::str::FromStr;

use config::mapping::sriov_interfaces;
use config::{Relations, SystemState};
use hardware::{DeviceEnumerator, NetDevice, PciNetDevices};
use ordermap::OrderMap;
use resources::map::sriov_agent_name;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ProvisionError;
use crate::runner::CommandRunner;
use crate::service::{SRIOV_BOOT_SERVICE, ServiceAction, restart_best_effort, service};

/// Relation whose units restart their services when SR-IOV settings change.
pub const REMOTE_RESTART_RELATION: &str = Relations::NEUTRON_PLUGIN;

/// Parsed `sriov-numvfs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumVfs {
    /// Every VF of every SR-IOV device, optionally limited to `sriov-device-mappings`.
    Auto,
    /// The same count on every SR-IOV device, capped at what each supports.
    Blanket(u32),
    /// `interface -> count`.
    PerDevice(OrderMap<String, u32>),
}

impl FromStr for NumVfs {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "auto" {
            return Ok(Self::Auto);
        }
        if let Ok(count) = s.parse() {
            return Ok(Self::Blanket(count));
        }
        s.split_whitespace()
            .map(|token| {
                token
                    .split_once(':')
                    .and_then(|(name, count)| Some((name.to_string(), count.parse::<u32>().ok()?)))
                    .ok_or_else(|| ProvisionError::InvalidNumVfs(token.to_string()))
            })
            .collect::<Result<_, _>>()
            .map(Self::PerDevice)
    }
}

/// Outcome of [`configure_sriov`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SriovReport {
    /// `(interface, numvfs)` for every device whose VF count was changed.
    pub configured: Vec<(String, u32)>,
    /// Value to publish on [`REMOTE_RESTART_RELATION`] so related units restart.
    pub restart_trigger: String,
}

fn capped(device: &NetDevice, requested: u32) -> u32 {
    if requested > device.sriov_total_vfs {
        warn!(
            "{requested} VFs requested for {}, which supports {}; using {}",
            device.interface_name, device.sriov_total_vfs, device.sriov_total_vfs
        );
        device.sriov_total_vfs
    } else {
        requested
    }
}

fn plan(numvfs: &NumVfs, devices: &PciNetDevices, mappings: &[String]) -> Vec<(NetDevice, u32)> {
    match numvfs {
        NumVfs::Auto => devices
            .sriov_capable()
            .filter(|device| {
                let selected = mappings.is_empty() || mappings.contains(&device.interface_name);
                if !selected {
                    debug!("excluding SR-IOV device {}", device.interface_name);
                }
                selected
            })
            .map(|device| (device.clone(), device.sriov_total_vfs))
            .collect(),
        NumVfs::Blanket(count) => devices
            .sriov_capable()
            .map(|device| (device.clone(), capped(device, *count)))
            .collect(),
        NumVfs::PerDevice(counts) => counts
            .iter()
            .filter_map(|(name, count)| {
                match devices
                    .get_device_from_interface_name(name)
                    .filter(|device| device.is_sriov)
                {
                    Some(device) => Some((device.clone(), capped(device, *count))),
                    None => {
                        debug!("{name} is not an SR-IOV device, skipping");
                        None
                    }
                }
            })
            .collect(),
    }
}

/// Apply `sriov-numvfs` to the host's SR-IOV devices and restart the SR-IOV agent.
///
/// Returns `None` when SR-IOV is not enabled for this release.  Devices already at the
/// requested count are left alone.
///
/// # Errors
///
/// Fails on a malformed `sriov-numvfs`, when the devices can not be enumerated or configured,
/// or when the boot time job can not be enabled.
pub fn configure_sriov<R, E>(
    runner: &mut R,
    state: &SystemState,
    enumerator: &mut E,
) -> Result<Option<SriovReport>, ProvisionError>
where
    R: CommandRunner,
    E: DeviceEnumerator,
{
    let flags = state.flags();
    if !flags.enable_sriov {
        debug!("SR-IOV is disabled");
        return Ok(None);
    }
    let numvfs: NumVfs = state.config.sriov_numvfs.parse()?;
    service(runner, ServiceAction::Enable, SRIOV_BOOT_SERVICE)?;

    let devices = PciNetDevices::scan(&*enumerator)?;
    let mappings = sriov_interfaces(state.config.sriov_device_mappings.as_deref());
    info!("configuring SR-IOV virtual functions ({numvfs:?})");
    let mut configured = vec![];
    for (device, count) in plan(&numvfs, &devices, &mappings) {
        if enumerator.set_sriov_numvfs(&device, count)? {
            info!("{} now has {count} VFs", device.interface_name);
            configured.push((device.interface_name, count));
        }
    }

    let restart_trigger = Uuid::new_v4().to_string();
    info!("requesting restart of {REMOTE_RESTART_RELATION} units ({restart_trigger})");
    restart_best_effort(runner, sriov_agent_name(&flags));
    Ok(Some(SriovReport {
        configured,
        restart_trigger,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use config::{CharmConfig, OpenStackRelease, Release, SystemStateBuilder};
    use pretty_assertions::assert_eq;
    use test_utils::FakeDevices;

    fn devices() -> FakeDevices {
        FakeDevices::default()
            .with_nic("eth0", "52:54:00:00:00:01", "0000:00:03.0")
            .with_sriov_nic("ens0", "fe:ed:be:ef:00:01", "0000:03:00.0", 64, 0)
            .with_sriov_nic("ens49", "fe:ed:be:ef:00:02", "0000:03:00.1", 64, 0)
    }

    fn state(numvfs: &str, mappings: Option<&str>, release: OpenStackRelease) -> SystemState {
        SystemStateBuilder::default()
            .config(CharmConfig {
                enable_sriov: true,
                sriov_numvfs: numvfs.to_string(),
                sriov_device_mappings: mappings.map(ToString::to_string),
                ..CharmConfig::default()
            })
            .os_release(Release::from(release))
            .finish()
            .unwrap()
    }

    fn run(state: &SystemState, devices: &mut FakeDevices) -> (SriovReport, Vec<String>) {
        let mut runner = RecordingRunner::new();
        let report = configure_sriov(&mut runner, state, devices).unwrap().unwrap();
        (report, runner.command_lines())
    }

    fn writes(devices: &FakeDevices) -> Vec<(&str, u32)> {
        devices
            .numvfs_writes()
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect()
    }

    #[test]
    fn numvfs_forms() {
        assert_eq!("auto".parse::<NumVfs>().unwrap(), NumVfs::Auto);
        assert_eq!(" 32 ".parse::<NumVfs>().unwrap(), NumVfs::Blanket(32));
        assert_eq!(
            "ens0:32 sriov23:64".parse::<NumVfs>().unwrap(),
            NumVfs::PerDevice(
                [("ens0".to_string(), 32), ("sriov23".to_string(), 64)]
                    .into_iter()
                    .collect()
            )
        );
        assert!(matches!(
            "ens0:lots".parse::<NumVfs>(),
            Err(ProvisionError::InvalidNumVfs(token)) if token == "ens0:lots"
        ));
    }

    #[test]
    fn auto_configures_every_sriov_device() {
        let mut devices = devices();
        let (report, commands) = run(&state("auto", None, OpenStackRelease::Mitaka), &mut devices);
        assert_eq!(writes(&devices), vec![("ens0", 64), ("ens49", 64)]);
        assert_eq!(report.configured.len(), 2);
        assert!(Uuid::parse_str(&report.restart_trigger).is_ok());
        assert_eq!(
            commands,
            vec![
                "systemctl enable neutron-openvswitch-networking-sriov",
                "systemctl restart neutron-sriov-agent",
            ]
        );
    }

    #[test]
    fn auto_honours_device_mappings() {
        let mut devices = devices();
        run(
            &state("auto", Some("net1:ens49"), OpenStackRelease::Mitaka),
            &mut devices,
        );
        assert_eq!(writes(&devices), vec![("ens49", 64)]);
    }

    #[test]
    fn blanket_count_is_capped() {
        let mut devices = devices();
        run(&state("32", None, OpenStackRelease::Mitaka), &mut devices);
        assert_eq!(writes(&devices), vec![("ens0", 32), ("ens49", 32)]);
        let mut devices = self::devices();
        run(&state("128", None, OpenStackRelease::Mitaka), &mut devices);
        assert_eq!(writes(&devices), vec![("ens0", 64), ("ens49", 64)]);
    }

    #[test]
    fn per_device_counts_on_kilo() {
        let mut devices = devices();
        let (_, commands) = run(
            &state("ens0:32 sriov23:64 eth0:4", None, OpenStackRelease::Kilo),
            &mut devices,
        );
        assert_eq!(writes(&devices), vec![("ens0", 32)]);
        assert_eq!(commands[1], "systemctl restart neutron-plugin-sriov-agent");
    }

    #[test]
    fn matching_counts_are_not_rewritten() {
        let mut devices = devices();
        let state = state("auto", None, OpenStackRelease::Mitaka);
        run(&state, &mut devices);
        let (report, _) = run(&state, &mut devices);
        assert!(report.configured.is_empty());
        assert_eq!(devices.numvfs_writes().len(), 2);
    }

    #[test]
    fn disabled_before_kilo() {
        let mut runner = RecordingRunner::new();
        let mut devices = devices();
        let state = state("auto", None, OpenStackRelease::Juno);
        assert!(configure_sriov(&mut runner, &state, &mut devices).unwrap().is_none());
        assert!(runner.commands().is_empty());
    }
}
