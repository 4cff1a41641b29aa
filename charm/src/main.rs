// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]

mod args;
mod host;
mod logging;
mod report;

use std::path::Path;
use std::process::ExitCode;

use config::{ConfigError, StateFile, SystemState};
use dpdk::ResolveError;
use hardware::HardwareError;
use kvstore::{FileKvStore, KvError, KvStore, MemoryKvStore};
use provision::{
    CommandRunner, ProvisionError, RecordingRunner, SystemRunner, configure_ovs,
    configure_sriov, enable_ovs_dpdk,
};
use resources::ResourceMap;
use sysfs::SysfsErr;
use tracing::{error, info};

use crate::args::{CmdArgs, Command, Parser};
use crate::host::{DryRunDevices, Host, headers_package, kernel_release, needs_dkms};
use crate::report::{ContextDump, Outcome, SriovSummary, emit};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CharmError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Sysfs(#[from] SysfsErr),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("unable to read cpu information: {0}")]
    CpuInfo(#[from] procfs::ProcError),
    #[error("unable to query the kernel: {0}")]
    Kernel(#[from] nix::errno::Errno),
    #[error("invalid log directive '{directive}': {source}")]
    LogDirective {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("unable to format report: {0}")]
    Report(#[from] serde_yaml_ng::Error),
}

/// Run `step` against the host, or against a recorder when `dry_run` is set.
fn provision<T>(
    dry_run: bool,
    step: impl FnOnce(&mut dyn CommandRunner) -> Result<T, ProvisionError>,
) -> Result<Outcome<T>, CharmError> {
    if dry_run {
        let mut recorder = RecordingRunner::new();
        let result = step(&mut recorder)?;
        Ok(Outcome {
            result,
            commands: Some(recorder.command_lines()),
        })
    } else {
        Ok(Outcome {
            result: step(&mut SystemRunner)?,
            commands: None,
        })
    }
}

/// The binding cache at `path`.  A dry run works on an in-memory copy so bindings never reach
/// the file.
fn open_cache(path: &Path, dry_run: bool) -> Result<Box<dyn KvStore>, CharmError> {
    let file = FileKvStore::open(path)?;
    if dry_run {
        Ok(Box::new(file.iter().collect::<MemoryKvStore>()))
    } else {
        Ok(Box::new(file))
    }
}

fn configure_sriov_step(
    dry_run: bool,
    state: &SystemState,
    host: &mut Host,
) -> Result<Outcome<Option<SriovSummary>>, CharmError> {
    let outcome = if dry_run {
        let mut devices = DryRunDevices::new(host.devices());
        let mut outcome = provision(true, |mut runner| {
            configure_sriov(&mut runner, state, &mut devices)
        })?;
        if let Some(commands) = &mut outcome.commands {
            commands.extend(devices.numvfs().iter().map(|(interface, numvfs)| {
                format!("sysfs {interface} sriov_numvfs={numvfs}")
            }));
        }
        outcome
    } else {
        provision(false, |mut runner| {
            configure_sriov(&mut runner, state, host.devices_mut())
        })?
    };
    Ok(Outcome {
        result: outcome.result.map(SriovSummary::from),
        commands: outcome.commands,
    })
}

fn run(args: &CmdArgs) -> Result<(), CharmError> {
    let mut file = StateFile::load(args.state())?;
    let command = args.command();
    if !command.needs_host() {
        let flags = file.into_builder().finish()?.flags();
        let map = ResourceMap::build(&flags);
        return match command {
            Command::ResourceMap => emit(&report::resource_map(&map)),
            Command::RestartMap => emit(&map.restart_map()),
            _ => {
                let release = kernel_release()?;
                emit(&report::packages(
                    &flags,
                    &headers_package(&release),
                    needs_dkms(&release),
                ))
            }
        };
    }

    let mut cache = open_cache(args.kv(), args.dry_run())?;
    let mut host = Host::locate(args.sysfs())?;
    // a dry run must not create the secret
    let secret = (!args.dry_run() || args.secret().exists()).then_some(args.secret());
    host.gather(&mut file.host, &file.config, &mut cache, secret)?;
    let state: SystemState = file.into_builder().finish()?;
    info!("running {command:?} for {}", state.os_release.name());

    match command {
        Command::ResolveDevices => emit(&state.host.resolved_devices),
        Command::RenderContexts => {
            let mut dump = ContextDump::new(&state);
            ResourceMap::build(&state.flags()).register_configs(&mut dump);
            emit(&dump.into_inner())
        }
        Command::ConfigureOvs => emit(&provision(args.dry_run(), |mut runner| {
            configure_ovs(&mut runner, &state, host.devices(), &mut cache)
        })?),
        Command::ConfigureSriov => {
            emit(&configure_sriov_step(args.dry_run(), &state, &mut host)?)
        }
        Command::EnableDpdk => emit(&provision(args.dry_run(), |mut runner| {
            enable_ovs_dpdk(&mut runner, &state)
        })?),
        Command::ResourceMap | Command::RestartMap | Command::Packages => Ok(()),
    }
}

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    match logging::env_filter(args.log_level()) {
        Ok(filter) => logging::init(filter),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{CharmConfig, OpenStackRelease, Release, SystemStateBuilder};
    use pretty_assertions::assert_eq;

    use crate::host::tests::add_sriov_nic;

    fn sriov_state() -> SystemState {
        SystemStateBuilder::default()
            .config(CharmConfig {
                enable_sriov: true,
                sriov_numvfs: "auto".to_string(),
                ..CharmConfig::default()
            })
            .os_release(Release::from(OpenStackRelease::Queens))
            .finish()
            .unwrap()
    }

    #[test]
    fn dry_run_sriov_leaves_numvfs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let device = add_sriov_nic(dir.path(), "ens3f0", "0000:03:00.0", "fe:ed:be:ef:00:01");
        let mut host = Host::locate(Some(dir.path())).unwrap();

        let outcome = configure_sriov_step(true, &sriov_state(), &mut host).unwrap();
        let summary = outcome.result.unwrap();
        assert_eq!(summary.configured.get("ens3f0"), Some(&8));
        let commands = outcome.commands.unwrap();
        assert!(commands.contains(
            &"systemctl enable neutron-openvswitch-networking-sriov".to_string()
        ));
        assert!(commands.contains(&"sysfs ens3f0 sriov_numvfs=8".to_string()));
        assert_eq!(
            std::fs::read_to_string(device.join("sriov_numvfs")).unwrap(),
            "0\n"
        );
    }

    #[test]
    fn dry_run_cache_is_not_flushed_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.yaml");
        std::fs::write(&path, "'fe:ed:be:ef:00:01': '0000:03:00.0'\n").unwrap();

        let mut cache = open_cache(&path, true).unwrap();
        assert_eq!(
            cache.get("fe:ed:be:ef:00:01").as_deref(),
            Some("0000:03:00.0")
        );
        cache.set("fe:ed:be:ef:00:02", "0000:03:00.1");
        cache.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "'fe:ed:be:ef:00:01': '0000:03:00.0'\n"
        );

        let mut cache = open_cache(&path, false).unwrap();
        cache.set("fe:ed:be:ef:00:02", "0000:03:00.1");
        cache.flush().unwrap();
        assert_eq!(
            FileKvStore::open(&path)
                .unwrap()
                .get("fe:ed:be:ef:00:02")
                .as_deref(),
            Some("0000:03:00.1")
        );
    }
}
