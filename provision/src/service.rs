// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Service control through systemd.

use tracing::{debug, warn};

use crate::runner::{CommandError, CommandRunner};

pub const OPENVSWITCH_SERVICE: &str = "openvswitch-switch";
pub const SRIOV_BOOT_SERVICE: &str = "neutron-openvswitch-networking-sriov";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
}

/// Apply `action` to `name`.
///
/// # Errors
///
/// Fails if `systemctl` does.
pub fn service(
    runner: &mut impl CommandRunner,
    action: ServiceAction,
    name: &str,
) -> Result<(), CommandError> {
    let action: &'static str = action.into();
    runner.check_call(&["systemctl", action, name])
}

/// Whether `name` is active.
pub fn service_running(runner: &mut impl CommandRunner, name: &str) -> bool {
    let running = runner
        .check_call(&["systemctl", "is-active", "--quiet", name])
        .is_ok();
    debug!("service {name} running: {running}");
    running
}

/// Restart `name`, logging rather than failing when the restart does not succeed.
pub fn restart_best_effort(runner: &mut impl CommandRunner, name: &str) {
    if let Err(e) = service(runner, ServiceAction::Restart, name) {
        warn!("unable to restart {name}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn restart_failure_is_not_fatal() {
        let mut runner = RecordingRunner::new()
            .with_failure(&["systemctl", "restart", "os-charm-phy-nic-mtu"])
            .with_failure(&["systemctl", "is-active", "--quiet", "openvswitch-switch"]);
        restart_best_effort(&mut runner, "os-charm-phy-nic-mtu");
        assert!(logs_contain("unable to restart os-charm-phy-nic-mtu"));
        assert!(!service_running(&mut runner, OPENVSWITCH_SERVICE));
        service(&mut runner, ServiceAction::Enable, SRIOV_BOOT_SERVICE).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl restart os-charm-phy-nic-mtu",
                "systemctl is-active --quiet openvswitch-switch",
                "systemctl enable neutron-openvswitch-networking-sriov",
            ]
        );
    }
}
