// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host side actions of the neutron-ovs charm.
//!
//! Everything which changes the host goes through a [`runner::CommandRunner`] (or a
//! [`hardware::DeviceEnumerator`] for SR-IOV), so a whole pass can be recorded instead of
//! executed.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod ovs;
pub mod runner;
pub mod secret;
pub mod service;
pub mod sriov;
pub mod vsctl;

use std::path::PathBuf;

use dpdk::{BondConfigError, ResolveError, TopologyError};
use hardware::HardwareError;

pub use ovs::{configure_ovs, enable_ovs_dpdk};
pub use runner::{CommandError, CommandRunner, RecordingRunner, SystemRunner};
pub use secret::get_shared_secret;
pub use sriov::{SriovReport, configure_sriov};

/// Errors which abort a provisioning step.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error(transparent)]
    BondConfig(#[from] BondConfigError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("bond {0} needs Open vSwitch 2.6.0 or later")]
    BondsNeedLateInit(String),
    #[error("invalid sriov-numvfs entry '{0}'")]
    InvalidNumVfs(String),
    #[error("shared secret {path}: {source}")]
    Secret {
        path: PathBuf,
        source: std::io::Error,
    },
}
