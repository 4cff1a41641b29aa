// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration model of the neutron-ovs charm.
//!
//! Everything a reconciliation pass may consult (charm options, relation data, release
//! information and a handful of host facts) is gathered once into a [`SystemState`]. Decision
//! functions elsewhere in the workspace take that state, or the [`FeatureFlags`] derived from it,
//! as an explicit argument instead of looking anything up on their own.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]

pub mod charm;
pub mod errors;
pub mod mapping;
pub mod relations;
pub mod release;
pub mod state;

pub use charm::CharmConfig; // re-export
pub use errors::ConfigError; // re-export
pub use mapping::{PortMapping, ResolvedDeviceMap}; // re-export
pub use relations::{NeutronApiSettings, Relations}; // re-export
pub use release::{HostRelease, OpenStackRelease, OvsVersion, Release}; // re-export
pub use state::{FeatureFlags, HostFacts, StateFile, SystemState, SystemStateBuilder}; // re-export
