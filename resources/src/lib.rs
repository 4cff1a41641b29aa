// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Declarative description of what the neutron-ovs charm manages.
//!
//! Everything here is derived from [`config::FeatureFlags`] (and, for contexts, the full
//! [`config::SystemState`]) without touching the host, which keeps the derivation testable
//! for any release and feature combination.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod context;
pub mod map;
pub mod packages;
pub mod paths;

pub use context::{Context, ContextGenerator};
pub use map::{ConfigRenderer, Resource, ResourceMap};
pub use packages::{
    determine_packages, determine_purge_packages, ovs_plugin_packages, purge_candidates,
};
