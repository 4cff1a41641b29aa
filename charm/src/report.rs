// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! YAML reports printed by the binary.

use config::{FeatureFlags, SystemState};
use ordermap::OrderMap;
use provision::SriovReport;
use resources::{
    Context, ConfigRenderer, ContextGenerator, ResourceMap, determine_packages,
    ovs_plugin_packages, purge_candidates,
};
use serde::Serialize;

use crate::CharmError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ResourceView {
    services: Vec<String>,
    contexts: Vec<String>,
}

/// `path -> {services, contexts}`.
pub(crate) fn resource_map(map: &ResourceMap) -> OrderMap<&'static str, ResourceView> {
    map.iter()
        .map(|(path, resource)| {
            let view = ResourceView {
                services: resource.services.iter().cloned().collect(),
                contexts: resource.contexts.iter().map(|g| format!("{g:?}")).collect(),
            };
            (path, view)
        })
        .collect()
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Packages {
    install: Vec<String>,
    purge: Vec<String>,
}

pub(crate) fn packages(flags: &FeatureFlags, kernel_headers: &str, needs_dkms: bool) -> Packages {
    let install = determine_packages(flags, &ovs_plugin_packages(kernel_headers, needs_dkms));
    let purge = purge_candidates(flags, &install);
    Packages { install, purge }
}

/// [`ConfigRenderer`] which keeps the merged context of every registered file.
pub(crate) struct ContextDump<'a> {
    state: &'a SystemState,
    rendered: OrderMap<String, Context>,
}

impl<'a> ContextDump<'a> {
    pub(crate) fn new(state: &'a SystemState) -> Self {
        Self {
            state,
            rendered: OrderMap::new(),
        }
    }

    pub(crate) fn into_inner(self) -> OrderMap<String, Context> {
        self.rendered
    }
}

impl ConfigRenderer for ContextDump<'_> {
    fn register(&mut self, path: &str, contexts: &[ContextGenerator]) {
        let mut merged = Context::new();
        for generator in contexts {
            merged.merge(generator.generate(self.state));
        }
        self.rendered.insert(path.to_string(), merged);
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct SriovSummary {
    pub(crate) configured: OrderMap<String, u32>,
    pub(crate) restart_trigger: String,
}

impl From<SriovReport> for SriovSummary {
    fn from(report: SriovReport) -> Self {
        Self {
            configured: report.configured.into_iter().collect(),
            restart_trigger: report.restart_trigger,
        }
    }
}

/// Result of a provisioning subcommand, with the commands when they were only recorded.
#[derive(Debug, Serialize)]
pub(crate) struct Outcome<T> {
    pub(crate) result: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) commands: Option<Vec<String>>,
}

/// Print `value` as YAML on stdout.
pub(crate) fn emit<T: Serialize>(value: &T) -> Result<(), CharmError> {
    print!("{}", serde_yaml_ng::to_string(value)?);
    Ok(())
}
