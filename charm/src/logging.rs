// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Log setup.
//!
//! Directives are applied in order: built-in defaults, `--log-level` arguments, then
//! `RUST_LOG`.  A later directive for the same target replaces an earlier one.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use crate::CharmError;

const DEFAULT_DIRECTIVES: &[&str] = &[
    "info",
    "neutron_ovs_dpdk=debug",
    "neutron_ovs_provision=debug",
];

fn directives(log_level: &[String], rust_log: Option<&str>) -> Vec<String> {
    DEFAULT_DIRECTIVES
        .iter()
        .map(ToString::to_string)
        .chain(log_level.iter().cloned())
        .chain(
            rust_log
                .into_iter()
                .flat_map(|env| env.split(','))
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(ToString::to_string),
        )
        .collect()
}

/// Build the filter for this run.
pub(crate) fn env_filter(log_level: &[String]) -> Result<EnvFilter, CharmError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    directives(log_level, rust_log.as_deref())
        .into_iter()
        .try_fold(EnvFilter::default(), |filter, directive| {
            let parsed: Directive =
                directive
                    .parse()
                    .map_err(|source| CharmError::LogDirective {
                        directive: directive.clone(),
                        source,
                    })?;
            Ok(filter.add_directive(parsed))
        })
}

/// Install the global subscriber.  Logs go to stderr, reports to stdout.
pub(crate) fn init(filter: EnvFilter) {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arguments_then_environment() {
        let args = vec!["neutron_ovs_dpdk=trace".to_string()];
        assert_eq!(
            directives(&args, Some("warn, neutron_ovs_charm=debug,")),
            vec![
                "info",
                "neutron_ovs_dpdk=debug",
                "neutron_ovs_provision=debug",
                "neutron_ovs_dpdk=trace",
                "warn",
                "neutron_ovs_charm=debug",
            ]
        );
        assert_eq!(directives(&[], None).len(), DEFAULT_DIRECTIVES.len());
    }

    #[test]
    fn bad_directive_is_reported() {
        let args = vec!["neutron_ovs_dpdk=loud".to_string()];
        assert!(matches!(
            env_filter(&args),
            Err(CharmError::LogDirective { directive, .. }) if directive == "neutron_ovs_dpdk=loud"
        ));
    }
}
