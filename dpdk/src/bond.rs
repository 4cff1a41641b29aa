// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `dpdk-bond-config` parsing.
//!
//! The option is a whitespace separated list of `[bond][:mode][:lacp][:lacp_time]` entries.  An
//! empty bond name sets the configuration of every bond without an entry of its own, and empty
//! fields take the built-in default (`balance-tcp`, `active`, `fast`).

use std::str::FromStr;

use ordermap::OrderMap;
use tracing::debug;

/// Bond name which may be used in place of the empty name for the wildcard entry.
pub const ALL_BONDS: &str = "ALL_BONDS";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum BondMode {
    ActiveBackup,
    BalanceSlb,
    #[default]
    BalanceTcp,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Lacp {
    #[default]
    Active,
    Passive,
    Off,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum LacpTime {
    #[default]
    Fast,
    Slow,
}

/// LACP settings of one bond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BondConfig {
    pub mode: BondMode,
    pub lacp: Lacp,
    pub lacp_time: LacpTime,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BondConfigError {
    #[error("bond mode {0} is invalid")]
    InvalidMode(String),
    #[error("bond lacp {0} is invalid")]
    InvalidLacp(String),
    #[error("bond lacp-time {0} is invalid")]
    InvalidLacpTime(String),
}

fn field<T: FromStr + Default>(
    value: Option<&str>,
    err: fn(String) -> BondConfigError,
) -> Result<T, BondConfigError> {
    match value {
        None | Some("") => Ok(T::default()),
        Some(value) => value.parse().map_err(|_| err(value.to_string())),
    }
}

impl FromStr for BondConfig {
    type Err = BondConfigError;

    /// Parse the `mode:lacp:lacp_time` tail of an entry.  Anything past the third field is
    /// ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        Ok(Self {
            mode: field(fields.next(), BondConfigError::InvalidMode)?,
            lacp: field(fields.next(), BondConfigError::InvalidLacp)?,
            lacp_time: field(fields.next(), BondConfigError::InvalidLacpTime)?,
        })
    }
}

/// Per bond LACP configuration with a wildcard fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondsConfig {
    wildcard: BondConfig,
    bonds: OrderMap<String, BondConfig>,
}

impl BondsConfig {
    /// Parse `dpdk-bond-config`.
    ///
    /// # Errors
    ///
    /// Fails on the first field outside its enumeration; no partial configuration is returned.
    pub fn parse(value: &str) -> Result<Self, BondConfigError> {
        let mut config = Self::default();
        for entry in value.split_whitespace() {
            let (bond, rest) = entry.split_once(':').unwrap_or((entry, ""));
            let parsed: BondConfig = rest.parse()?;
            if bond.is_empty() || bond == ALL_BONDS {
                config.wildcard = parsed;
            } else {
                config.bonds.insert(bond.to_string(), parsed);
            }
        }
        debug!("bond configuration: {config:?}");
        Ok(config)
    }

    /// Parse an optional option value; unset means built-in defaults for every bond.
    ///
    /// # Errors
    ///
    /// See [`BondsConfig::parse`].
    pub fn parse_option(value: Option<&str>) -> Result<Self, BondConfigError> {
        value.map_or_else(|| Ok(Self::default()), Self::parse)
    }

    /// Configuration of `bond`, or the wildcard configuration when it has no entry.
    #[must_use]
    pub fn get_bond_config(&self, bond: &str) -> BondConfig {
        self.bonds.get(bond).copied().unwrap_or(self.wildcard)
    }
}
