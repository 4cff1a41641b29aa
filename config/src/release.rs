// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Release comparators.
//!
//! OpenStack and Ubuntu release names are compared by their position in a fixed, ordered list.
//! A name missing from the list does not fail: it compares lower than every known release, so
//! an unrecognised (or absent) release behaves like the oldest one and release gated features
//! stay off.  Such names are logged once, when parsed, because they usually point at an operator
//! typo.

use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

use tracing::warn;

use crate::ConfigError;

/// OpenStack releases in chronological order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum OpenStackRelease {
    Diablo,
    Essex,
    Folsom,
    Grizzly,
    Havana,
    Icehouse,
    Juno,
    Kilo,
    Liberty,
    Mitaka,
    Newton,
    Ocata,
    Pike,
    Queens,
    Rocky,
    Stein,
    Train,
    Ussuri,
    Victoria,
    Wallaby,
    Xena,
    Yoga,
    Zed,
    Antelope,
    Bobcat,
    Caracal,
}

/// Ubuntu series in chronological order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum HostRelease {
    Lucid,
    Maverick,
    Natty,
    Oneiric,
    Precise,
    Quantal,
    Raring,
    Saucy,
    Trusty,
    Utopic,
    Vivid,
    Wily,
    Xenial,
    Yakkety,
    Zesty,
    Artful,
    Bionic,
    Cosmic,
    Disco,
    Eoan,
    Focal,
    Groovy,
    Hirsute,
    Impish,
    Jammy,
    Kinetic,
    Lunar,
    Mantic,
    Noble,
}

/// A release name together with its position in the known release list, if any.
///
/// `Release<R>` compares against plain `R` values, so gates read as
/// `flags.os_release >= OpenStackRelease::Mitaka`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Release<R> {
    known: Option<R>,
    name: String,
}

impl<R> Default for Release<R> {
    /// The absent release, which compares lower than every known one.
    fn default() -> Self {
        Self {
            known: None,
            name: String::new(),
        }
    }
}

impl<R: FromStr + Copy> Release<R> {
    /// Parse a release name.  Unknown names are kept verbatim and logged.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let trimmed = name.trim().to_ascii_lowercase();
        let known = R::from_str(&trimmed).ok();
        if known.is_none() {
            warn!(
                "unrecognised release '{name}', treating it as older than every known release"
            );
        }
        Self {
            known,
            name: trimmed,
        }
    }

    /// Parse an optional release name; a missing one is [`Release::default`].
    #[must_use]
    pub fn from_option(name: Option<&str>) -> Self {
        name.map_or_else(Self::default, Self::new)
    }
}

impl<R: Copy> Release<R> {
    /// The known release this name refers to, if any.
    #[must_use]
    pub fn known(&self) -> Option<R> {
        self.known
    }

    /// The release name as supplied (lower cased).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R: Into<&'static str> + Copy> From<R> for Release<R> {
    fn from(release: R) -> Self {
        Self {
            known: Some(release),
            name: release.into().to_string(),
        }
    }
}

impl<R: Display> Display for Release<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.known {
            Some(release) => write!(f, "{release}"),
            None if self.name.is_empty() => write!(f, "<unknown>"),
            None => write!(f, "{} (unknown)", self.name),
        }
    }
}

impl<R: Ord> PartialOrd for Release<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Ord> Ord for Release<R> {
    /// `None` sorts before `Some`, which places unknown names below every known release.  Two
    /// unknown names are ordered by name to stay consistent with `Eq`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.known
            .cmp(&other.known)
            .then_with(|| self.name.cmp(&other.name))
    }
}

macro_rules! compare_with_known {
    ($($release:ty),* $(,)?) => {$(
        impl PartialEq<$release> for Release<$release> {
            fn eq(&self, other: &$release) -> bool {
                self.known.as_ref() == Some(other)
            }
        }

        impl PartialOrd<$release> for Release<$release> {
            fn partial_cmp(&self, other: &$release) -> Option<Ordering> {
                Some(match &self.known {
                    Some(known) => known.cmp(other),
                    None => Ordering::Less,
                })
            }
        }
    )*};
}

compare_with_known!(OpenStackRelease, HostRelease);

/// Upstream Open vSwitch version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct OvsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OvsVersion {
    /// First release which initialises DPDK at runtime through `other_config`.
    pub const LATE_DPDK_INIT: OvsVersion = OvsVersion::new(2, 6, 0);
    /// First release acting as the client on vhost-user sockets.
    pub const VHOSTUSER_CLIENT: OvsVersion = OvsVersion::new(2, 9, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for OvsVersion {
    type Err = ConfigError;

    /// Accepts `X.Y[.Z]` optionally followed by a packaging suffix (`2.9.5-0ubuntu0.18.04.1`,
    /// `2.17.0~git1`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConfigError::InvalidOvsVersion(s.to_string());
        let upstream = s
            .trim()
            .split(['-', '~', '+'])
            .next()
            .ok_or_else(err)?;
        let mut fields = upstream.split('.').map(str::parse::<u32>);
        let major = fields.next().ok_or_else(err)?.map_err(|_| err())?;
        let minor = fields.next().ok_or_else(err)?.map_err(|_| err())?;
        let patch = fields.next().transpose().map_err(|_| err())?.unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for OvsVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OvsVersion> for String {
    fn from(value: OvsVersion) -> Self {
        value.to_string()
    }
}

impl Display for OvsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn known_os() -> Vec<Release<OpenStackRelease>> {
        OpenStackRelease::iter().map(Release::from).collect()
    }

    #[test]
    fn parses_known_names() {
        let mitaka: Release<OpenStackRelease> = Release::new("Mitaka");
        assert_eq!(mitaka.known(), Some(OpenStackRelease::Mitaka));
        assert!(mitaka >= OpenStackRelease::Mitaka);
        assert!(mitaka < OpenStackRelease::Newton);
        assert!(mitaka > OpenStackRelease::Kilo);
        let xenial: Release<HostRelease> = Release::new("xenial");
        assert!(xenial >= HostRelease::Xenial);
        assert!(xenial > HostRelease::Trusty);
    }

    #[test]
    #[tracing_test::traced_test]
    fn unknown_names_fail_open() {
        let typo: Release<OpenStackRelease> = Release::new("mitakka");
        assert!(logs_contain("unrecognised release 'mitakka'"));
        assert_eq!(typo.known(), None);
        for release in OpenStackRelease::iter() {
            assert!(typo < release);
            assert!(typo < Release::from(release));
        }
        let absent: Release<OpenStackRelease> = Release::default();
        assert!(absent < OpenStackRelease::Diablo);
    }

    #[test]
    fn ordering_is_antisymmetric_and_transitive() {
        let releases = known_os();
        bolero::check!()
            .with_type::<(u8, u8, u8)>()
            .for_each(|(a, b, c)| {
                let len = releases.len();
                let (a, b, c) = (
                    &releases[usize::from(*a) % len],
                    &releases[usize::from(*b) % len],
                    &releases[usize::from(*c) % len],
                );
                if a < b {
                    assert!(b > a);
                    assert!(a != b);
                }
                if a <= b && b <= c {
                    assert!(a <= c);
                }
                if a <= b && b <= a {
                    assert_eq!(a, b);
                }
            });
    }

    #[test]
    fn list_order_matches_enum_order() {
        let releases = known_os();
        for pair in releases.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn ovs_versions() {
        let v: OvsVersion = "2.9.5-0ubuntu0.18.04.1".parse().unwrap();
        assert_eq!(v, OvsVersion::new(2, 9, 5));
        assert!(v >= OvsVersion::LATE_DPDK_INIT);
        assert!(v >= OvsVersion::VHOSTUSER_CLIENT);
        let old: OvsVersion = "2.5".parse().unwrap();
        assert_eq!(old, OvsVersion::new(2, 5, 0));
        assert!(old < OvsVersion::LATE_DPDK_INIT);
        assert!("two.six".parse::<OvsVersion>().is_err());
        assert!("".parse::<OvsVersion>().is_err());
    }
}
