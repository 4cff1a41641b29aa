// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type and logic.

use arrayvec::ArrayVec;
use std::fmt::Display;

/// A [MAC Address] type.
///
/// Network devices are identified by MAC in the charm configuration since the MAC survives a
/// driver rebind while the kernel interface name does not.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[repr(transparent)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

/// Errors which can occur while converting a string to a [`Mac`]
#[derive(Debug, thiserror::Error)]
pub enum MacFromStringError {
    /// Invalid string representation of mac address
    #[error("invalid string representation of mac address: {0}")]
    Invalid(String),
}

impl TryFrom<&str> for Mac {
    type Error = MacFromStringError;

    /// Parse colon separated hex octets.  Upper and lower case digits are both accepted.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        const MAX_OCTETS: usize = 6;
        let invalid = || MacFromStringError::Invalid(value.to_string());
        let octets_parsed =
            value
                .split(':')
                .try_fold(ArrayVec::<_, MAX_OCTETS>::new(), |mut acc, octet_str| {
                    if octet_str.len() != 2 || !octet_str.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(invalid());
                    }
                    let parsed = u8::from_str_radix(octet_str, 16).map_err(|_| invalid())?;
                    acc.try_push(parsed).map_err(|_| invalid())?;
                    Ok(acc)
                })?;
        octets_parsed
            .into_inner()
            .map(Mac)
            .map_err(|_| invalid())
    }
}

impl TryFrom<String> for Mac {
    type Error = MacFromStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mac::try_from(value.as_str())
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

impl Mac {
    /// The zero `Mac`.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the binary representation of the [`Mac`] is exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }
}

impl Display for Mac {
    /// Lower case, colon separated, which is what the kernel reports under sysfs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        let lower = Mac::try_from("fe:ed:be:ef:00:01").unwrap();
        let upper = Mac::try_from("FE:ED:BE:EF:00:01").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.to_string(), "fe:ed:be:ef:00:01");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in [
            "",
            "eth0",
            "fe:ed:be:ef:00",
            "fe:ed:be:ef:00:01:02",
            "fe:ed:be:ef:00:1",
            "fe:ed:be:ef:00:zz",
            "0000:03:00.0",
        ] {
            assert!(Mac::try_from(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_parse_is_identity() {
        bolero::check!().with_type().for_each(|mac: &Mac| {
            assert_eq!(Mac::try_from(mac.to_string().as_str()).unwrap(), *mac);
        });
    }
}
