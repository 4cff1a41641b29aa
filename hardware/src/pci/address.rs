// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device addressing.
//!
//! Addresses use the extended BDF (EBDF) form `domain:bus:device.function`
//! (e.g. `0000:03:00.0`), which is what sysfs names PCI functions by and what DPDK accepts in
//! `dpdk-devargs` and `--pci-whitelist`.
//!
//! ```
//! use neutron_ovs_hardware::pci::address::PciAddress;
//!
//! let addr = PciAddress::try_from("0000:03:00.1").unwrap();
//! assert_eq!(addr.bus, 3);
//! assert_eq!(addr.function, 1);
//! assert_eq!(addr.to_string(), "0000:03:00.1");
//! ```

/// Largest legal device number (5 bits).
pub const MAX_DEVICE: u8 = 0x1f;
/// Largest legal function number (3 bits).
pub const MAX_FUNCTION: u8 = 0x7;

/// A PCI function address in EBDF form.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress {
    /// PCI domain (segment) number.
    pub domain: u16,
    /// PCI bus number.
    pub bus: u8,
    /// Device number on the bus.
    pub device: u8,
    /// Function number within the device.
    pub function: u8,
}

/// Errors that can occur when parsing a PCI address.
#[derive(Debug, thiserror::Error)]
pub enum InvalidPciAddress {
    /// Invalid address syntax.
    #[error("invalid PCI address syntax: {0}")]
    Syntax(String),
    /// Device number out of range.
    #[error("PCI device number {0:#x} exceeds {MAX_DEVICE:#x}")]
    Device(u8),
    /// Function number out of range.
    #[error("PCI function number {0:#x} exceeds {MAX_FUNCTION:#x}")]
    Function(u8),
}

impl PciAddress {
    /// Creates a new PCI address from its components.
    ///
    /// # Errors
    ///
    /// Returns an error if the device or function number is out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device > MAX_DEVICE {
            return Err(InvalidPciAddress::Device(device));
        }
        if function > MAX_FUNCTION {
            return Err(InvalidPciAddress::Function(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }
}

impl std::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:01x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

fn hex_field(field: &str, width: usize, whole: &str) -> Result<u16, InvalidPciAddress> {
    if field.len() != width || !field.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidPciAddress::Syntax(whole.to_string()));
    }
    u16::from_str_radix(field, 16).map_err(|_| InvalidPciAddress::Syntax(whole.to_string()))
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    /// Parses a PCI address in the format `DDDD:BB:DD.F`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not have that exact shape or a component is out of
    /// range.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let syntax = || InvalidPciAddress::Syntax(value.to_string());
        let mut parts = value.split(':');
        let (Some(domain), Some(bus), Some(dev_fn), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(syntax());
        };
        let Some((device, function)) = dev_fn.split_once('.') else {
            return Err(syntax());
        };
        let domain = hex_field(domain, 4, value)?;
        let bus = u8::try_from(hex_field(bus, 2, value)?).map_err(|_| syntax())?;
        let device = u8::try_from(hex_field(device, 2, value)?).map_err(|_| syntax())?;
        let function = u8::try_from(hex_field(function, 1, value)?).map_err(|_| syntax())?;
        PciAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> String {
        format!("{value}")
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use bolero::{Driver, TypeGenerator};

    use crate::pci::address::{MAX_DEVICE, MAX_FUNCTION, PciAddress};

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(PciAddress {
                domain: driver.produce()?,
                bus: driver.produce()?,
                device: driver.produce::<u8>()? & MAX_DEVICE,
                function: driver.produce::<u8>()? & MAX_FUNCTION,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_display_round_trip() {
        bolero::check!()
            .with_type()
            .for_each(|addr: &PciAddress| {
                let parsed = PciAddress::try_from(addr.to_string()).unwrap();
                assert_eq!(parsed, *addr);
            });
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "0:00:00.0",
            "0000:0:00.0",
            "0000:00:00",
            "0000:00:00.8",
            "0000:00:20.0",
            "0000:00:1c.01",
            "0000:001c.01",
            "000g:00:00.0",
            "0000:00:00.0:0",
        ] {
            assert!(PciAddress::try_from(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn serde_uses_ebdf_strings() {
        let addr = PciAddress::new(0, 0x1c, 0x1f, 7).unwrap();
        let yaml = serde_yaml_ng::to_string(&addr).unwrap();
        assert!(yaml.contains("0000:1c:1f.7"));
        let back: PciAddress = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, addr);
    }
}
