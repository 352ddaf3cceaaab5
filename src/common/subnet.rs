//! Address range a node enumerates when probing for discovery nodes.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::error::ConfigError;

/// Smallest prefix we are willing to enumerate (/16 = 65 534 hosts).
pub const MIN_PREFIX: u8 = 16;

/// An IPv4 network in CIDR notation, e.g. `10.0.0.0/24`.
///
/// Parsing is lenient about host bits: `10.0.0.17/24` is the same range as
/// `10.0.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    network: Ipv4Addr,
    prefix: u8,
}

impl AddressRange {
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// Usable host addresses in the range.
    ///
    /// Network and broadcast addresses are skipped for prefixes up to /30;
    /// a /31 yields both of its addresses and a /32 its single one.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        let base = u32::from(self.network);
        let size = 1u64 << (32 - u32::from(self.prefix));

        let (first, last) = if self.prefix >= 31 {
            (0, size - 1)
        } else {
            (1, size - 2)
        };

        (first..=last)
            .map(|offset| Ipv4Addr::from(base + offset as u32))
            .collect()
    }

    /// Hosts to probe: every host in the range except `own_ip`.
    pub fn candidates(&self, own_ip: &str) -> Vec<Ipv4Addr> {
        let own: Option<Ipv4Addr> = own_ip.parse().ok();

        self.hosts()
            .into_iter()
            .filter(|host| Some(*host) != own)
            .collect()
    }
}

impl FromStr for AddressRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSubnet(s.to_string());

        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), 32),
        };

        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        if prefix < MIN_PREFIX {
            return Err(ConfigError::RangeTooLarge { prefix });
        }

        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & Self::mask(prefix)),
            prefix,
        })
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
