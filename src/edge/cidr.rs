use std::{fmt, net::Ipv4Addr, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowListError {
    #[error("allow entry must look like a.b.c.d/prefix, got '{0}'")]
    Format(String),

    #[error("invalid network address in allow entry '{0}'")]
    Address(String),

    #[error("prefix length must be between 0 and 32, got '{0}'")]
    Prefix(String),
}

/// One `(network address, prefix length)` pair of the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowEntry {
    pub ip: Ipv4Addr,
    pub prefix: u8,
}

impl AllowEntry {
    /// # Errors
    /// Returns an error if the prefix is longer than 32 bits.
    pub fn new(ip: Ipv4Addr, prefix: u8) -> Result<Self, AllowListError> {
        if prefix > 32 {
            return Err(AllowListError::Prefix(prefix.to_string()));
        }

        Ok(Self { ip, prefix })
    }

    /// `~(2^(32 - prefix) - 1)`; a zero prefix masks everything away.
    #[must_use]
    pub fn mask(&self) -> u32 {
        u32::MAX
            .checked_shl(32u32.saturating_sub(u32::from(self.prefix)))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, client: u32) -> bool {
        let mask = self.mask();
        (client & mask) == (u32::from(self.ip) & mask)
    }

    /// First and last address covered by the entry.
    #[must_use]
    pub fn range(&self) -> (Ipv4Addr, Ipv4Addr) {
        let mask = self.mask();
        let network = u32::from(self.ip) & mask;
        (Ipv4Addr::from(network), Ipv4Addr::from(network | !mask))
    }
}

impl FromStr for AllowEntry {
    type Err = AllowListError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (ip, prefix) = value
            .split_once('/')
            .ok_or_else(|| AllowListError::Format(value.to_string()))?;

        let ip = ip
            .parse::<Ipv4Addr>()
            .map_err(|_| AllowListError::Address(value.to_string()))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| AllowListError::Prefix(prefix.to_string()))?;

        Self::new(ip, prefix)
    }
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

/// Convert a dotted-quad string to its big-endian integer form.
///
/// Anything that is not a well-formed IPv4 address (wrong number of octets,
/// non-numeric or out of range parts) becomes `0.0.0.0`. Octets with a
/// leading zero count as malformed, so `210.128.054.70` is `0.0.0.0` too.
/// Allow-list entries written that way fail to parse.
#[must_use]
pub fn ip_to_number(ip: &str) -> u32 {
    ip.trim().parse::<Ipv4Addr>().map_or(0, u32::from)
}

#[must_use]
pub fn ip_in_cidr(ip: &str, entry: &AllowEntry) -> bool {
    entry.contains(ip_to_number(ip))
}

#[must_use]
pub fn is_ip_allowed(ip: &str, entries: &[AllowEntry]) -> bool {
    let client = ip_to_number(ip);
    entries.iter().any(|entry| entry.contains(client))
}
