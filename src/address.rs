//! Provides the address types a sweep works on: a fixed three-octet prefix
//! and the host addresses formed by appending a suffix to it.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde_derive::Deserialize;
use thiserror::Error;

/// First host suffix enumerated by a sweep.
pub const FIRST_HOST_SUFFIX: u8 = 1;
/// Last host suffix enumerated by a sweep.
pub const LAST_HOST_SUFFIX: u8 = 254;

/// Number of host suffixes in one sweep.
pub const HOST_COUNT: usize = (LAST_HOST_SUFFIX - FIRST_HOST_SUFFIX) as usize + 1;

/// Raised when a prefix string is not three dotted octets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid prefix '{input}': {reason}")]
pub struct PrefixError {
    input: String,
    reason: &'static str,
}

/// The fixed network part of every address in a sweep, e.g. `10.0.0`.
///
/// ```rust
/// # use rustsweep::address::Prefix;
/// let prefix: Prefix = "192.168.1".parse().unwrap();
/// assert_eq!(prefix.to_string(), "192.168.1");
///
/// // A trailing dot is tolerated.
/// let prefix: Prefix = "192.168.1.".parse().unwrap();
/// assert_eq!(prefix.host(7).unwrap().to_string(), "192.168.1.7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Prefix([u8; 3]);

impl Prefix {
    /// Builds a prefix from its three octets.
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    /// The address formed by appending `suffix` to this prefix, or `None`
    /// when `suffix` is not a host of the sweep range (0 and 255 are not).
    pub const fn host(self, suffix: u8) -> Option<Address> {
        if suffix < FIRST_HOST_SUFFIX || suffix > LAST_HOST_SUFFIX {
            return None;
        }
        Some(Address {
            prefix: self,
            suffix,
        })
    }

    /// Every host address of the sweep range, in ascending suffix order.
    pub fn hosts(self) -> impl Iterator<Item = Address> {
        (FIRST_HOST_SUFFIX..=LAST_HOST_SUFFIX).map(move |suffix| Address {
            prefix: self,
            suffix,
        })
    }
}

impl FromStr for Prefix {
    type Err = PrefixError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = |reason| PrefixError {
            input: input.to_owned(),
            reason,
        };

        let trimmed = input.trim();
        let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(err("prefix is empty"));
        }

        let mut octets = [0u8; 3];
        let mut parts = trimmed.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| err("expected three octets"))?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("octets must be decimal numbers"));
            }
            *octet = part
                .parse()
                .map_err(|_| err("octets must be between 0 and 255"))?;
        }

        if parts.next().is_some() {
            return Err(err("expected three octets"));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for Prefix {
    type Error = PrefixError;

    fn try_from(input: String) -> Result<Self, Self::Error> {
        input.parse()
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

/// One host of the sweep: the prefix plus a suffix in
/// [`FIRST_HOST_SUFFIX`]..=[`LAST_HOST_SUFFIX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    prefix: Prefix,
    suffix: u8,
}

impl Address {
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    pub fn suffix(&self) -> u8 {
        self.suffix
    }

    pub fn ip(&self) -> Ipv4Addr {
        let [a, b, c] = self.prefix.0;
        Ipv4Addr::new(a, b, c, self.suffix)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.prefix, self.suffix)
    }
}
