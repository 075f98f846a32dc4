//! Endpoint key codec.
//!
//! Maps an IP address string to a short identifier that is safe to embed in a
//! hierarchical field path (`<endpoint>.<tag>.<field>`). The address is parsed
//! into its integer words (one for IPv4, high/low for IPv6) and those words are
//! run through a sqids encoder restricted to lowercase alphanumerics.
//!
//! Identifiers are never decoded by this crate.

use crate::error::{AccountingError, Result};
use serde::{Deserialize, Serialize};
use sqids::Sqids;
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;

/// Alphabet used for endpoint identifiers.
///
/// Contains no path delimiter, so identifiers can be used as field-path
/// segments verbatim.
pub const ENDPOINT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// A compact, storage-safe identifier for one network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Wraps an identifier read back from the store.
    ///
    /// Returns `None` if the value contains characters outside
    /// [`ENDPOINT_ALPHABET`].
    pub fn from_stored(value: &str) -> Option<Self> {
        if value.is_empty() || !value.chars().all(|c| ENDPOINT_ALPHABET.contains(c)) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic address-to-identifier encoder.
///
/// Build once and share; encoding is pure and takes `&self`.
#[derive(Debug)]
pub struct EndpointCodec {
    sqids: Sqids,
}

impl EndpointCodec {
    /// Creates a codec over [`ENDPOINT_ALPHABET`].
    pub fn new() -> Result<Self> {
        let sqids = Sqids::builder()
            .alphabet(ENDPOINT_ALPHABET.chars().collect())
            .build()
            .map_err(|e| AccountingError::Encoding(e.to_string()))?;
        Ok(Self { sqids })
    }

    /// Encodes an IPv4 or IPv6 address string.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) encode the same as the
    /// plain IPv4 address.
    pub fn encode(&self, address: &str) -> Result<EndpointId> {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| AccountingError::invalid_address(address))?;
        let words = address_words(ip.to_canonical());
        let id = self
            .sqids
            .encode(&words)
            .map_err(|e| AccountingError::Encoding(e.to_string()))?;
        Ok(EndpointId(id))
    }
}

/// Encodes an address with a process-wide [`EndpointCodec`].
pub fn encode(address: &str) -> Result<EndpointId> {
    static CODEC: OnceLock<std::result::Result<EndpointCodec, String>> = OnceLock::new();
    match CODEC.get_or_init(|| EndpointCodec::new().map_err(|e| e.to_string())) {
        Ok(codec) => codec.encode(address),
        Err(e) => Err(AccountingError::Encoding(e.clone())),
    }
}

/// Splits an address into the integer words fed to the encoder.
fn address_words(ip: IpAddr) -> Vec<u64> {
    match ip {
        IpAddr::V4(v4) => vec![u64::from(u32::from(v4))],
        IpAddr::V6(v6) => {
            let value = u128::from(v6);
            vec![(value >> 64) as u64, value as u64]
        }
    }
}
