//! Address-derived pseudonymous identities.
//!
//! A connection's identity is a salted SHA-256 of its network address, so the
//! same address always maps to the same `stable_id` for as long as the salt is
//! unchanged. No other authentication exists.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Length of a `stable_id` in hex characters.
pub const STABLE_ID_LEN: usize = 24;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives stable ids and default colors from a secret salt.
#[derive(Clone)]
pub struct IdentityResolver {
    salt: String,
}

impl IdentityResolver {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Salted one-way hash of `address`, truncated to [`STABLE_ID_LEN`] hex chars.
    pub fn derive_stable_id(&self, address: &str) -> String {
        let digest = Sha256::new()
            .chain_update(self.salt.as_bytes())
            .chain_update(address.as_bytes())
            .chain_update(self.salt.as_bytes())
            .finalize();
        let mut id = hex(&digest);
        id.truncate(STABLE_ID_LEN);
        id
    }

    /// Default `#rrggbb` color for an identity, from a separately salted hash.
    pub fn derive_default_color(&self, stable_id: &str) -> String {
        let digest = Sha256::new()
            .chain_update(self.salt.as_bytes())
            .chain_update(stable_id.as_bytes())
            .chain_update(self.salt.as_bytes())
            .chain_update(b"color")
            .finalize();
        format!("#{}", &hex(&digest[..3]))
    }
}

/// Pick the address an identity is derived from.
///
/// The transport peer address is used as-is unless it is loopback, in which
/// case the first `X-Forwarded-For` entry wins. Only a trusted local reverse
/// proxy may sit in front of the server: anything that can reach it over
/// loopback can choose its own identity.
pub fn resolve_address(peer: SocketAddr, headers: &HeaderMap) -> String {
    let ip = peer.ip().to_canonical();
    if ip.is_loopback() {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(forwarded) = forwarded {
            return forwarded.to_string();
        }
    }
    ip.to_string()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
