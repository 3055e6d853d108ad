use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const ADDRESS_LEN: usize = 20;

/// 20-byte account identity, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Address owned by an ed25519 key: last 20 bytes of `sha256(pubkey)`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::from_digest(Sha256::digest(key.as_bytes()).into())
    }

    /// Deterministic address for something created by `creator`.
    pub fn derive(domain: &[u8], creator: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(creator.0);
        hasher.update(nonce.to_le_bytes());
        Self::from_digest(hasher.finalize().into())
    }

    fn from_digest(digest: [u8; 32]) -> Self {
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must be {} hex bytes, got {0}", ADDRESS_LEN)]
    Length(usize),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressParseError::Length(bytes.len()));
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}
