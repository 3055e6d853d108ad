use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::SigningKey;
use fundme_core::Address;
use rand::{rngs::OsRng, RngCore};

/// Parse a 32-byte Ed25519 secret given as 64 hex characters.
pub fn parse_sk_hex(sk_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(sk_hex.trim()).context("invalid --sk-hex")?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("--sk-hex must be 32 bytes (64 hex chars), got {}", bytes.len()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub fn address_of(key: &SigningKey) -> Address {
    Address::from_verifying_key(&key.verifying_key())
}

/// Generate a keypair and write `sk.hex` / `pk.hex` into `out_dir`.
pub fn keygen(out_dir: &Path) -> Result<SigningKey> {
    fs::create_dir_all(out_dir).with_context(|| format!("mkdir {}", out_dir.display()))?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();

    fs::write(out_dir.join("sk.hex"), hex::encode(sk_bytes)).context("write sk.hex")?;
    fs::write(out_dir.join("pk.hex"), hex::encode(pk.as_bytes())).context("write pk.hex")?;
    Ok(sk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sk_hex_must_be_32_bytes() {
        assert!(parse_sk_hex("abcd").is_err());
        assert!(parse_sk_hex("zz").is_err());
        let key = parse_sk_hex(&"11".repeat(32)).unwrap();
        assert_eq!(key.to_bytes(), [0x11; 32]);
    }

    #[test]
    fn keygen_writes_matching_files() {
        let dir = std::env::temp_dir().join(format!("fundme-keys-{}", std::process::id()));
        let sk = keygen(&dir).unwrap();
        let written = fs::read_to_string(dir.join("sk.hex")).unwrap();
        let parsed = parse_sk_hex(&written).unwrap();
        assert_eq!(address_of(&parsed), address_of(&sk));
        let pk = fs::read_to_string(dir.join("pk.hex")).unwrap();
        assert_eq!(pk, hex::encode(sk.verifying_key().as_bytes()));
        fs::remove_dir_all(&dir).ok();
    }
}
