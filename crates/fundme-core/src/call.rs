use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, Amount, SignatureError, UsdAmount};

const CALL_DOMAIN: &[u8] = b"fundme-call-v1";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Deploy {
        minimum_usd: UsdAmount,
        price_feed: Address,
    },
    Fund {
        contract: Address,
    },
    Withdraw {
        contract: Address,
    },
    CheaperWithdraw {
        contract: Address,
    },
}

impl Call {
    fn commitment(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 16 + 20);
        match self {
            Call::Deploy {
                minimum_usd,
                price_feed,
            } => {
                buf.push(0);
                buf.extend_from_slice(&minimum_usd.raw().to_le_bytes());
                buf.extend_from_slice(price_feed.as_bytes());
            }
            Call::Fund { contract } => {
                buf.push(1);
                buf.extend_from_slice(contract.as_bytes());
            }
            Call::Withdraw { contract } => {
                buf.push(2);
                buf.extend_from_slice(contract.as_bytes());
            }
            Call::CheaperWithdraw { contract } => {
                buf.push(3);
                buf.extend_from_slice(contract.as_bytes());
            }
        }
        buf
    }
}

/// What the caller signs: the call, the value attached to it, and replay
/// protection (chain id plus the caller's sequential nonce).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallPayload {
    pub chain_id: u64,
    pub nonce: u64,
    pub value: Amount,
    pub call: Call,
}

impl CallPayload {
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(CALL_DOMAIN);
        hasher.update(self.chain_id.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.value.to_le_bytes());
        hasher.update(self.call.commitment());
        hasher.finalize().into()
    }

    pub fn sign(self, key: &SigningKey) -> SignedCall {
        let signature = key.sign(&self.digest());
        SignedCall {
            payload: self,
            signer: key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    pub payload: CallPayload,
    #[serde(with = "crate::call::serde_bytes")]
    pub signer: Vec<u8>,
    #[serde(with = "crate::call::serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    /// Check the signature and return the caller's address.
    pub fn verify(&self) -> Result<Address, SignatureError> {
        let key_bytes: [u8; 32] = self
            .signer
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::MalformedKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| SignatureError::MalformedSignature)?;
        key.verify_strict(&self.payload.digest(), &signature)
            .map_err(|_| SignatureError::Mismatch)?;
        Ok(Address::from_verifying_key(&key))
    }
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::OsRng;

    fn payload(nonce: u64) -> CallPayload {
        CallPayload {
            chain_id: 31337,
            nonce,
            value: 1_000,
            call: Call::Fund {
                contract: Address::new([5u8; 20]),
            },
        }
    }

    #[test]
    fn signed_call_recovers_caller_address() {
        let sk = SigningKey::generate(&mut OsRng);
        let signed = payload(0).sign(&sk);
        let caller = signed.verify().unwrap();
        assert_eq!(caller, Address::from_verifying_key(&sk.verifying_key()));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let sk = SigningKey::generate(&mut OsRng);
        let mut signed = payload(0).sign(&sk);
        signed.payload.value = 1_000_000;
        assert_eq!(signed.verify(), Err(SignatureError::Mismatch));
    }

    #[test]
    fn digest_binds_chain_and_nonce() {
        let base = payload(0);
        let mut other_chain = base.clone();
        other_chain.chain_id = 1;
        assert_ne!(base.digest(), other_chain.digest());
        assert_ne!(base.digest(), payload(1).digest());
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        let sk = SigningKey::generate(&mut OsRng);
        let mut signed = payload(0).sign(&sk);
        signed.signer.truncate(5);
        assert_eq!(signed.verify(), Err(SignatureError::MalformedKey));

        let mut signed = payload(0).sign(&sk);
        signed.signature.truncate(10);
        assert_eq!(signed.verify(), Err(SignatureError::MalformedSignature));
    }

    #[test]
    fn signed_call_survives_json() {
        let sk = SigningKey::generate(&mut OsRng);
        let signed = payload(3).sign(&sk);
        let json = serde_json::to_string(&signed).unwrap();
        let back: SignedCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signed);
        back.verify().unwrap();
    }
}
