use thiserror::Error;

use crate::{Address, Amount, UsdAmount};

/// Canonical error type exposed by the ledger, the contract and the runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FundMeError {
    /// The attached value converts to less than the configured USD minimum.
    #[error("insufficient contribution: worth {usd_value} USD, minimum is {minimum_usd} USD")]
    InsufficientContribution {
        usd_value: UsdAmount,
        minimum_usd: UsdAmount,
    },

    /// A withdrawal was attempted by someone other than the owner.
    #[error("not owner: only {owner} may withdraw")]
    NotOwner { owner: Address },

    /// The final payout of a withdrawal could not be delivered.
    #[error("transfer of {amount} to {recipient} failed: {reason}")]
    TransferFailed {
        recipient: Address,
        amount: Amount,
        reason: TransferError,
    },

    /// The price feed could not be queried or returned unusable data.
    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Fixed-point conversion or balance accumulation left the `u128` range.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// The caller cannot cover the attached value or the call fee.
    #[error("account {account} holds {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        required: Amount,
    },

    /// The call envelope carries a signature that does not verify.
    #[error("invalid call signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The call nonce does not match the signer's next nonce.
    #[error("invalid nonce for {account}: expected {expected}, got {actual}")]
    InvalidNonce {
        account: Address,
        expected: u64,
        actual: u64,
    },

    /// Value was attached to a call that does not accept any.
    #[error("call does not accept value, {0} attached")]
    NotPayable(Amount),

    /// No FundMe contract or price feed is deployed at the address.
    #[error("nothing deployed at {0}")]
    UnknownContract(Address),

    /// Call was signed for a different chain.
    #[error("call signed for chain {actual}, this is chain {expected}")]
    WrongChain { expected: u64, actual: u64 },
}

/// Reasons a value transfer is refused by the receiving side or the payer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("recipient rejects incoming value")]
    Rejected,
    #[error("payer holds {available}, transfer needs {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },
    #[error("recipient balance would overflow")]
    Overflow,
}

/// Failures while checking a signed call envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signer public key")]
    MalformedKey,
    #[error("malformed signature bytes")]
    MalformedSignature,
    #[error("signature does not match the call digest")]
    Mismatch,
}
