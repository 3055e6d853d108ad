//! Core state machine for the FundMe crowdfunding ledger.
//!
//! The crate is organised around a handful of small building blocks:
//!
//! * [`oracle`]: price feed adapter and fixed-point USD conversion.
//! * [`ledger`]: contributor records, the funder registry and the held balance.
//! * [`access`]: the single immutable owner and its guard.
//! * [`withdraw`]: the owner withdrawal routine and its iteration strategies.
//! * [`contract`]: the [`FundMe`] aggregate tying the pieces together.
//! * [`call`] / [`chain`]: signed calls and a local single-node runtime that
//!   executes them with all-or-nothing semantics.
//!
//! Every mutating operation takes `&mut self` and either commits all of its
//! effects or returns an error with nothing changed.

pub mod access;
pub mod address;
pub mod call;
pub mod chain;
pub mod contract;
pub mod ledger;
pub mod meter;
pub mod oracle;
pub mod withdraw;

mod error;

pub use address::Address;
pub use contract::FundMe;
pub use error::{FundMeError, SignatureError, TransferError};
pub use oracle::{PriceOracle, RateReading, UsdAmount};

/// Native value unit (18 decimals, like wei).
pub type Amount = u128;

/// Decimals of the native value unit.
pub const NATIVE_DECIMALS: u32 = 18;

/// One whole native token expressed in the smallest unit.
pub const NATIVE_UNIT: Amount = 1_000_000_000_000_000_000;
