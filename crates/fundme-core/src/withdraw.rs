//! Owner withdrawal: pay out the held balance and reset the ledger.
//!
//! Both public withdrawal operations run [`execute`]; they differ only in how
//! the funder registry is walked while records are zeroed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    access::Ownable,
    ledger::{ContributionLedger, LedgerEvent},
    Address, Amount, FundMeError, TransferError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawStrategy {
    /// Re-read the registry length and entry from storage on every iteration.
    Direct,
    /// Copy the registry out of storage once and iterate the copy.
    CopyThenIterate,
}

impl WithdrawStrategy {
    pub const ALL: [WithdrawStrategy; 2] = [WithdrawStrategy::Direct, WithdrawStrategy::CopyThenIterate];

    pub fn name(&self) -> &'static str {
        match self {
            WithdrawStrategy::Direct => "withdraw",
            WithdrawStrategy::CopyThenIterate => "cheaper_withdraw",
        }
    }
}

/// Moves value out of the ledger's custody.
pub trait Treasury {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// Plain in-memory wallets, for embedding the ledger without a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallets {
    balances: BTreeMap<Address, Amount>,
    rejecting: BTreeSet<Address>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Make `account` refuse (or accept again) incoming transfers.
    pub fn set_rejecting(&mut self, account: Address, rejecting: bool) {
        if rejecting {
            self.rejecting.insert(account);
        } else {
            self.rejecting.remove(&account);
        }
    }
}

impl Treasury for Wallets {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.rejecting.contains(to) {
            return Err(TransferError::Rejected);
        }
        let balance = self.balances.entry(*to).or_default();
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }
}

/// Outcome of a successful withdrawal. Identical for both strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub recipient: Address,
    pub amount: Amount,
    pub funders_cleared: usize,
}

pub(crate) fn execute(
    ledger: &mut ContributionLedger,
    access: &Ownable,
    caller: &Address,
    strategy: WithdrawStrategy,
    treasury: &mut dyn Treasury,
) -> Result<WithdrawalReceipt, FundMeError> {
    access.require_owner(caller)?;
    let checkpoint = ledger.checkpoint();

    let funders_cleared = match strategy {
        WithdrawStrategy::Direct => {
            let mut index = 0;
            while index < ledger.load_funder_count() {
                if let Some(funder) = ledger.load_funder(index) {
                    ledger.clear_record(&funder);
                }
                index += 1;
            }
            index
        }
        WithdrawStrategy::CopyThenIterate => {
            let funders = ledger.load_funders();
            for funder in &funders {
                ledger.clear_record(funder);
            }
            funders.len()
        }
    };
    ledger.clear_funders();

    let recipient = access.owner();
    let amount = ledger.drain_held_balance();
    if let Err(reason) = treasury.transfer(&recipient, amount) {
        ledger.revert(checkpoint);
        warn!(%recipient, amount, %reason, strategy = strategy.name(), "withdrawal reverted");
        return Err(FundMeError::TransferFailed {
            recipient,
            amount,
            reason,
        });
    }

    ledger.push_event(LedgerEvent::Withdrawn {
        owner: recipient,
        amount,
        funders_cleared,
    });
    let meter = ledger.meter();
    debug!(reads = meter.reads, writes = meter.writes, strategy = strategy.name(), "storage traffic");
    info!(%recipient, amount, funders_cleared, strategy = strategy.name(), "withdrawal completed");
    Ok(WithdrawalReceipt {
        recipient,
        amount,
        funders_cleared,
    })
}
