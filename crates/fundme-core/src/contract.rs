use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    access::Ownable,
    ledger::{ContributionLedger, LedgerEvent, LedgerSnapshot},
    meter::AccessMeter,
    withdraw::{self, Treasury, WithdrawStrategy, WithdrawalReceipt},
    Address, Amount, FundMeError, PriceOracle, UsdAmount,
};

/// The crowdfunding contract: owner, USD threshold, price feed handle and the
/// contribution ledger, held as one aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundMe {
    access: Ownable,
    price_feed: Address,
    minimum_usd: UsdAmount,
    ledger: ContributionLedger,
}

/// Full audit view of a contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub owner: Address,
    pub price_feed: Address,
    pub minimum_usd: UsdAmount,
    pub ledger: LedgerSnapshot,
}

impl FundMe {
    /// `deployer` becomes the owner for the lifetime of the contract.
    pub fn new(deployer: Address, minimum_usd: UsdAmount, price_feed: Address) -> Self {
        Self {
            access: Ownable::new(deployer),
            price_feed,
            minimum_usd,
            ledger: ContributionLedger::new(),
        }
    }

    /// Accept `amount` from `caller` if it is worth at least the USD minimum at
    /// the feed's current rate. Returns the caller's new cumulative record.
    pub fn contribute(
        &mut self,
        caller: Address,
        amount: Amount,
        feed: &dyn PriceOracle,
    ) -> Result<Amount, FundMeError> {
        if feed.address() != self.price_feed {
            return Err(FundMeError::OracleUnavailable(format!(
                "expected feed {}, got {}",
                self.price_feed,
                feed.address()
            )));
        }
        let reading = feed.latest_rate()?;
        debug!(rate = reading.rate, decimals = reading.decimals, round = reading.round_id, "price feed read");

        let usd_value = reading.convert_to_usd(amount)?;
        if usd_value < self.minimum_usd {
            warn!(funder = %caller, amount, %usd_value, minimum = %self.minimum_usd, "contribution below minimum");
            return Err(FundMeError::InsufficientContribution {
                usd_value,
                minimum_usd: self.minimum_usd,
            });
        }

        let total = self.ledger.record_contribution(caller, amount)?;
        info!(funder = %caller, amount, total, "contribution recorded");
        Ok(total)
    }

    /// Owner-only payout walking the registry straight from storage.
    pub fn withdraw(
        &mut self,
        caller: Address,
        treasury: &mut dyn Treasury,
    ) -> Result<WithdrawalReceipt, FundMeError> {
        self.withdraw_with(caller, WithdrawStrategy::Direct, treasury)
    }

    /// Same outcome as [`FundMe::withdraw`] with fewer storage reads.
    pub fn cheaper_withdraw(
        &mut self,
        caller: Address,
        treasury: &mut dyn Treasury,
    ) -> Result<WithdrawalReceipt, FundMeError> {
        self.withdraw_with(caller, WithdrawStrategy::CopyThenIterate, treasury)
    }

    pub fn withdraw_with(
        &mut self,
        caller: Address,
        strategy: WithdrawStrategy,
        treasury: &mut dyn Treasury,
    ) -> Result<WithdrawalReceipt, FundMeError> {
        withdraw::execute(&mut self.ledger, &self.access, &caller, strategy, treasury)
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    pub fn minimum_usd(&self) -> UsdAmount {
        self.minimum_usd
    }

    pub fn amount_funded(&self, funder: &Address) -> Amount {
        self.ledger.amount_funded(funder)
    }

    pub fn funders(&self) -> &[Address] {
        self.ledger.funders()
    }

    pub fn held_balance(&self) -> Amount {
        self.ledger.held_balance()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        self.ledger.events()
    }

    pub fn meter(&self) -> AccessMeter {
        self.ledger.meter()
    }

    pub fn take_meter(&mut self) -> AccessMeter {
        self.ledger.take_meter()
    }

    pub fn snapshot(&self) -> ContractSnapshot {
        ContractSnapshot {
            owner: self.owner(),
            price_feed: self.price_feed,
            minimum_usd: self.minimum_usd,
            ledger: self.ledger.snapshot(),
        }
    }
}
