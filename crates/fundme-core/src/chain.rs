//! Single-node local chain that hosts FundMe contracts and price feeds.
//!
//! Calls arrive as [`SignedCall`]s and execute one at a time. Each call either
//! commits everything (value movement, contract state, fee, nonce) or fails
//! and leaves the chain exactly as it was.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    call::{Call, CallPayload, SignedCall},
    contract::FundMe,
    ledger::LedgerEvent,
    meter::AccessMeter,
    oracle::MockAggregator,
    withdraw::{Treasury, WithdrawStrategy, WithdrawalReceipt},
    Address, Amount, FundMeError, TransferError,
};

/// Chain id of the default local network.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Writes billed for a deployment (owner, feed, minimum).
const DEPLOY_WRITES: u64 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Amount,
    pub nonce: u64,
    pub rejects_transfers: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Deployed {
        contract: Address,
    },
    Funded {
        contract: Address,
        total: Amount,
    },
    Withdrawn {
        contract: Address,
        receipt: WithdrawalReceipt,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub block: u64,
    pub digest: [u8; 32],
    pub caller: Address,
    pub nonce: u64,
    pub gas_used: u64,
    pub fee: Amount,
    pub outcome: CallOutcome,
    pub events: Vec<LedgerEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChain {
    chain_id: u64,
    gas_price: Amount,
    height: u64,
    accounts: BTreeMap<Address, Account>,
    feeds: BTreeMap<Address, MockAggregator>,
    contracts: BTreeMap<Address, FundMe>,
}

/// Pays out of a contract's account on behalf of the contract.
struct ContractTreasury<'a> {
    accounts: &'a mut BTreeMap<Address, Account>,
    source: Address,
}

impl Treasury for ContractTreasury<'_> {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        let recipient = self.accounts.get(to).cloned().unwrap_or_default();
        if recipient.rejects_transfers {
            return Err(TransferError::Rejected);
        }
        let available = self
            .accounts
            .get(&self.source)
            .map(|account| account.balance)
            .unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                available,
                requested: amount,
            });
        }
        if *to == self.source {
            return Ok(());
        }
        let credited = recipient
            .balance
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.accounts.entry(self.source).or_default().balance = available - amount;
        self.accounts.entry(*to).or_default().balance = credited;
        Ok(())
    }
}

impl LocalChain {
    pub fn new(chain_id: u64, gas_price: Amount) -> Self {
        Self {
            chain_id,
            gas_price,
            height: 0,
            accounts: BTreeMap::new(),
            feeds: BTreeMap::new(),
            contracts: BTreeMap::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas_price(&self) -> Amount {
        self.gas_price
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.accounts.get(account).map(|a| a.balance).unwrap_or(0)
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.accounts.get(account).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    pub fn contract(&self, address: &Address) -> Option<&FundMe> {
        self.contracts.get(address)
    }

    pub fn contracts(&self) -> impl Iterator<Item = (&Address, &FundMe)> {
        self.contracts.iter()
    }

    pub fn feed(&self, address: &Address) -> Option<&MockAggregator> {
        self.feeds.get(address)
    }

    pub fn feeds(&self) -> impl Iterator<Item = (&Address, &MockAggregator)> {
        self.feeds.iter()
    }

    /// Mint native value to an account (development faucet).
    ///
    /// Contract and feed accounts are refused: a contract's balance must stay
    /// equal to its held balance.
    pub fn faucet(&mut self, to: Address, amount: Amount) -> Result<Amount, FundMeError> {
        if self.contracts.contains_key(&to) || self.feeds.contains_key(&to) {
            warn!(account = %to, amount, "faucet refused for deployed account");
            return Err(FundMeError::NotPayable(amount));
        }
        let account = self.accounts.entry(to).or_default();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(FundMeError::ArithmeticOverflow("faucet"))?;
        info!(account = %to, amount, "faucet drip");
        Ok(account.balance)
    }

    pub fn set_rejects_transfers(&mut self, account: Address, rejects: bool) {
        self.accounts.entry(account).or_default().rejects_transfers = rejects;
    }

    pub fn deploy_price_feed(&mut self, decimals: u8, initial_answer: i128) -> Address {
        let address = Address::derive(b"price-feed", &Address::ZERO, self.feeds.len() as u64);
        self.feeds
            .insert(address, MockAggregator::new(address, decimals, initial_answer));
        info!(feed = %address, decimals, initial_answer, "price feed deployed");
        address
    }

    pub fn update_price(&mut self, feed: &Address, answer: i128) -> Result<u64, FundMeError> {
        let aggregator = self
            .feeds
            .get_mut(feed)
            .ok_or(FundMeError::UnknownContract(*feed))?;
        aggregator.update_answer(answer);
        info!(%feed, answer, round = aggregator.round_id(), "price feed updated");
        Ok(aggregator.round_id())
    }

    /// Contract account balance matches the ledger's held balance.
    pub fn is_solvent(&self, contract: &Address) -> bool {
        match self.contracts.get(contract) {
            Some(fund_me) => self.balance_of(contract) == fund_me.held_balance(),
            None => false,
        }
    }

    /// Verify and run a signed call, all or nothing.
    pub fn execute(&mut self, signed: &SignedCall) -> Result<TransactionReceipt, FundMeError> {
        let caller = signed.verify()?;
        let payload = &signed.payload;
        if payload.chain_id != self.chain_id {
            return Err(FundMeError::WrongChain {
                expected: self.chain_id,
                actual: payload.chain_id,
            });
        }
        let expected = self.nonce_of(&caller);
        if payload.nonce != expected {
            return Err(FundMeError::InvalidNonce {
                account: caller,
                expected,
                actual: payload.nonce,
            });
        }

        let accounts = self.accounts.clone();
        let contracts = self.contracts.clone();
        match self.apply(caller, payload) {
            Ok(receipt) => {
                info!(
                    block = receipt.block,
                    %caller,
                    gas_used = receipt.gas_used,
                    fee = receipt.fee,
                    "call committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.accounts = accounts;
                self.contracts = contracts;
                warn!(%caller, nonce = payload.nonce, error = %err, "call reverted");
                Err(err)
            }
        }
    }

    fn apply(
        &mut self,
        caller: Address,
        payload: &CallPayload,
    ) -> Result<TransactionReceipt, FundMeError> {
        self.debit(&caller, payload.value)?;

        let (outcome, meter, events) = match &payload.call {
            Call::Deploy {
                minimum_usd,
                price_feed,
            } => {
                require_no_value(payload.value)?;
                if !self.feeds.contains_key(price_feed) {
                    return Err(FundMeError::UnknownContract(*price_feed));
                }
                let contract = Address::derive(b"fundme", &caller, payload.nonce);
                self.contracts
                    .insert(contract, FundMe::new(caller, *minimum_usd, *price_feed));
                self.accounts.entry(contract).or_default();
                info!(%contract, owner = %caller, minimum_usd = %minimum_usd, "fundme deployed");
                let meter = AccessMeter {
                    reads: 0,
                    writes: DEPLOY_WRITES,
                };
                (CallOutcome::Deployed { contract }, meter, Vec::new())
            }
            Call::Fund { contract } => {
                let fund_me = self
                    .contracts
                    .get_mut(contract)
                    .ok_or(FundMeError::UnknownContract(*contract))?;
                let feed = self
                    .feeds
                    .get(&fund_me.price_feed())
                    .ok_or(FundMeError::UnknownContract(fund_me.price_feed()))?;
                let events_before = fund_me.events().len();
                fund_me.take_meter();
                let total = fund_me.contribute(caller, payload.value, feed)?;
                let meter = fund_me.take_meter();
                let events = fund_me.events()[events_before..].to_vec();
                self.credit(contract, payload.value)?;
                let outcome = CallOutcome::Funded {
                    contract: *contract,
                    total,
                };
                (outcome, meter, events)
            }
            Call::Withdraw { contract } | Call::CheaperWithdraw { contract } => {
                require_no_value(payload.value)?;
                let strategy = match payload.call {
                    Call::CheaperWithdraw { .. } => WithdrawStrategy::CopyThenIterate,
                    _ => WithdrawStrategy::Direct,
                };
                let fund_me = self
                    .contracts
                    .get_mut(contract)
                    .ok_or(FundMeError::UnknownContract(*contract))?;
                let events_before = fund_me.events().len();
                fund_me.take_meter();
                let mut treasury = ContractTreasury {
                    accounts: &mut self.accounts,
                    source: *contract,
                };
                let receipt = fund_me.withdraw_with(caller, strategy, &mut treasury)?;
                let meter = fund_me.take_meter();
                let events = fund_me.events()[events_before..].to_vec();
                let outcome = CallOutcome::Withdrawn {
                    contract: *contract,
                    receipt,
                };
                (outcome, meter, events)
            }
        };

        let gas_used = meter.gas();
        let fee = Amount::from(gas_used)
            .checked_mul(self.gas_price)
            .ok_or(FundMeError::ArithmeticOverflow("call fee"))?;
        self.debit(&caller, fee)?;

        self.accounts.entry(caller).or_default().nonce += 1;
        self.height += 1;

        Ok(TransactionReceipt {
            block: self.height,
            digest: payload.digest(),
            caller,
            nonce: payload.nonce,
            gas_used,
            fee,
            outcome,
            events,
        })
    }

    fn debit(&mut self, account: &Address, amount: Amount) -> Result<(), FundMeError> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(account);
        if available < amount {
            return Err(FundMeError::InsufficientBalance {
                account: *account,
                available,
                required: amount,
            });
        }
        self.accounts.entry(*account).or_default().balance = available - amount;
        Ok(())
    }

    fn credit(&mut self, account: &Address, amount: Amount) -> Result<(), FundMeError> {
        let entry = self.accounts.entry(*account).or_default();
        entry.balance = entry
            .balance
            .checked_add(amount)
            .ok_or(FundMeError::ArithmeticOverflow("account balance"))?;
        Ok(())
    }
}

fn require_no_value(value: Amount) -> Result<(), FundMeError> {
    if value != 0 {
        return Err(FundMeError::NotPayable(value));
    }
    Ok(())
}
