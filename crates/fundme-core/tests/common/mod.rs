#![allow(dead_code)]

use std::collections::BTreeSet;

use ed25519_dalek::SigningKey;
use fundme_core::{
    call::{Call, CallPayload, SignedCall},
    chain::{CallOutcome, LocalChain, TransactionReceipt, LOCAL_CHAIN_ID},
    Address, Amount, FundMeError, UsdAmount, NATIVE_UNIT,
};
use rand::rngs::OsRng;

/// 2000 USD per native unit, 8 feed decimals.
pub const INITIAL_ANSWER: i128 = 2_000_00000000;
pub const FEED_DECIMALS: u8 = 8;
pub const MINIMUM_DOLLARS: u128 = 50;
pub const SEND_VALUE: Amount = NATIVE_UNIT;
pub const STARTING_BALANCE: Amount = 100 * NATIVE_UNIT;

pub struct Account {
    pub key: SigningKey,
    pub address: Address,
}

impl Account {
    pub fn random() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let address = Address::from_verifying_key(&key.verifying_key());
        Self { key, address }
    }

    pub fn sign(&self, chain: &LocalChain, value: Amount, call: Call) -> SignedCall {
        CallPayload {
            chain_id: chain.chain_id(),
            nonce: chain.nonce_of(&self.address),
            value,
            call,
        }
        .sign(&self.key)
    }

    pub fn send(
        &self,
        chain: &mut LocalChain,
        value: Amount,
        call: Call,
    ) -> Result<TransactionReceipt, FundMeError> {
        let signed = self.sign(chain, value, call);
        chain.execute(&signed)
    }
}

pub struct Fixture {
    pub chain: LocalChain,
    pub deployer: Account,
    pub feed: Address,
    pub contract: Address,
}

impl Fixture {
    /// Independent copy of the chain with the same deployer key.
    pub fn fork(&self) -> Fixture {
        Fixture {
            chain: self.chain.clone(),
            deployer: Account {
                key: self.deployer.key.clone(),
                address: self.deployer.address,
            },
            feed: self.feed,
            contract: self.contract,
        }
    }

    pub fn fund(&mut self, account: &Account, value: Amount) -> Result<TransactionReceipt, FundMeError> {
        let contract = self.contract;
        account.send(&mut self.chain, value, Call::Fund { contract })
    }

    pub fn withdraw(&mut self, account: &Account) -> Result<TransactionReceipt, FundMeError> {
        let contract = self.contract;
        account.send(&mut self.chain, 0, Call::Withdraw { contract })
    }

    pub fn cheaper_withdraw(&mut self, account: &Account) -> Result<TransactionReceipt, FundMeError> {
        let contract = self.contract;
        account.send(&mut self.chain, 0, Call::CheaperWithdraw { contract })
    }

    /// Withdraw as the deployer, with either strategy.
    pub fn owner_withdraw(&mut self, cheaper: bool) -> Result<TransactionReceipt, FundMeError> {
        let contract = self.contract;
        let call = if cheaper {
            Call::CheaperWithdraw { contract }
        } else {
            Call::Withdraw { contract }
        };
        self.deployer.send(&mut self.chain, 0, call)
    }

    /// Contribute as the deployer.
    pub fn owner_fund(&mut self, value: Amount) -> Result<TransactionReceipt, FundMeError> {
        let contract = self.contract;
        self.deployer.send(&mut self.chain, value, Call::Fund { contract })
    }

    /// Records sum to the held balance and the registry lists exactly the
    /// distinct funders with a non-zero record.
    pub fn assert_ledger_consistent(&self) {
        let fund_me = self.chain.contract(&self.contract).expect("contract");
        let funders = fund_me.funders();
        let total: Amount = funders.iter().map(|f| fund_me.amount_funded(f)).sum();
        assert_eq!(total, fund_me.held_balance());
        let distinct: BTreeSet<&Address> = funders.iter().collect();
        assert_eq!(distinct.len(), funders.len(), "registry holds duplicates");
        assert!(funders.iter().all(|f| fund_me.amount_funded(f) > 0));
        assert!(self.chain.is_solvent(&self.contract));
    }

    /// A fresh account holding [`STARTING_BALANCE`].
    pub fn funded_account(&mut self) -> Account {
        let account = Account::random();
        self.chain
            .faucet(account.address, STARTING_BALANCE)
            .expect("faucet");
        account
    }
}

/// Local chain with one mock feed and one deployed FundMe.
pub fn deploy_fixture() -> Fixture {
    deploy_fixture_with_gas_price(1)
}

pub fn deploy_fixture_with_gas_price(gas_price: Amount) -> Fixture {
    let mut chain = LocalChain::new(LOCAL_CHAIN_ID, gas_price);
    let feed = chain.deploy_price_feed(FEED_DECIMALS, INITIAL_ANSWER);
    let deployer = Account::random();
    chain
        .faucet(deployer.address, STARTING_BALANCE)
        .expect("faucet");
    let receipt = deployer
        .send(
            &mut chain,
            0,
            Call::Deploy {
                minimum_usd: UsdAmount::from_dollars(MINIMUM_DOLLARS).expect("minimum"),
                price_feed: feed,
            },
        )
        .expect("deploy");
    let contract = match receipt.outcome {
        CallOutcome::Deployed { contract } => contract,
        other => panic!("unexpected deploy outcome {other:?}"),
    };
    Fixture {
        chain,
        deployer,
        feed,
        contract,
    }
}
