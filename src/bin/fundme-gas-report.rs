//! Compare the storage cost of both withdrawal strategies.
//!
//! For every funder count, two identical chains are funded the same way and
//! then drained with `withdraw` and `cheaper_withdraw` respectively.

use std::{fmt::Write as _, fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use ed25519_dalek::SigningKey;
use fundme_core::{
    call::{Call, CallPayload},
    chain::{CallOutcome, LocalChain, TransactionReceipt, LOCAL_CHAIN_ID},
    withdraw::WithdrawStrategy,
    Address, Amount, UsdAmount, NATIVE_UNIT,
};
use rand::rngs::OsRng;
use tracing::{debug, info, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(version, about = "Gas comparison of withdraw vs cheaper_withdraw")]
struct Args {
    /// Funder counts to measure
    #[arg(long, value_delimiter = ',', default_value = "1,5,10,25,50")]
    funders: Vec<usize>,

    /// Also write the table to this file
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "gas-report.txt")]
    out: Option<PathBuf>,
}

const DEFAULT_LOG_FILTER: &str = "info";

struct Row {
    funders: usize,
    direct: u64,
    cheaper: u64,
}

fn submit(chain: &mut LocalChain, key: &SigningKey, value: Amount, call: Call) -> Result<TransactionReceipt> {
    let caller = Address::from_verifying_key(&key.verifying_key());
    let signed = CallPayload {
        chain_id: chain.chain_id(),
        nonce: chain.nonce_of(&caller),
        value,
        call,
    }
    .sign(key);
    Ok(chain.execute(&signed)?)
}

/// Chain with a deployed contract and `funders` distinct contributors.
fn funded_chain(funders: usize) -> Result<(LocalChain, SigningKey, Address)> {
    let mut chain = LocalChain::new(LOCAL_CHAIN_ID, 1);
    let feed = chain.deploy_price_feed(8, 2_000_00000000);
    let owner = SigningKey::generate(&mut OsRng);
    chain.faucet(Address::from_verifying_key(&owner.verifying_key()), NATIVE_UNIT)?;

    let minimum_usd = UsdAmount::from_dollars(50).context("minimum")?;
    let receipt = submit(&mut chain, &owner, 0, Call::Deploy { minimum_usd, price_feed: feed })?;
    let CallOutcome::Deployed { contract } = receipt.outcome else {
        bail!("deploy produced an unexpected outcome");
    };

    for _ in 0..funders {
        let funder = SigningKey::generate(&mut OsRng);
        chain.faucet(Address::from_verifying_key(&funder.verifying_key()), 2 * NATIVE_UNIT)?;
        submit(&mut chain, &funder, NATIVE_UNIT, Call::Fund { contract })?;
    }
    Ok((chain, owner, contract))
}

fn measure(funders: usize) -> Result<Row> {
    let (chain, owner, contract) = funded_chain(funders)?;
    let mut gas = [0u64; 2];
    for (slot, strategy) in gas.iter_mut().zip(WithdrawStrategy::ALL) {
        let mut chain = chain.clone();
        let call = match strategy {
            WithdrawStrategy::Direct => Call::Withdraw { contract },
            WithdrawStrategy::CopyThenIterate => Call::CheaperWithdraw { contract },
        };
        let receipt = submit(&mut chain, &owner, 0, call)?;
        debug!(funders, strategy = strategy.name(), gas = receipt.gas_used, "measured");
        *slot = receipt.gas_used;
    }
    Ok(Row {
        funders,
        direct: gas[0],
        cheaper: gas[1],
    })
}

fn render(rows: &[Row]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8} | {:>12} | {:>16} | {:>8}",
        "funders",
        WithdrawStrategy::Direct.name(),
        WithdrawStrategy::CopyThenIterate.name(),
        "saved"
    );
    let _ = writeln!(out, "{}", "-".repeat(53));
    for row in rows {
        let _ = writeln!(
            out,
            "{:>8} | {:>12} | {:>16} | {:>8}",
            row.funders,
            row.direct,
            row.cheaper,
            row.direct.saturating_sub(row.cheaper)
        );
    }
    out
}

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    set_global_default(subscriber).context("install tracing subscriber")?;

    let args = Args::parse();
    let rows = args
        .funders
        .iter()
        .map(|&n| measure(n))
        .collect::<Result<Vec<_>>>()?;
    let table = render(&rows);
    print!("{table}");

    if let Some(path) = args.out {
        fs::write(&path, &table).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "gas report written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn arguments_are_well_formed() {
        Args::command().debug_assert();
        let args = Args::try_parse_from(["fundme-gas-report", "--funders", "2,3", "--out"]).unwrap();
        assert_eq!(args.funders, vec![2, 3]);
        assert_eq!(args.out, Some(PathBuf::from("gas-report.txt")));
    }

    #[test]
    fn default_filter_shows_info() {
        let filter = EnvFilter::new(DEFAULT_LOG_FILTER);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn cheaper_withdraw_costs_less_per_funder() {
        let row = measure(3).unwrap();
        assert_eq!(row.direct - row.cheaper, 3 * fundme_core::meter::READ_GAS);
        let table = render(&[row]);
        assert!(table.contains("cheaper_withdraw"));
        assert_eq!(table.lines().count(), 3);
    }
}
