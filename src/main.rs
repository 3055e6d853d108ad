use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ed25519_dalek::SigningKey;
use fundme_core::{
    call::{Call, CallPayload},
    chain::{CallOutcome, LocalChain, TransactionReceipt},
    Address, Amount,
};
use serde::Serialize;
use tracing::{info, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod keys;
mod store;

use config::{FundMeConfig, DEFAULT_NETWORK};
use store::Devnet;

//==================== CLI ====================//

/// FundMe crowdfunding ledger on a local single-node chain.
///
/// State lives in a JSON file; every command loads it, applies at most one
/// call and writes it back.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Chain state file
    #[arg(long, global = true, default_value = "state/fundme.json", value_name = "PATH")]
    state: PathBuf,

    /// Network configuration (JSON); built-in localhost when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Network name inside the configuration
    #[arg(long, global = true, default_value = DEFAULT_NETWORK, value_name = "NAME")]
    network: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a fresh chain and deploy the mock price feed
    Init {
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Generate an Ed25519 keypair (sk.hex / pk.hex)
    Keygen {
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },
    /// Mint development value to an account
    Faucet {
        address: Address,
        /// Amount in the smallest native unit
        amount: Amount,
    },
    /// Deploy FundMe; the signer becomes its owner
    Deploy {
        #[arg(long, value_name = "HEX")]
        sk_hex: String,
    },
    /// Contribute native value
    Fund {
        #[arg(long, value_name = "HEX")]
        sk_hex: String,
        /// Attached value in the smallest native unit
        #[arg(long)]
        value: Amount,
    },
    /// Pay the held balance to the owner and reset the ledger
    Withdraw {
        #[arg(long, value_name = "HEX")]
        sk_hex: String,
        /// Walk an in-memory copy of the funder registry
        #[arg(long)]
        cheaper: bool,
    },
    /// Push a new answer to the mock price feed
    SetPrice { answer: i128 },
    /// Make an account refuse (or accept again) incoming value
    RejectTransfers { address: Address, mode: Toggle },
    /// Print the contract snapshot and account balances
    Show,
    /// List funders in registry order with their recorded amounts
    Funders,
    /// Recorded contribution of one address
    Funded { address: Address },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

//==================== helpers ====================//

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    set_global_default(subscriber).context("install tracing subscriber")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("encode output")?);
    Ok(())
}

/// Sign `call` with the signer's next nonce and run it on the chain.
fn submit(chain: &mut LocalChain, key: &SigningKey, value: Amount, call: Call) -> Result<TransactionReceipt> {
    let caller = keys::address_of(key);
    let signed = CallPayload {
        chain_id: chain.chain_id(),
        nonce: chain.nonce_of(&caller),
        value,
        call,
    }
    .sign(key);
    Ok(chain.execute(&signed)?)
}

fn report(receipt: &TransactionReceipt, confirmations: u64) {
    info!(
        block = receipt.block,
        tx = %hex::encode(receipt.digest),
        confirmations,
        "transaction included"
    );
    println!(
        "block {} | gas {} | fee {}",
        receipt.block, receipt.gas_used, receipt.fee
    );
}

#[derive(Serialize)]
struct AccountView {
    address: Address,
    balance: Amount,
    nonce: u64,
    rejects_transfers: bool,
}

#[derive(Serialize)]
struct FunderView {
    funder: Address,
    amount: Amount,
}

//==================== commands ====================//

fn init_cmd(cli: &Cli, force: bool) -> Result<()> {
    if cli.state.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", cli.state.display());
    }
    let config = FundMeConfig::load(cli.config.as_deref())?;
    let network = config.network(&cli.network)?;

    let mut chain = LocalChain::new(network.chain_id, network.gas_price);
    let price_feed = chain.deploy_price_feed(
        network.price_feed.decimals,
        network.price_feed.initial_answer,
    );
    let devnet = Devnet {
        network: cli.network.clone(),
        block_confirmations: network.block_confirmations,
        price_feed,
        contract: None,
        chain,
    };
    devnet.save(&cli.state)?;
    println!("chain {} initialised, price feed at {price_feed}", network.chain_id);
    Ok(())
}

fn deploy_cmd(cli: &Cli, sk_hex: &str) -> Result<()> {
    let config = FundMeConfig::load(cli.config.as_deref())?;
    let key = keys::parse_sk_hex(sk_hex)?;
    let mut devnet = Devnet::load(&cli.state)?;
    let call = Call::Deploy {
        minimum_usd: config.minimum_usd,
        price_feed: devnet.price_feed,
    };
    let receipt = submit(&mut devnet.chain, &key, 0, call)?;
    let CallOutcome::Deployed { contract } = receipt.outcome else {
        bail!("deploy produced an unexpected outcome");
    };
    devnet.contract = Some(contract);
    devnet.save(&cli.state)?;
    report(&receipt, devnet.block_confirmations);
    println!("FundMe deployed at {contract} (minimum {} USD)", config.minimum_usd);
    Ok(())
}

fn fund_cmd(cli: &Cli, sk_hex: &str, value: Amount) -> Result<()> {
    let key = keys::parse_sk_hex(sk_hex)?;
    let mut devnet = Devnet::load(&cli.state)?;
    let contract = devnet.contract_address()?;
    let receipt = submit(&mut devnet.chain, &key, value, Call::Fund { contract })?;
    devnet.save(&cli.state)?;
    report(&receipt, devnet.block_confirmations);
    if let CallOutcome::Funded { total, .. } = receipt.outcome {
        println!("{} has funded {total} in total", keys::address_of(&key));
    }
    Ok(())
}

fn withdraw_cmd(cli: &Cli, sk_hex: &str, cheaper: bool) -> Result<()> {
    let key = keys::parse_sk_hex(sk_hex)?;
    let mut devnet = Devnet::load(&cli.state)?;
    let contract = devnet.contract_address()?;
    let call = if cheaper {
        Call::CheaperWithdraw { contract }
    } else {
        Call::Withdraw { contract }
    };
    let receipt = submit(&mut devnet.chain, &key, 0, call)?;
    devnet.save(&cli.state)?;
    report(&receipt, devnet.block_confirmations);
    if let CallOutcome::Withdrawn { receipt, .. } = receipt.outcome {
        println!(
            "withdrew {} to {} ({} funders cleared)",
            receipt.amount, receipt.recipient, receipt.funders_cleared
        );
    }
    Ok(())
}

fn show_cmd(cli: &Cli) -> Result<()> {
    let devnet = Devnet::load(&cli.state)?;
    println!(
        "network {} | chain {} | height {} | gas price {}",
        devnet.network,
        devnet.chain.chain_id(),
        devnet.chain.height(),
        devnet.chain.gas_price()
    );
    if let Some(feed) = devnet.chain.feed(&devnet.price_feed) {
        println!(
            "price feed {} | answer {} ({} decimals, round {})",
            devnet.price_feed,
            feed.answer(),
            feed.decimals(),
            feed.round_id()
        );
    }
    if let Some(contract) = devnet.contract {
        let fund_me = devnet.fund_me()?;
        println!("contract {contract}");
        print_json(&fund_me.snapshot())?;
    }
    let accounts: Vec<AccountView> = devnet
        .chain
        .accounts()
        .map(|(address, account)| AccountView {
            address: *address,
            balance: account.balance,
            nonce: account.nonce,
            rejects_transfers: account.rejects_transfers,
        })
        .collect();
    print_json(&accounts)
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Init { force } => init_cmd(cli, *force),
        Command::Keygen { out_dir } => {
            let key = keys::keygen(out_dir)?;
            println!(
                "keypair written → {} (address {})",
                out_dir.display(),
                keys::address_of(&key)
            );
            Ok(())
        }
        Command::Faucet { address, amount } => {
            let mut devnet = Devnet::load(&cli.state)?;
            let balance = devnet.chain.faucet(*address, *amount)?;
            devnet.save(&cli.state)?;
            println!("{address} now holds {balance}");
            Ok(())
        }
        Command::Deploy { sk_hex } => deploy_cmd(cli, sk_hex),
        Command::Fund { sk_hex, value } => fund_cmd(cli, sk_hex, *value),
        Command::Withdraw { sk_hex, cheaper } => withdraw_cmd(cli, sk_hex, *cheaper),
        Command::SetPrice { answer } => {
            let mut devnet = Devnet::load(&cli.state)?;
            let feed = devnet.price_feed;
            let round = devnet.chain.update_price(&feed, *answer)?;
            devnet.save(&cli.state)?;
            println!("price feed {feed} answers {answer} (round {round})");
            Ok(())
        }
        Command::RejectTransfers { address, mode } => {
            let mut devnet = Devnet::load(&cli.state)?;
            let rejects = matches!(mode, Toggle::On);
            devnet.chain.set_rejects_transfers(*address, rejects);
            devnet.save(&cli.state)?;
            println!("{address} rejects incoming value: {rejects}");
            Ok(())
        }
        Command::Show => show_cmd(cli),
        Command::Funders => {
            let devnet = Devnet::load(&cli.state)?;
            let fund_me = devnet.fund_me()?;
            let funders: Vec<FunderView> = fund_me
                .funders()
                .iter()
                .map(|funder| FunderView {
                    funder: *funder,
                    amount: fund_me.amount_funded(funder),
                })
                .collect();
            print_json(&funders)
        }
        Command::Funded { address } => {
            let devnet = Devnet::load(&cli.state)?;
            println!("{}", devnet.fund_me()?.amount_funded(address));
            Ok(())
        }
    }
}

//==================== main ====================//

fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    run(&cli)
}
