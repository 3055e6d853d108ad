//! Network configuration: which chain to talk to, what fees cost, how the
//! local price feed is seeded and the contract's USD minimum.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use fundme_core::{
    chain::LOCAL_CHAIN_ID,
    oracle::{MAX_FEED_DECIMALS, USD_SCALE},
    Amount, UsdAmount,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NETWORK: &str = "localhost";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    pub decimals: u8,
    pub initial_answer: i128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    #[serde(default = "default_confirmations")]
    pub block_confirmations: u64,
    /// Fee per unit of metered gas.
    pub gas_price: Amount,
    pub price_feed: PriceFeedConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundMeConfig {
    pub minimum_usd: UsdAmount,
    pub networks: BTreeMap<String, NetworkConfig>,
}

fn default_confirmations() -> u64 {
    1
}

impl Default for FundMeConfig {
    fn default() -> Self {
        let localhost = NetworkConfig {
            chain_id: LOCAL_CHAIN_ID,
            block_confirmations: 1,
            gas_price: 1,
            price_feed: PriceFeedConfig {
                decimals: 8,
                initial_answer: 2_000_00000000,
            },
        };
        Self {
            minimum_usd: UsdAmount::from_raw(50 * USD_SCALE),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), localhost)]),
        }
    }
}

impl FundMeConfig {
    /// Read the config at `path`, or fall back to the built-in localhost
    /// network when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        let config: FundMeConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.networks.keys().map(String::as_str).collect();
            anyhow!("unknown network {name:?} (configured: {})", known.join(", "))
        })
    }

    fn validate(&self) -> Result<()> {
        for (name, network) in &self.networks {
            if network.price_feed.initial_answer <= 0 {
                return Err(anyhow!("network {name}: price feed answer must be positive"));
            }
            if network.price_feed.decimals > MAX_FEED_DECIMALS {
                return Err(anyhow!(
                    "network {name}: price feed decimals {} out of range",
                    network.price_feed.decimals
                ));
            }
        }
        Ok(())
    }
}
