//! The persisted devnet: the local chain plus the addresses the CLI deployed.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use fundme_core::{chain::LocalChain, Address, FundMe};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Devnet {
    pub network: String,
    pub block_confirmations: u64,
    pub price_feed: Address,
    pub contract: Option<Address>,
    pub chain: LocalChain,
}

impl Devnet {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| {
            format!("read state {} (run `fundme init` first)", path.display())
        })?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse state {}", path.display()))
    }

    /// Write via a sibling temp file so a crash never leaves half a state file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create state dir {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(self).context("encode state")?;
        let tmp = tmp_path(path);
        let mut file =
            fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&json)
            .with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all().ok();
        fs::rename(&tmp, path).with_context(|| format!("replace state {}", path.display()))?;
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.contract
            .ok_or_else(|| anyhow!("no FundMe deployed on {} yet (run `fundme deploy`)", self.network))
    }

    pub fn fund_me(&self) -> Result<&FundMe> {
        let address = self.contract_address()?;
        self.chain
            .contract(&address)
            .ok_or_else(|| anyhow!("state lists contract {address} but the chain does not"))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundme_core::chain::LOCAL_CHAIN_ID;

    #[test]
    fn state_file_round_trips() {
        let mut chain = LocalChain::new(LOCAL_CHAIN_ID, 1);
        let price_feed = chain.deploy_price_feed(8, 2_000_00000000);
        chain.faucet(Address::new([7u8; 20]), 5).unwrap();
        let devnet = Devnet {
            network: "localhost".into(),
            block_confirmations: 1,
            price_feed,
            contract: None,
            chain,
        };

        let dir = std::env::temp_dir().join(format!("fundme-store-{}", std::process::id()));
        let path = dir.join("state.json");
        devnet.save(&path).unwrap();
        assert_eq!(Devnet::load(&path).unwrap(), devnet);
        assert!(devnet.contract_address().is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_state_mentions_init() {
        let err = Devnet::load(Path::new("/nonexistent/fundme/state.json")).unwrap_err();
        assert!(format!("{err:#}").contains("fundme init"));
    }
}
