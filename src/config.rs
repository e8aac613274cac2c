use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use solana_program::pubkey::Pubkey;
use solana_sdk::commitment_config::CommitmentConfig;

use crate::error::{MintError, Result};
use crate::instructions::PriorityFee;
use crate::pda::parse_identifier;
use crate::retry::RetryPolicy;
use crate::submitter::SubmitSettings;
use crate::{COLLECTION_AUTHORITY, COLLECTION_MINT, SOBA_MINT};

pub const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// Compute budget the verification transaction requests by default.
pub const DEFAULT_PRIORITY_FEE: PriorityFee = PriorityFee {
    compute_unit_limit: 600_000,
    micro_lamports_per_unit: 100_000,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionConfig {
    pub mint: Pubkey,
    pub authority: Pubkey,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            mint: COLLECTION_MINT,
            authority: COLLECTION_AUTHORITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Cluster {
    Mainnet,
    Devnet,
}

impl Cluster {
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Cluster::Mainnet => MAINNET_RPC_URL,
            Cluster::Devnet => DEVNET_RPC_URL,
        }
    }

    /// Wall-clock budget for confirmation, above the ~60-90s a blockhash lives.
    pub fn confirm_timeout(&self) -> Duration {
        match self {
            Cluster::Mainnet => Duration::from_secs(120),
            Cluster::Devnet => Duration::from_secs(90),
        }
    }
}

impl FromStr for Cluster {
    type Err = MintError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "mainnet" | "mainnet-beta" => Ok(Cluster::Mainnet),
            "devnet" => Ok(Cluster::Devnet),
            other => Err(MintError::InvalidIdentifier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub collection: CollectionConfig,
    /// Token whose balance gates the premium frames.
    pub gate_mint: Pubkey,
    pub submit: SubmitSettings,
    /// Fresh transactions built after an expired or timed-out attempt.
    pub max_rebuilds: u32,
    pub priority_fee: Option<PriorityFee>,
    pub image_timeout: Duration,
}

impl PipelineConfig {
    pub fn for_cluster(cluster: Cluster) -> Self {
        Self {
            rpc_url: cluster.rpc_url().to_string(),
            commitment: CommitmentConfig::confirmed(),
            collection: CollectionConfig::default(),
            gate_mint: SOBA_MINT,
            submit: SubmitSettings {
                retry: RetryPolicy::default(),
                poll_interval: Duration::from_secs(2),
                confirm_timeout: cluster.confirm_timeout(),
            },
            max_rebuilds: 2,
            priority_fee: Some(DEFAULT_PRIORITY_FEE),
            image_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_cluster(Cluster::Devnet)
    }
}

#[derive(Debug, clap::Args, Clone)]
pub struct ClusterArgs {
    #[arg(long, value_enum, env = "SOLANA_CLUSTER", default_value = "devnet")]
    pub cluster: Cluster,

    /// Overrides the cluster's public endpoint
    #[arg(long, env = "SOLANA_RPC_URL")]
    pub rpc_url: Option<String>,

    #[arg(long, env = "COLLECTION_MINT")]
    pub collection_mint: Option<String>,

    #[arg(long, env = "COLLECTION_AUTHORITY")]
    pub collection_authority: Option<String>,

    #[arg(long, env = "GATE_MINT")]
    pub gate_mint: Option<String>,

    /// Seconds to wait for confirmation
    #[arg(long, env = "CONFIRM_TIMEOUT_SECS")]
    pub confirm_timeout: Option<u64>,

    #[arg(long, env = "MAX_REBUILDS")]
    pub max_rebuilds: Option<u32>,

    /// Skip the compute budget instructions on verification
    #[arg(long, default_value = "false")]
    pub no_priority_fee: bool,

    /// JSON file holding the mint records
    #[arg(long, env = "MINT_RECORDS", default_value = "mint-records.json")]
    pub store: PathBuf,
}

impl ClusterArgs {
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::for_cluster(self.cluster);
        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(mint) = &self.collection_mint {
            config.collection.mint = parse_identifier(mint)?;
        }
        if let Some(authority) = &self.collection_authority {
            config.collection.authority = parse_identifier(authority)?;
        }
        if let Some(mint) = &self.gate_mint {
            config.gate_mint = parse_identifier(mint)?;
        }
        if let Some(secs) = self.confirm_timeout {
            config.submit.confirm_timeout = Duration::from_secs(secs);
        }
        if let Some(max_rebuilds) = self.max_rebuilds {
            config.max_rebuilds = max_rebuilds;
        }
        if self.no_priority_fee {
            config.priority_fee = None;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        cluster: ClusterArgs,
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.rpc_url, DEVNET_RPC_URL);
        assert_eq!(config.collection.mint, COLLECTION_MINT);
        assert_eq!(config.gate_mint, SOBA_MINT);
        assert!(
            Cluster::Devnet.confirm_timeout() < Cluster::Mainnet.confirm_timeout()
        );
    }

    #[test]
    fn test_args_override() {
        let collection = Pubkey::new_unique();
        let collection_arg = collection.to_string();
        let cli = Cli::parse_from([
            "soba-mint",
            "--cluster",
            "mainnet",
            "--collection-mint",
            collection_arg.as_str(),
            "--confirm-timeout",
            "45",
            "--no-priority-fee",
        ]);
        let config = cli.cluster.to_config().unwrap();
        assert_eq!(config.rpc_url, MAINNET_RPC_URL);
        assert_eq!(config.collection.mint, collection);
        assert_eq!(config.collection.authority, COLLECTION_AUTHORITY);
        assert_eq!(config.submit.confirm_timeout, Duration::from_secs(45));
        assert_eq!(config.priority_fee, None);
    }

    #[test]
    fn test_bad_override() {
        let cli = Cli::parse_from(["soba-mint", "--gate-mint", "not-a-key"]);
        assert!(matches!(
            cli.cluster.to_config(),
            Err(MintError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_cluster_names() {
        assert_eq!("mainnet-beta".parse::<Cluster>(), Ok(Cluster::Mainnet));
        assert!("testnet".parse::<Cluster>().is_err());
    }
}
