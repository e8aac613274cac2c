//! `soba-mint`: mint and verify SOBA NFTs from the command line.
//!
//! ```bash
//! soba-mint --cluster devnet mint \
//!   --keypair ~/.config/solana/id.json \
//!   --image-url https://images.example/1.png \
//!   --frame basic
//!
//! COLLECTION_AUTHORITY_KEYPAIR=authority.json soba-mint reconcile
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::{read_keypair_file, Keypair};
use tracing_subscriber::EnvFilter;

use soba_mint::config::ClusterArgs;
use soba_mint::image::HttpImageFetcher;
use soba_mint::pda::{derive_from_str, holding_address, parse_identifier};
use soba_mint::tier::FRAMES;
use soba_mint::verifier::{CollectionVerifier, VerificationService};
use soba_mint::{
    build_mint_request, JsonFileStore, KeypairWallet, MintPipeline, PipelineConfig, Reconciler,
    UiState,
};

#[derive(Parser)]
#[command(name = "soba-mint")]
#[command(about = "Mint SOBA AI-art NFTs and verify their collection")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the metadata and edition addresses of a mint
    Derive {
        #[arg(long)]
        mint: String,

        /// Also print this owner's holding account for the mint
        #[arg(long)]
        owner: Option<String>,
    },

    /// List the available frames
    Frames,

    /// Mint one NFT, signing as the requester with a local keypair
    Mint {
        #[arg(long, env = "REQUESTER_KEYPAIR")]
        keypair: PathBuf,

        #[arg(long)]
        image_url: String,

        #[arg(long, default_value = "basic")]
        frame: String,

        /// Generated-image row to link to the mint record
        #[arg(long)]
        image_record_id: Option<String>,
    },

    /// Verify one mint in the collection
    Verify {
        #[arg(long)]
        mint: String,

        #[arg(long, env = "COLLECTION_AUTHORITY_KEYPAIR")]
        authority_keypair: PathBuf,
    },

    /// Verify every recorded mint that is still unverified
    Reconcile {
        #[arg(long, env = "COLLECTION_AUTHORITY_KEYPAIR")]
        authority_keypair: PathBuf,
    },
}

fn load_keypair(path: &Path) -> Result<Keypair> {
    read_keypair_file(path).map_err(|e| anyhow!("Failed to read keypair {}: {}", path.display(), e))
}

fn rpc_client(config: &PipelineConfig) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        config.commitment,
    ))
}

fn verification_service(
    config: &PipelineConfig,
    store: Arc<JsonFileStore>,
    authority_keypair: &Path,
) -> Result<VerificationService<RpcClient, JsonFileStore>> {
    let authority = Arc::new(load_keypair(authority_keypair)?);
    let verifier = CollectionVerifier::new(
        rpc_client(config),
        config.submit,
        authority,
        config.collection,
        config.priority_fee,
    )
    .context("Collection authority keypair does not match the configured authority")?;
    Ok(VerificationService::new(verifier, Reconciler::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.cluster.to_config().context("Invalid configuration")?;
    let store = Arc::new(JsonFileStore::new(cli.cluster.store.clone()));

    match cli.command {
        Commands::Derive { mint, owner } => {
            let addresses = derive_from_str(&mint, &config.collection.mint)?;
            println!("metadata:                  {}", addresses.metadata);
            println!("master edition:            {}", addresses.master_edition);
            println!("collection metadata:       {}", addresses.collection_metadata);
            println!("collection master edition: {}", addresses.collection_master_edition);
            if let Some(owner) = owner {
                let owner = parse_identifier(&owner)?;
                let mint = parse_identifier(&mint)?;
                println!("holding account:           {}", holding_address(&owner, &mint));
            }
        }

        Commands::Frames => {
            for frame in FRAMES.iter() {
                println!(
                    "{:<8} {:<14} {:>8} SOBA",
                    frame.id, frame.name, frame.required_balance
                );
            }
        }

        Commands::Mint {
            keypair,
            image_url,
            frame,
            image_record_id,
        } => {
            let wallet = KeypairWallet::new(load_keypair(&keypair)?);
            let ui = UiState {
                wallet: Some(soba_mint::RequesterWallet::pubkey(&wallet).to_string()),
                generated_image: Some(image_url),
                selected_frame: Some(frame),
                image_record_id,
            };
            let request = build_mint_request(&ui)?;

            let fetcher = HttpImageFetcher::new(config.image_timeout)?;
            let pipeline = MintPipeline::new(
                rpc_client(&config),
                Reconciler::new(store),
                fetcher,
                config.clone(),
            );
            tracing::info!("Minting on {}", config.rpc_url);
            let outcome = pipeline
                .start_mint(&request, &wallet)
                .await
                .context("Mint failed")?;
            println!("{}", outcome.user_message());
        }

        Commands::Verify {
            mint,
            authority_keypair,
        } => {
            let mint = parse_identifier(&mint)?;
            let service = verification_service(&config, store, &authority_keypair)?;
            let outcome = service.verify_collection(&mint).await?;
            println!("{}", outcome.user_message());
        }

        Commands::Reconcile { authority_keypair } => {
            let service = verification_service(&config, store, &authority_keypair)?;
            let report = service.reconcile_pending().await?;
            tracing::info!(
                "Reconciled: {} verified, {} not yet minted, {} failed",
                report.verified,
                report.not_yet_minted,
                report.failed
            );
        }
    }

    Ok(())
}
